use sha2::{Digest, Sha256};
use tokio_postgres::GenericClient;

use oms_domain::{AccountId, EventId};

use crate::error::Result;

/// One durable outbox row, shaped for the dispatcher's ring fan-out task
/// (spec.md §4.7: the outbox is the source of truth, the in-process ring a
/// cache tailed from it).
pub struct OutboxRow {
    pub id: EventId,
    pub account_id: AccountId,
    pub namespace: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Every row with `id > after_id`, oldest first, capped at `limit` — polled
/// by the dispatcher's background fan-out loop so every producer (intake,
/// the queue worker's executor, the reconciler) only has to write the
/// durable row, never the in-memory ring directly.
pub async fn fetch_events_after(client: &impl GenericClient, after_id: EventId, limit: i64) -> Result<Vec<OutboxRow>> {
    let rows = client
        .query(
            "SELECT id, account_id, namespace, event_type, payload_json, created_at FROM event_outbox \
             WHERE id > $1 ORDER BY id ASC LIMIT $2",
            &[&after_id.get(), &limit],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| OutboxRow {
            id: EventId::from(row.get::<_, i64>("id")),
            account_id: AccountId::from(row.get::<_, i64>("account_id")),
            namespace: row.get("namespace"),
            event_type: row.get("event_type"),
            payload: row.get("payload_json"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Appends one row to the outbox in the caller's transaction (spec.md §4.7
/// "Every state change inserts an event_outbox row", testable property 7).
pub async fn insert_event(
    client: &impl GenericClient,
    account_id: AccountId,
    namespace: &str,
    event_type: &str,
    payload: &serde_json::Value,
) -> Result<EventId> {
    let row = client
        .query_one(
            "INSERT INTO event_outbox (account_id, namespace, event_type, payload_json) VALUES ($1,$2,$3,$4) \
             RETURNING id",
            &[&account_id.get(), &namespace, &event_type, payload],
        )
        .await?;
    Ok(EventId::from(row.get::<_, i64>("id")))
}

/// Stable fingerprint over a canonical JSON encoding, matching the
/// `hashlib.sha256(json.dumps(..., sort_keys=True))` dedup key in the
/// original implementation (spec.md §3 `RawCcxt{Order,Trade}`).
pub fn fingerprint(payload: &serde_json::Value) -> String {
    let canonical = canonical_json(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{:?}:{}", key, canonical_json(&map[key])))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        serde_json::Value::Array(items) => {
            let entries: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", entries.join(","))
        }
        other => other.to_string(),
    }
}

/// `INSERT ... ON CONFLICT DO NOTHING` on `(account_id, fingerprint_hash)`
/// — the Postgres equivalent of the original's MySQL `INSERT IGNORE`
/// (spec.md §3 RawCcxt invariants).
pub async fn insert_ccxt_order_raw(
    client: &impl GenericClient,
    account_id: AccountId,
    payload: &serde_json::Value,
) -> Result<bool> {
    insert_raw(client, "ccxt_orders_raw", account_id, payload).await
}

pub async fn insert_ccxt_trade_raw(
    client: &impl GenericClient,
    account_id: AccountId,
    payload: &serde_json::Value,
) -> Result<bool> {
    insert_raw(client, "ccxt_trades_raw", account_id, payload).await
}

async fn insert_raw(
    client: &impl GenericClient,
    table: &'static str,
    account_id: AccountId,
    payload: &serde_json::Value,
) -> Result<bool> {
    let hash = fingerprint(payload);
    let rows = client
        .execute(
            &format!(
                "INSERT INTO {table} (account_id, fingerprint_hash, payload_json) VALUES ($1,$2,$3) \
                 ON CONFLICT (account_id, fingerprint_hash) DO NOTHING"
            ),
            &[&account_id.get(), &hash, payload],
        )
        .await?;
    Ok(rows == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_regardless_of_key_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_on_value_change() {
        let a = serde_json::json!({"amount": 1});
        let b = serde_json::json!({"amount": 2});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
