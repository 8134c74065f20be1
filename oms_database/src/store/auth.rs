use tokio_postgres::GenericClient;

use oms_domain::{AccountId, OrderId, PositionId, StrategyId};

use crate::error::Result;

/// One `api_keys` row resolved by its hash (spec.md §4.4 "authenticate the
/// caller by `x_api_key`"). `key_hash` stores a digest, never the raw key.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub role: String,
    pub is_admin: bool,
    pub status: String,
}

impl ApiKeyRecord {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

pub async fn fetch_api_key_by_hash(client: &impl GenericClient, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
    let row = client
        .query_opt(
            "SELECT id, role, is_admin, status FROM api_keys WHERE key_hash = $1",
            &[&key_hash],
        )
        .await?;
    Ok(row.map(|row| ApiKeyRecord {
        id: row.get("id"),
        role: row.get("role"),
        is_admin: row.get("is_admin"),
        status: row.get("status"),
    }))
}

/// `(can_trade, can_read)` for an api-key/account pair (spec.md §4.1
/// `fetch_api_key_account_permissions`).
pub async fn fetch_api_key_account_permissions(
    client: &impl GenericClient,
    api_key_id: i64,
    account_id: AccountId,
) -> Result<Option<(bool, bool)>> {
    let row = client
        .query_opt(
            "SELECT can_trade, can_read FROM api_key_account_permissions WHERE api_key_id = $1 AND account_id = $2",
            &[&api_key_id, &account_id.get()],
        )
        .await?;
    Ok(row.map(|row| (row.get("can_trade"), row.get("can_read"))))
}

pub async fn api_key_strategy_allowed(
    client: &impl GenericClient,
    api_key_id: i64,
    strategy_id: StrategyId,
) -> Result<bool> {
    let row = client
        .query_opt(
            "SELECT can_trade FROM api_key_strategy_permissions WHERE api_key_id = $1 AND strategy_id = $2",
            &[&api_key_id, &strategy_id.get()],
        )
        .await?;
    Ok(row.map(|row| row.get::<_, bool>("can_trade")).unwrap_or(false))
}

pub async fn fetch_order_account_id(client: &impl GenericClient, order_id: OrderId) -> Result<Option<AccountId>> {
    let row = client
        .query_opt("SELECT account_id FROM orders WHERE id = $1", &[&order_id.get()])
        .await?;
    Ok(row.map(|row| AccountId::from(row.get::<_, i64>("account_id"))))
}

pub async fn fetch_position_account_id(client: &impl GenericClient, position_id: PositionId) -> Result<Option<AccountId>> {
    let row = client
        .query_opt("SELECT account_id FROM positions WHERE id = $1", &[&position_id.get()])
        .await?;
    Ok(row.map(|row| AccountId::from(row.get::<_, i64>("account_id"))))
}

pub async fn fetch_position_strategy_id(client: &impl GenericClient, position_id: PositionId) -> Result<Option<StrategyId>> {
    let row = client
        .query_opt("SELECT strategy_id FROM positions WHERE id = $1", &[&position_id.get()])
        .await?;
    Ok(row.map(|row| StrategyId::from(row.get::<_, i64>("strategy_id"))))
}

pub async fn fetch_order_strategy_id(client: &impl GenericClient, order_id: OrderId) -> Result<Option<StrategyId>> {
    let row = client
        .query_opt("SELECT strategy_id FROM orders WHERE id = $1", &[&order_id.get()])
        .await?;
    Ok(row.map(|row| StrategyId::from(row.get::<_, i64>("strategy_id"))))
}

pub async fn fetch_account_dispatcher_worker_hint(
    client: &impl GenericClient,
    account_id: AccountId,
) -> Result<Option<i32>> {
    let row = client
        .query_one(
            "SELECT dispatcher_worker_hint FROM accounts WHERE id = $1",
            &[&account_id.get()],
        )
        .await?;
    Ok(row.get("dispatcher_worker_hint"))
}

pub async fn set_account_dispatcher_worker_hint(
    client: &impl GenericClient,
    account_id: AccountId,
    worker_hint: i32,
) -> Result<()> {
    client
        .execute(
            "UPDATE accounts SET dispatcher_worker_hint = $1 WHERE id = $2",
            &[&worker_hint, &account_id.get()],
        )
        .await?;
    Ok(())
}
