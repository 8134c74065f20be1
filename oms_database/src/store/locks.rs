use tokio_postgres::GenericClient;

use oms_domain::{AccountId, PositionId};

use crate::error::Result;

pub async fn cleanup_expired_close_locks(client: &impl GenericClient) -> Result<u64> {
    client
        .execute("DELETE FROM position_close_locks WHERE expires_at < now()", &[])
        .await
        .map_err(Into::into)
}

/// At most one live lock per `position_id` (spec.md §3 `CloseLock`, §4.5
/// `close_position`). Returns `false` on unique-key conflict rather than
/// erroring, so the caller can surface `close_lock_held` (spec.md §7).
pub async fn acquire_close_position_lock(
    client: &impl GenericClient,
    account_id: AccountId,
    position_id: PositionId,
    request_id: Option<&str>,
    ttl_seconds: i64,
) -> Result<bool> {
    let rows = client
        .execute(
            "INSERT INTO position_close_locks (account_id, position_id, request_id, expires_at) \
             VALUES ($1, $2, $3, now() + ($4 || ' seconds')::interval) \
             ON CONFLICT (position_id) DO NOTHING",
            &[&account_id.get(), &position_id.get(), &request_id, &ttl_seconds.to_string()],
        )
        .await?;
    Ok(rows == 1)
}

pub async fn release_close_position_lock(client: &impl GenericClient, position_id: PositionId) -> Result<()> {
    client
        .execute("DELETE FROM position_close_locks WHERE position_id = $1", &[&position_id.get()])
        .await?;
    Ok(())
}

/// `PermanentCommandError` recovery path for a failed `close_position`
/// (spec.md §4.5 error model: "reopen position if the failed command was a
/// close_position"). No-op if the position never actually closed.
pub async fn reopen_position_if_close_requested(client: &impl GenericClient, position_id: PositionId) -> Result<()> {
    client
        .execute(
            "UPDATE positions SET state = 'open', closed_at = NULL WHERE id = $1 AND state = 'closed'",
            &[&position_id.get()],
        )
        .await?;
    Ok(())
}
