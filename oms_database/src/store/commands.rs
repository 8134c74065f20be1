use tokio_postgres::GenericClient;

use oms_domain::{AccountId, CommandId, CommandPayload, CommandType, PositionCommand, PositionCommandStatus, QueueItemId};

use super::{command_status_from_sql, command_status_to_sql, command_type_from_sql, command_type_to_sql};
use crate::error::{DbError, Result};

pub async fn insert_position_command(
    client: &impl GenericClient,
    account_id: AccountId,
    command_type: CommandType,
    request_id: Option<&str>,
    payload: &CommandPayload,
) -> Result<PositionCommand> {
    let payload_json = serde_json::to_value(payload).expect("CommandPayload always serializes");
    let row = client
        .query_one(
            "INSERT INTO position_commands (account_id, command_type, request_id, payload_json, status) \
             VALUES ($1,$2,$3,$4,$5) RETURNING id",
            &[
                &account_id.get(),
                &command_type_to_sql(command_type),
                &request_id,
                &payload_json,
                &command_status_to_sql(PositionCommandStatus::Accepted),
            ],
        )
        .await?;
    Ok(PositionCommand {
        id: CommandId::from(row.get::<_, i64>("id")),
        account_id,
        command_type,
        request_id: request_id.map(str::to_owned),
        payload: payload.clone(),
        status: PositionCommandStatus::Accepted,
    })
}

/// Re-loads a command's account/type/payload given only the id a claimed
/// queue row carries (spec.md §4.1, §4.8 — the queue worker claims
/// `command_id` and must look the rest up before dispatching to the
/// executor).
pub async fn fetch_position_command(client: &impl GenericClient, command_id: CommandId) -> Result<Option<PositionCommand>> {
    let row = client
        .query_opt(
            "SELECT id, account_id, command_type, request_id, payload_json, status FROM position_commands WHERE id = $1",
            &[&command_id.get()],
        )
        .await?;
    row.map(|row| {
        let command_type: String = row.get("command_type");
        let status: String = row.get("status");
        let payload_json: serde_json::Value = row.get("payload_json");
        Ok(PositionCommand {
            id: CommandId::from(row.get::<_, i64>("id")),
            account_id: AccountId::from(row.get::<_, i64>("account_id")),
            command_type: command_type_from_sql(&command_type).ok_or(DbError::Decode {
                field: "command_type",
                reason: command_type.clone(),
            })?,
            request_id: row.get("request_id"),
            payload: serde_json::from_value(payload_json)
                .map_err(|err| DbError::Decode {
                    field: "payload_json",
                    reason: err.to_string(),
                })?,
            status: command_status_from_sql(&status).ok_or(DbError::Decode {
                field: "status",
                reason: status.clone(),
            })?,
        })
    })
    .transpose()
}

pub async fn enqueue_command(
    client: &impl GenericClient,
    account_id: AccountId,
    pool_id: &str,
    command_id: CommandId,
) -> Result<QueueItemId> {
    let row = client
        .query_one(
            "INSERT INTO command_queue (account_id, pool_id, command_id, status, available_at) \
             VALUES ($1,$2,$3,'queued', now()) RETURNING id",
            &[&account_id.get(), &pool_id, &command_id.get()],
        )
        .await?;
    Ok(QueueItemId::from(row.get::<_, i64>("id")))
}

/// One claimed queue row: `(queue_id, command_id, account_id, attempts)`
/// (spec.md §4.1, §4.8).
#[derive(Debug, Clone, Copy)]
pub struct ClaimedQueueItem {
    pub queue_id: QueueItemId,
    pub command_id: CommandId,
    pub account_id: AccountId,
    pub attempts: i32,
}

/// Atomically selects the oldest `queued` row whose `available_at <= now`,
/// marks it `processing`, and records the claimer, using `FOR UPDATE SKIP
/// LOCKED` so concurrent queue workers never collide (spec.md §4.1, §5
/// "Queue claiming uses row-level FOR UPDATE SKIP LOCKED").
pub async fn claim_next_queue_item(
    client: &impl GenericClient,
    pool_id: &str,
    worker_id: &str,
) -> Result<Option<ClaimedQueueItem>> {
    let row = client
        .query_opt(
            "UPDATE command_queue SET status = 'processing', attempts = attempts + 1, \
             locked_by = $2, locked_at = now() \
             WHERE id = ( \
                 SELECT id FROM command_queue \
                 WHERE pool_id = $1 AND status = 'queued' AND available_at <= now() \
                 ORDER BY available_at, id \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1 \
             ) \
             RETURNING id, command_id, account_id, attempts",
            &[&pool_id, &worker_id],
        )
        .await?;
    Ok(row.map(|row| ClaimedQueueItem {
        queue_id: QueueItemId::from(row.get::<_, i64>("id")),
        command_id: CommandId::from(row.get::<_, i64>("command_id")),
        account_id: AccountId::from(row.get::<_, i64>("account_id")),
        attempts: row.get("attempts"),
    }))
}

pub async fn mark_queue_done(client: &impl GenericClient, queue_id: QueueItemId) -> Result<()> {
    client
        .execute("UPDATE command_queue SET status = 'done' WHERE id = $1", &[&queue_id.get()])
        .await?;
    Ok(())
}

/// Re-queues with backoff (spec.md §4.1, §4.8 "Other exception -> mark
/// queue_failed(delay_seconds)").
pub async fn mark_queue_failed(client: &impl GenericClient, queue_id: QueueItemId, delay_seconds: i64) -> Result<()> {
    client
        .execute(
            "UPDATE command_queue SET status = 'queued', available_at = now() + ($2 || ' seconds')::interval, \
             locked_by = NULL, locked_at = NULL WHERE id = $1",
            &[&queue_id.get(), &delay_seconds.to_string()],
        )
        .await?;
    Ok(())
}

pub async fn mark_queue_dead(client: &impl GenericClient, queue_id: QueueItemId) -> Result<()> {
    client
        .execute("UPDATE command_queue SET status = 'failed' WHERE id = $1", &[&queue_id.get()])
        .await?;
    Ok(())
}

pub async fn mark_command_completed(client: &impl GenericClient, command_id: CommandId) -> Result<()> {
    client
        .execute(
            "UPDATE position_commands SET status = $1 WHERE id = $2",
            &[&command_status_to_sql(PositionCommandStatus::Completed), &command_id.get()],
        )
        .await?;
    Ok(())
}

pub async fn mark_command_failed(client: &impl GenericClient, command_id: CommandId) -> Result<()> {
    client
        .execute(
            "UPDATE position_commands SET status = $1 WHERE id = $2",
            &[&command_status_to_sql(PositionCommandStatus::Failed), &command_id.get()],
        )
        .await?;
    Ok(())
}
