//! Queue workers (spec.md §4.8), grounded on
//! `dispatcher_server.py::_queue_worker_loop` and
//! `command_executor.py::execute_command_by_id`'s status bookkeeping: one
//! task per `(pool_id, worker_id)` claims the oldest due `command_queue` row,
//! loads the command it names, runs it through `executor::execute_command`,
//! then settles both the command and queue rows in the same transaction the
//! command ran in.
//!
//! Ownership split (SPEC_FULL.md §9, DESIGN.md Open Question 6):
//! `executor.rs` only rolls back domain state on failure and returns
//! `Result<(), ExecutorError>`; this module is the sole writer of
//! `position_commands.status` and `command_queue.status`.

use std::time::Duration;

use oms_database::{accounts, commands, DbPool};

use oms_domain::{AccountId, CommandId, QueueItemId};
use oms_utils::cancellation_token::CancellationToken;

use crate::credentials::resolve_exchange_credentials;
use crate::exchange::adapter::ExchangeAdapter;
use crate::{executor, CredentialsCodec};

/// One worker's identity and backoff policy (spec.md §4.1 `command_queue`,
/// §4.8).
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    pub pool_id: String,
    pub worker_id: String,
    pub poll_interval: Duration,
    pub retry_delay_seconds: i64,
    pub max_attempts: i32,
}

/// Runs until `cancellation_token` fires. Intended to be spawned one task per
/// `(pool_id, worker_id)` pair — `oms_server`'s startup spawns
/// `dispatcher.{ccxt,ccxtpro}_pool_size` of these per engine family.
pub async fn run_queue_worker(
    pool: DbPool,
    adapter: std::sync::Arc<ExchangeAdapter>,
    credentials_codec: std::sync::Arc<CredentialsCodec>,
    config: QueueWorkerConfig,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("queue worker {}/{} started", config.pool_id, config.worker_id);
    loop {
        if cancellation_token.is_cancellation_requested() {
            return Ok(());
        }

        let claimed = {
            let conn = pool.get().await?;
            commands::claim_next_queue_item(&*conn, &config.pool_id, &config.worker_id).await?
        };

        let Some(item) = claimed else {
            tokio::select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                _ = cancellation_token.when_cancelled() => return Ok(()),
            }
            continue;
        };

        if let Err(err) = process_claimed_item(&pool, &adapter, &credentials_codec, &config, item).await {
            log::error!(
                "queue worker {}/{} failed processing queue item {}: {err:?}",
                config.pool_id,
                config.worker_id,
                item.queue_id
            );
        }
    }
}

async fn process_claimed_item(
    pool: &DbPool,
    adapter: &ExchangeAdapter,
    credentials_codec: &CredentialsCodec,
    config: &QueueWorkerConfig,
    item: commands::ClaimedQueueItem,
) -> anyhow::Result<()> {
    let mut conn = pool.get().await?;
    let tx = conn.transaction().await?;

    let command = commands::fetch_position_command(&tx, item.command_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("queued command {} no longer exists", item.command_id))?;
    let account = accounts::fetch_account(&tx, item.account_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("account {} for queued command no longer exists", item.account_id))?;
    let stored_credentials = accounts::fetch_account_credentials(&tx, item.account_id).await?;
    let credentials = resolve_exchange_credentials(&account, stored_credentials.as_ref(), credentials_codec)?;

    let outcome = executor::execute_command(&tx, adapter, &account, &credentials, &command).await;

    match outcome {
        Ok(()) => {
            commands::mark_command_completed(&tx, command.id).await?;
            commands::mark_queue_done(&tx, item.queue_id).await?;
        }
        Err(err) => {
            log::warn!(
                "command {} (queue item {}) failed on attempt {}: {err}",
                command.id,
                item.queue_id,
                item.attempts
            );
            commands::mark_command_failed(&tx, command.id).await?;
            if err.is_permanent() || item.attempts >= config.max_attempts {
                commands::mark_queue_dead(&tx, item.queue_id).await?;
            } else {
                commands::mark_queue_failed(&tx, item.queue_id, config.retry_delay_seconds).await?;
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

#[allow(dead_code)]
fn describe_claim(account_id: AccountId, command_id: CommandId, queue_id: QueueItemId) -> String {
    format!("account={account_id} command={command_id} queue_item={queue_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_carries_pool_identity() {
        let config = QueueWorkerConfig {
            pool_id: "ccxt".to_owned(),
            worker_id: "ccxt-0".to_owned(),
            poll_interval: Duration::from_millis(250),
            retry_delay_seconds: 30,
            max_attempts: 10,
        };
        assert_eq!(config.pool_id, "ccxt");
        assert_eq!(config.worker_id, "ccxt-0");
    }

    #[test]
    fn describe_claim_mentions_every_id() {
        let description = describe_claim(AccountId::from(1), CommandId::from(2), QueueItemId::from(3));
        assert!(description.contains("account=1"));
        assert!(description.contains("command=2"));
        assert!(description.contains("queue_item=3"));
    }
}
