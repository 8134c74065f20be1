//! Process entry point (SPEC_FULL.md §1 "[ADDED] Crate boundary"): the only
//! place the tokio runtime, signal handling and logger initialization are
//! touched. Everything else — config shape, the dispatcher, the queue
//! workers, the reconciler — lives in library crates and is unit-tested
//! there; this binary just wires them together, the way the teacher's
//! `src/main.rs` wires `launch_trading_engine` on top of `AppSettings`.

mod null_exchange;

use std::sync::Arc;
use std::time::Duration;

use oms_core::config::Settings;
use oms_core::credentials::resolve_exchange_credentials;
use oms_core::dispatcher::Dispatcher;
use oms_core::exchange::ExchangeAdapter;
use oms_core::queue_worker::{run_queue_worker, QueueWorkerConfig};
use oms_core::reconciler;
use oms_core::CredentialsCodec;
use oms_database::{accounts, connect_pool, migrator};
use oms_utils::cancellation_token::CancellationToken;

use null_exchange::NullExchangeFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    oms_utils::logger::init_logger();

    let config_path = std::env::var("OMS_CONFIG").unwrap_or_else(|_| "./config/oms_server.toml".to_owned());
    let settings = Settings::load(std::path::Path::new(&config_path))
        .map_err(|err| anyhow::anyhow!("loading settings from {config_path}: {err}"))?;

    let master_key = std::env::var("OMS_CREDENTIALS_MASTER_KEY")
        .map_err(|_| anyhow::anyhow!("OMS_CREDENTIALS_MASTER_KEY must be set"))?;
    let credentials_codec = Arc::new(CredentialsCodec::new(master_key.as_bytes()));

    log::info!("connecting to database");
    let pool = connect_pool(&settings.database.url, settings.database.max_connections).await?;
    migrator::apply_migrations(&settings.database.url).await?;

    let adapter = Arc::new(ExchangeAdapter::new(
        Arc::new(NullExchangeFactory),
        Duration::from_secs(settings.dispatcher.session_ttl_seconds),
    ));

    let cancellation_token = CancellationToken::new();
    spawn_signal_handler(cancellation_token.clone());

    for family in ["ccxt", "ccxtpro"] {
        let pool_size = match family {
            "ccxt" => settings.dispatcher.ccxt_pool_size,
            _ => settings.dispatcher.ccxtpro_pool_size,
        };
        for worker_id in 0..pool_size.max(1) {
            let config = QueueWorkerConfig {
                pool_id: family.to_owned(),
                worker_id: format!("{family}-{worker_id}"),
                poll_interval: Duration::from_millis(settings.queue.poll_interval_ms),
                retry_delay_seconds: settings.queue.retry_delay_seconds,
                max_attempts: settings.queue.max_attempts,
            };
            let pool = pool.clone();
            let adapter = adapter.clone();
            let credentials_codec = credentials_codec.clone();
            let token = cancellation_token.clone();
            tokio::spawn(async move {
                if let Err(err) = run_queue_worker(pool, adapter, credentials_codec, config, token).await {
                    log::error!("queue worker exited: {err:?}");
                }
            });
        }
    }

    tokio::spawn(run_reconciliation_loop(
        pool.clone(),
        adapter.clone(),
        credentials_codec.clone(),
        settings.reconciler.clone(),
        cancellation_token.clone(),
    ));

    Dispatcher::serve(pool, adapter, credentials_codec, settings.dispatcher.clone(), cancellation_token).await
}

/// One sweep per configured interval over every active account, grounded
/// on `worker_position.py`'s per-account periodic reconciliation task
/// (spec.md §4.6: "Runs periodically per account and on demand" — the
/// dispatcher's `reconcile_now` op covers the on-demand half, this loop
/// covers "periodically").
async fn run_reconciliation_loop(
    pool: oms_database::DbPool,
    adapter: Arc<ExchangeAdapter>,
    credentials_codec: Arc<CredentialsCodec>,
    settings: oms_core::config::ReconcilerSettings,
    cancellation_token: CancellationToken,
) {
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);
    loop {
        tokio::select! {
            _ = cancellation_token.when_cancelled() => return,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let accounts = match pool.get().await {
            Ok(conn) => match accounts::list_accounts(&*conn).await {
                Ok(accounts) => accounts,
                Err(err) => {
                    log::warn!("reconciliation sweep: failed to list accounts: {err}");
                    continue;
                }
            },
            Err(err) => {
                log::warn!("reconciliation sweep: failed to borrow connection: {err}");
                continue;
            }
        };

        for account in accounts {
            if !matches!(account.status, oms_domain::AccountStatus::Active) {
                continue;
            }
            if let Err(err) = reconcile_one_account(&pool, &adapter, &credentials_codec, &settings, &account).await {
                log::warn!("reconciliation of account {} failed: {err:?}", account.id);
            }
        }
    }
}

async fn reconcile_one_account(
    pool: &oms_database::DbPool,
    adapter: &ExchangeAdapter,
    credentials_codec: &CredentialsCodec,
    settings: &oms_core::config::ReconcilerSettings,
    account: &oms_domain::Account,
) -> anyhow::Result<()> {
    let mut conn = pool.get().await?;
    let stored = accounts::fetch_account_credentials(&*conn, account.id).await?;
    let credentials = resolve_exchange_credentials(account, stored.as_ref(), credentials_codec)?;

    let tx = conn.transaction().await?;
    let outcome = reconciler::reconcile_account(
        &tx,
        adapter,
        account,
        &credentials,
        settings.lookback_seconds,
        200,
        settings.symbol_fallback_limit as i64,
    )
    .await?;
    tx.commit().await?;

    log::debug!(
        "reconciled account {}: {} trades fetched, {} applied",
        account.id,
        outcome.trades_fetched,
        outcome.trades_applied
    );
    Ok(())
}

#[cfg(unix)]
fn spawn_signal_handler(cancellation_token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        log::info!("shutdown signal received");
        cancellation_token.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(cancellation_token: CancellationToken) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("shutdown signal received");
        cancellation_token.cancel();
    });
}
