//! The line-delimited JSON RPC server (spec.md §4.4, §6), grounded on
//! `dispatcher_server.py::Dispatcher`: one TCP listener, two worker pools
//! split by engine family (`ccxt`/`ccxtpro` — a generalization of the
//! original's single flat pool, DESIGN.md Open Question), account-to-worker
//! pinning with a DB-persisted hint so a restart doesn't scatter a busy
//! account's session cache, and a per-account lock inside each worker as a
//! second line of defense against the pinning ever being violated.
//!
//! Every op the worker handles borrows its own connection from the pool for
//! the duration of the call; `oms_commands_batch` is the only op that writes
//! anything durable here, and it writes through `intake::process_single_command`
//! rather than executing trades inline — execution happens later on the
//! `command_queue`, picked up by `queue_worker::run_queue_worker`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use oms_database::{accounts, admin, deals, events, orders, positions, reconciliation, risk, DbPool};
use oms_domain::event::EventNamespace;
use oms_domain::{AccountId, AccountStatus, ApiKeyId, EventId, OrderId, PositionId, PositionMode, StrategyId, StrategyStatus, UserId};
use oms_rpc::envelope::{CommandInput, CommandResult};
use oms_rpc::ops::OmsQueryKind;
use oms_rpc::{ErrorCode, Op, Request, Response, RpcError, MAX_FRAME_BYTES};
use oms_utils::cancellation_token::CancellationToken;

use crate::auth::{self, AuthContext, Role};
use crate::config::DispatcherSettings;
use crate::credentials::{resolve_exchange_credentials, CredentialsCodec};
use crate::error::DispatchError;
use crate::event_ring::{EventRing, RingEvent};
use crate::exchange::adapter::ExchangeAdapter;
use crate::intake;
use crate::reconciler::{self, CURSOR_ENTITY};

type DResult<T> = Result<T, DispatchError>;

/// One unit of work handed to a worker: the raw request plus where to send
/// the answer. Auth happens inside the worker, not before enqueueing, the
/// same as `_execute` running entirely inside `_worker_loop` in the Python
/// original.
struct Job {
    request: Request,
    respond_to: oneshot::Sender<Response>,
}

/// Per-engine-family worker pool. Each worker is a single-consumer loop over
/// its own channel, so jobs pinned to one worker already run one at a time —
/// `account_locks` is belt-and-suspenders against the pinning ever being
/// bypassed (spec.md §4.4 "per-account serialization").
struct EnginePool {
    name: &'static str,
    senders: Vec<mpsc::UnboundedSender<Job>>,
    inflight: Vec<AtomicI64>,
    active_accounts: Vec<DashMap<AccountId, ()>>,
    account_worker: DashMap<AccountId, usize>,
    account_locks: DashMap<AccountId, Arc<AsyncMutex<()>>>,
}

impl EnginePool {
    fn new(name: &'static str, size: usize) -> (Arc<Self>, Vec<mpsc::UnboundedReceiver<Job>>) {
        let mut senders = Vec::with_capacity(size);
        let mut receivers = Vec::with_capacity(size);
        let mut inflight = Vec::with_capacity(size);
        let mut active_accounts = Vec::with_capacity(size);
        for _ in 0..size.max(1) {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(rx);
            inflight.push(AtomicI64::new(0));
            active_accounts.push(DashMap::new());
        }
        (
            Arc::new(Self {
                name,
                senders,
                inflight,
                active_accounts,
                account_worker: DashMap::new(),
                account_locks: DashMap::new(),
            }),
            receivers,
        )
    }

    fn size(&self) -> usize {
        self.senders.len()
    }
}

/// The dispatcher's shared state; cheap to clone, intended to live behind an
/// `Arc` for the lifetime of the process.
pub struct Dispatcher {
    pool: DbPool,
    adapter: Arc<ExchangeAdapter>,
    credentials_codec: Arc<CredentialsCodec>,
    event_ring: Arc<EventRing>,
    settings: DispatcherSettings,
    engines: HashMap<&'static str, Arc<EnginePool>>,
    last_fanout_id: AtomicI64,
}

impl Dispatcher {
    pub fn new(
        pool: DbPool,
        adapter: Arc<ExchangeAdapter>,
        credentials_codec: Arc<CredentialsCodec>,
        settings: DispatcherSettings,
    ) -> (Arc<Self>, Vec<(&'static str, usize, mpsc::UnboundedReceiver<Job>)>) {
        let (ccxt_pool, ccxt_rx) = EnginePool::new("ccxt", settings.ccxt_pool_size);
        let (ccxtpro_pool, ccxtpro_rx) = EnginePool::new("ccxtpro", settings.ccxtpro_pool_size);

        let mut engines = HashMap::new();
        engines.insert("ccxt", ccxt_pool);
        engines.insert("ccxtpro", ccxtpro_pool);

        let event_ring = Arc::new(EventRing::new(settings.event_ring_capacity));

        let mut receivers = Vec::new();
        for (worker_id, rx) in ccxt_rx.into_iter().enumerate() {
            receivers.push(("ccxt", worker_id, rx));
        }
        for (worker_id, rx) in ccxtpro_rx.into_iter().enumerate() {
            receivers.push(("ccxtpro", worker_id, rx));
        }

        let dispatcher = Arc::new(Self {
            pool,
            adapter,
            credentials_codec,
            event_ring,
            settings,
            engines,
            last_fanout_id: AtomicI64::new(0),
        });
        (dispatcher, receivers)
    }

    /// Builds the dispatcher, spawns every worker loop, binds the listener,
    /// and serves connections until `cancellation_token` fires.
    pub async fn serve(
        pool: DbPool,
        adapter: Arc<ExchangeAdapter>,
        credentials_codec: Arc<CredentialsCodec>,
        settings: DispatcherSettings,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        let bind_addr = settings.bind_addr.clone();
        let (dispatcher, receivers) = Self::new(pool, adapter, credentials_codec, settings);

        for (family, worker_id, rx) in receivers {
            let dispatcher = dispatcher.clone();
            tokio::spawn(dispatcher.worker_loop(family, worker_id, rx));
        }
        tokio::spawn(dispatcher.clone().outbox_fanout_loop(cancellation_token.clone()));

        let listener = TcpListener::bind(&bind_addr).await?;
        log::info!("dispatcher listening on {bind_addr}");

        loop {
            tokio::select! {
                _ = cancellation_token.when_cancelled() => {
                    log::info!("dispatcher shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let dispatcher = dispatcher.clone();
                    let token = cancellation_token.clone();
                    tokio::spawn(async move {
                        if let Err(err) = dispatcher.handle_connection(stream, token).await {
                            log::debug!("connection from {peer} closed: {err}");
                        }
                    });
                }
            }
        }
    }

    async fn worker_loop(self: Arc<Self>, family: &'static str, worker_id: usize, mut rx: mpsc::UnboundedReceiver<Job>) {
        log::info!("dispatcher worker {family}/{worker_id} started");
        let engine = self.engines[family].clone();
        while let Some(job) = rx.recv().await {
            engine.inflight[worker_id].fetch_add(1, Ordering::SeqCst);
            let account_id = job.request.account_id;
            let lock = account_id.map(|id| engine.account_locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone());
            let started = std::time::Instant::now();
            let response = match lock {
                Some(lock) => {
                    let _guard = lock.lock().await;
                    self.execute(job.request).await
                }
                None => self.execute(job.request).await,
            };
            engine.inflight[worker_id].fetch_sub(1, Ordering::SeqCst);
            log::debug!(
                "dispatcher worker {family}/{worker_id} handled request in {:?}",
                started.elapsed()
            );
            let _ = job.respond_to.send(response);
        }
    }

    async fn handle_connection(&self, stream: TcpStream, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            line.clear();
            let read = tokio::select! {
                _ = cancellation_token.when_cancelled() => return Ok(()),
                read = reader.read_line(&mut line) => read?,
            };
            if read == 0 {
                return Ok(()); // client disconnected
            }
            if line.len() > MAX_FRAME_BYTES {
                let response = Response::err(RpcError::new(ErrorCode::DispatcherInvalidJson));
                write_response(&mut write_half, &response).await?;
                return Ok(());
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let request: Request = match serde_json::from_str(trimmed) {
                Ok(request) => request,
                Err(err) => {
                    let response = Response::err(RpcError::with_message(ErrorCode::DispatcherInvalidJson, err.to_string()));
                    write_response(&mut write_half, &response).await?;
                    return Ok(());
                }
            };
            let timeout_seconds = request.timeout_seconds;
            let response = self.route(request).await;
            let response = match timeout_seconds {
                None => response,
                Some(_) => response,
            };
            write_response(&mut write_half, &response).await?;
        }
    }

    /// Resolves which worker handles `request`, enqueues it, and awaits the
    /// reply (spec.md §4.4 `_dispatch_to_account`/account-less routing).
    async fn route(&self, request: Request) -> Response {
        let family = match self.resolve_family(&request).await {
            Ok(family) => family,
            Err(err) => return Response::err(err.into()),
        };
        let engine = self.engines[family].clone();
        let worker_id = match request.account_id {
            Some(account_id) if request.op.is_account_scoped() => match self.resolve_worker(&engine, account_id).await {
                Ok(worker_id) => worker_id,
                Err(err) => return Response::err(err.into()),
            },
            _ => 0,
        };

        let timeout_seconds = request.timeout_seconds;
        let (tx, rx) = oneshot::channel();
        if engine.senders[worker_id].send(Job { request, respond_to: tx }).is_err() {
            return Response::err(RpcError::new(ErrorCode::DispatcherUnavailable));
        }

        match timeout_seconds {
            Some(seconds) => match tokio::time::timeout(Duration::from_secs(seconds), rx).await {
                Ok(Ok(response)) => response,
                Ok(Err(_)) => Response::err(RpcError::new(ErrorCode::DispatcherEmptyResponse)),
                Err(_) => Response::err(RpcError::new(ErrorCode::DispatcherTimeout)),
            },
            None => rx.await.unwrap_or_else(|_| Response::err(RpcError::new(ErrorCode::DispatcherEmptyResponse))),
        }
    }

    /// Account-scoped ops route by the account's own exchange engine; the
    /// rest run on worker 0 of the `ccxt` family (spec.md §4.4).
    async fn resolve_family(&self, request: &Request) -> DResult<&'static str> {
        if !request.op.is_account_scoped() {
            return Ok("ccxt");
        }
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let conn = self.pool.get().await.map_err(oms_database::DbError::from)?;
        let account = accounts::fetch_account(&*conn, account_id).await?.ok_or(DispatchError::AccountNotFound)?;
        let exchange_id = account.parsed_exchange_id().map_err(|_| DispatchError::AccountNotFound)?;
        Ok(exchange_id.engine.as_str())
    }

    async fn resolve_worker(&self, engine: &Arc<EnginePool>, account_id: AccountId) -> DResult<usize> {
        if let Some(worker_id) = engine.account_worker.get(&account_id) {
            return Ok(*worker_id);
        }
        let conn = self.pool.get().await.map_err(oms_database::DbError::from)?;
        if let Some(hint) = oms_database::auth::fetch_account_dispatcher_worker_hint(&*conn, account_id).await? {
            if hint >= 0 && (hint as usize) < engine.size() {
                let worker_id = hint as usize;
                engine.account_worker.insert(account_id, worker_id);
                engine.active_accounts[worker_id].insert(account_id, ());
                return Ok(worker_id);
            }
        }
        let worker_id = (0..engine.size())
            .min_by_key(|&id| (engine.inflight[id].load(Ordering::SeqCst), engine.active_accounts[id].len(), id))
            .unwrap_or(0);
        engine.account_worker.insert(account_id, worker_id);
        engine.active_accounts[worker_id].insert(account_id, ());
        oms_database::auth::set_account_dispatcher_worker_hint(&*conn, account_id, worker_id as i32).await?;
        log::debug!("account {account_id} pinned to worker {worker_id} ({})", engine.name);
        Ok(worker_id)
    }

    /// Authenticates the caller and routes to the op handler. Everything
    /// below this point runs inside a worker, holding that worker's
    /// per-account lock if the request carried an account id.
    async fn execute(&self, request: Request) -> Response {
        let conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(err) => return Response::err(DispatchError::from(oms_database::DbError::from(err)).into()),
        };
        let auth = match auth::authenticate(&*conn, &request.x_api_key).await {
            Ok(auth) => auth,
            Err(err) => return Response::err(DispatchError::from(err).into()),
        };
        drop(conn);

        match self.dispatch_op(&auth, &request).await {
            Ok(result) => Response::ok(result),
            Err(err) => Response::err(err.into()),
        }
    }

    async fn dispatch_op(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        match request.op {
            Op::AuthCheck => self.op_auth_check(auth).await,
            Op::AuthorizeAccount => self.op_authorize_account(auth, request).await,
            Op::AccountsList => self.op_accounts_list(auth).await,
            Op::MetaCcxtExchanges => self.op_meta_ccxt_exchanges().await,
            Op::CcxtCall => self.op_ccxt_call(auth, request).await,
            Op::CcxtBatch => self.op_ccxt_batch(auth, request).await,
            Op::OmsCommandsBatch => self.op_oms_commands_batch(auth, request).await,
            Op::OmsQuery => self.op_oms_query(auth, request).await,
            Op::CcxtRawQuery => self.op_ccxt_call(auth, request).await,
            Op::CcxtRawQueryMulti => self.op_ccxt_raw_query_multi(auth, request).await,
            Op::OmsReassign => self.op_oms_reassign(auth, request).await,
            Op::ReconcileNow => self.op_reconcile_now(auth, request).await,
            Op::ReconcileStatusAccount => self.op_reconcile_status_account(auth, request).await,
            Op::ReconcileStatusList => self.op_reconcile_status_list(auth, request).await,
            Op::RiskSetAllowNewPositions => self.op_risk_set_allow_new_positions(auth, request).await,
            Op::RiskSetStrategyAllowNewPositions => self.op_risk_set_strategy_allow_new_positions(auth, request).await,
            Op::RiskSetAccountStatus => self.op_risk_set_account_status(auth, request).await,
            Op::AdminCreateAccount => self.op_admin_create_account(auth, request).await,
            Op::AdminListAccounts => self.op_admin_list_accounts(auth).await,
            Op::AdminUpdateAccount => self.op_admin_update_account(auth, request).await,
            Op::AdminCreateUserApiKey => self.op_admin_create_user_api_key(auth, request).await,
            Op::AdminListUsersApiKeys => self.op_admin_list_users_api_keys(auth, request).await,
            Op::AdminCreateApiKey => self.op_admin_create_api_key(auth, request).await,
            Op::AdminUpdateApiKey => self.op_admin_update_api_key(auth, request).await,
            Op::AdminListApiKeyPermissions => self.op_admin_list_api_key_permissions(auth, request).await,
            Op::AdminUpsertApiKeyPermission => self.op_admin_upsert_api_key_permission(auth, request).await,
            Op::AdminCreateStrategy => self.op_admin_create_strategy(auth, request).await,
            Op::AdminListStrategies => self.op_admin_list_strategies(auth).await,
            Op::AdminUpdateStrategy => self.op_admin_update_strategy(auth, request).await,
            Op::AdminOmsQuery => self.op_admin_oms_query(auth, request).await,
            Op::AdminOmsMutate => self.op_admin_oms_mutate(auth, request).await,
            Op::AuthLoginPassword => self.op_auth_login_password(request).await,
            Op::UserProfileGet => self.op_user_profile_get(auth).await,
            Op::UserProfileUpdate => self.op_user_profile_update(auth, request).await,
            Op::UserPasswordUpdate => self.op_user_password_update(auth, request).await,
            Op::UserApiKeysList => self.op_user_api_keys_list(auth).await,
            Op::UserApiKeysCreate => self.op_user_api_keys_create(auth, request).await,
            Op::UserApiKeysUpdate => self.op_user_api_keys_update(auth, request).await,
            Op::WsTailId => self.op_ws_tail_id(request),
            Op::WsPullEvents => self.op_ws_pull_events(request),
            Op::Status => self.op_status(),
        }
    }

    // -- account / auth ops -------------------------------------------------

    async fn op_auth_check(&self, auth: &AuthContext) -> DResult<Value> {
        Ok(json!({
            "api_key_id": auth.api_key_id,
            "role": auth.role.as_str(),
            "is_admin": auth.is_admin,
        }))
    }

    async fn op_authorize_account(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let conn = self.conn().await?;
        let account = auth::require_account_permission(&*conn, auth, account_id, false).await?;
        Ok(json!({"account_id": account.id, "can_read": true}))
    }

    async fn op_accounts_list(&self, auth: &AuthContext) -> DResult<Value> {
        let conn = self.conn().await?;
        if auth.is_admin {
            let all = accounts::list_accounts(&*conn).await?;
            return Ok(serde_json::to_value(all)?);
        }
        let perms = admin::list_api_key_account_permissions(&*conn, ApiKeyId::from(auth.api_key_id)).await?;
        let mut out = Vec::new();
        for (account_id, _can_trade, can_read) in perms {
            if !can_read {
                continue;
            }
            if let Some(account) = accounts::fetch_account(&*conn, account_id).await? {
                out.push(account);
            }
        }
        Ok(serde_json::to_value(out)?)
    }

    /// No embedded ccxt runtime to introspect at startup, so this returns a
    /// fixed set of exchange classes rather than ccxt's full registry
    /// (DESIGN.md: reduced surface).
    async fn op_meta_ccxt_exchanges(&self) -> DResult<Value> {
        Ok(json!({"exchanges": ["binance", "okx", "bybit", "kraken", "coinbase", "bitget"]}))
    }

    // -- ccxt relay ops ------------------------------------------------------

    async fn op_ccxt_call(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            method: String,
            #[serde(default)]
            args: Vec<Value>,
            #[serde(default)]
            kwargs: Value,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let require_trade = ccxt_method_requires_trade(&params.method);
        let conn = self.conn().await?;
        let account = auth::require_account_permission(&*conn, auth, account_id, require_trade).await?;
        let stored = accounts::fetch_account_credentials(&*conn, account_id).await?;
        let credentials = resolve_exchange_credentials(&account, stored.as_ref(), &self.credentials_codec)
            .map_err(|err| DispatchError::Intake(crate::error::IntakeError::Validation(err.to_string())))?;
        let exchange_id = account.parsed_exchange_id().map_err(|_| DispatchError::AccountNotFound)?;
        let session_key = format!("account:{account_id}");
        let result = self
            .adapter
            .execute_method(&exchange_id, &session_key, &credentials, &params.method, params.args, params.kwargs)
            .await?;
        Ok(result)
    }

    async fn op_ccxt_batch(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Item {
            account_id: AccountId,
            method: String,
            #[serde(default)]
            args: Vec<Value>,
            #[serde(default)]
            kwargs: Value,
        }
        let batch: Batch<Item> = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;

        let mut results = Vec::with_capacity(batch.items.len());
        for (index, item) in batch.items.into_iter().enumerate() {
            if !item.account_id.is_set() {
                results.push(json!({"index": index, "ok": false, "error": {"code": "missing_account_id"}}));
                continue;
            }
            let sub_request = Request {
                op: Op::CcxtCall,
                x_api_key: request.x_api_key.clone(),
                account_id: Some(item.account_id),
                timeout_seconds: None,
                params: json!({"method": item.method, "args": item.args, "kwargs": item.kwargs}),
            };
            let outcome = self.op_ccxt_call(auth, &sub_request).await;
            results.push(match outcome {
                Ok(value) => json!({"index": index, "ok": true, "result": value}),
                Err(err) => json!({"index": index, "ok": false, "error": RpcError::from(err)}),
            });
        }
        Ok(json!({"results": results}))
    }

    /// Reduced surface: same relay as `ccxt_call`, applied to a fixed set of
    /// accounts and returned as one array (DESIGN.md).
    async fn op_ccxt_raw_query_multi(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            account_ids: Vec<AccountId>,
            method: String,
            #[serde(default)]
            args: Vec<Value>,
            #[serde(default)]
            kwargs: Value,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let mut out = Vec::with_capacity(params.account_ids.len());
        for account_id in params.account_ids {
            let sub_request = Request {
                op: Op::CcxtCall,
                x_api_key: request.x_api_key.clone(),
                account_id: Some(account_id),
                timeout_seconds: None,
                params: json!({"method": params.method, "args": params.args, "kwargs": params.kwargs}),
            };
            let outcome = self.op_ccxt_call(auth, &sub_request).await;
            out.push(match outcome {
                Ok(value) => json!({"account_id": account_id, "ok": true, "result": value}),
                Err(err) => json!({"account_id": account_id, "ok": false, "error": RpcError::from(err)}),
            });
        }
        Ok(json!({"results": out}))
    }

    // -- command intake -------------------------------------------------------

    async fn op_oms_commands_batch(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        let batch: Batch<CommandInput> =
            serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;

        let mut results: Vec<CommandResult> = Vec::with_capacity(batch.items.len());
        if batch.parallel {
            let mut futures = Vec::with_capacity(batch.items.len());
            for (index, item) in batch.items.into_iter().enumerate() {
                futures.push(intake::process_single_command(
                    &*conn,
                    auth,
                    item.account_id,
                    index,
                    item.payload,
                    item.request_id.as_deref(),
                ));
            }
            results = futures::future::join_all(futures).await;
        } else {
            for (index, item) in batch.items.into_iter().enumerate() {
                let result =
                    intake::process_single_command(&*conn, auth, item.account_id, index, item.payload, item.request_id.as_deref())
                        .await;
                results.push(result);
            }
        }
        Ok(json!({"results": results}))
    }

    // -- read queries -----------------------------------------------------

    async fn op_oms_query(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            kind: OmsQueryKind,
            #[serde(default = "default_query_limit")]
            limit: i64,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let conn = self.conn().await?;
        auth::require_account_permission(&*conn, auth, account_id, false).await?;
        self.run_oms_query(&*conn, account_id, params.kind, params.limit).await
    }

    async fn run_oms_query(
        &self,
        client: &impl tokio_postgres::GenericClient,
        account_id: AccountId,
        kind: OmsQueryKind,
        limit: i64,
    ) -> DResult<Value> {
        let value = match kind {
            OmsQueryKind::OrdersOpen => serde_json::to_value(orders::list_open_orders_for_account(client, account_id).await?)?,
            OmsQueryKind::OrdersHistory => {
                serde_json::to_value(orders::list_order_history_for_account(client, account_id, limit).await?)?
            }
            OmsQueryKind::Deals => serde_json::to_value(deals::list_deals_for_account(client, account_id, limit).await?)?,
            OmsQueryKind::PositionsOpen => serde_json::to_value(positions::list_open_positions_for_account(client, account_id).await?)?,
            OmsQueryKind::PositionsHistory => {
                serde_json::to_value(positions::list_position_history_for_account(client, account_id, limit).await?)?
            }
        };
        Ok(value)
    }

    async fn op_oms_reassign(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            order_ids: Vec<OrderId>,
            strategy_id: StrategyId,
            #[serde(default)]
            position_id: Option<PositionId>,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let conn = self.conn().await?;
        auth::require_account_permission(&*conn, auth, account_id, true).await?;
        auth::require_strategy_permission(&*conn, auth, params.strategy_id).await?;
        let moved = orders::reassign_orders_strategy(&*conn, account_id, &params.order_ids, params.strategy_id, params.position_id)
            .await?;
        Ok(json!({"moved": moved}))
    }

    // -- reconciliation -----------------------------------------------------

    async fn op_reconcile_now(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize, Default)]
        struct Params {
            lookback_seconds: Option<i64>,
            #[serde(default = "default_reconcile_limit")]
            limit: u32,
        }
        let params: Params = serde_json::from_value(request.params.clone()).unwrap_or_default();
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let lookback_seconds = params.lookback_seconds.unwrap_or(3600).max(60);

        let mut conn = self.pool.get().await.map_err(oms_database::DbError::from)?;
        let account = auth::require_account_permission(&*conn, auth, account_id, false).await?;
        let stored = accounts::fetch_account_credentials(&*conn, account_id).await?;
        let credentials = resolve_exchange_credentials(&account, stored.as_ref(), &self.credentials_codec)
            .map_err(|err| DispatchError::Intake(crate::error::IntakeError::Validation(err.to_string())))?;

        let tx = conn.transaction().await.map_err(oms_database::DbError::from)?;
        // spec.md §4.6 "bounded list, e.g. 20" — `reconcile_now` is a one-off
        // on-demand call, not driven by `ReconcilerSettings`, so it uses the
        // spec's own example bound rather than threading settings into `Dispatcher`.
        let outcome = reconciler::reconcile_account(&tx, &self.adapter, &account, &credentials, lookback_seconds, params.limit, 20)
            .await
            .map_err(|err| DispatchError::Intake(crate::error::IntakeError::Validation(err.to_string())))?;
        tx.commit().await.map_err(oms_database::DbError::from)?;

        Ok(json!({
            "account_id": account_id,
            "lookback_seconds": lookback_seconds,
            "trades_fetched": outcome.trades_fetched,
            "trades_applied": outcome.trades_applied,
        }))
    }

    /// The store only persists a numeric cursor watermark, not a full status
    /// row with timestamps, so "status"/"age" here is derived from whether a
    /// cursor exists at all rather than true staleness (DESIGN.md: reduced
    /// surface — no `reconciliation_status` table).
    async fn op_reconcile_status_account(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let conn = self.conn().await?;
        auth::require_account_permission(&*conn, auth, account_id, false).await?;
        let cursor = reconciliation::fetch_reconciliation_cursor(&*conn, account_id, CURSOR_ENTITY).await?;
        Ok(json!({
            "account_id": account_id,
            "status": if cursor.is_some() { "reconciled" } else { "never_run" },
            "cursor": cursor,
        }))
    }

    async fn op_reconcile_status_list(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            account_ids: Vec<AccountId>,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let mut out = Vec::with_capacity(params.account_ids.len());
        for account_id in params.account_ids {
            if auth::require_account_permission(&*conn, auth, account_id, false).await.is_err() {
                continue;
            }
            let cursor = reconciliation::fetch_reconciliation_cursor(&*conn, account_id, CURSOR_ENTITY).await?;
            out.push(json!({
                "account_id": account_id,
                "status": if cursor.is_some() { "reconciled" } else { "never_run" },
            }));
        }
        Ok(json!({"accounts": out}))
    }

    // -- risk ops -------------------------------------------------------------
    //
    // The original permission model distinguishes `can_risk_manage` /
    // `can_block_new_positions` / `can_block_account` from plain trading
    // rights; this deployment's simplified `api_key_account_permissions`
    // schema has no columns for those, so every risk mutation here gates on
    // `can_trade` (or admin) instead (DESIGN.md).

    async fn op_risk_set_allow_new_positions(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            allow: bool,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let conn = self.conn().await?;
        auth::require_account_permission(&*conn, auth, account_id, true).await?;
        risk::set_account_allow_new_positions(&*conn, account_id, params.allow).await?;
        Ok(json!({"account_id": account_id, "allow_new_positions": params.allow}))
    }

    async fn op_risk_set_strategy_allow_new_positions(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            strategy_id: StrategyId,
            allow: bool,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let conn = self.conn().await?;
        auth::require_account_permission(&*conn, auth, account_id, true).await?;
        risk::set_strategy_allow_new_positions(&*conn, account_id, params.strategy_id, params.allow).await?;
        Ok(json!({"account_id": account_id, "strategy_id": params.strategy_id, "allow_new_positions": params.allow}))
    }

    async fn op_risk_set_account_status(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            status: AccountStatus,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        require_admin(auth)?;
        let conn = self.conn().await?;
        accounts::set_account_status(&*conn, account_id, params.status).await?;
        Ok(json!({"account_id": account_id, "status": params.status}))
    }

    // -- admin: accounts --------------------------------------------------

    async fn op_admin_create_account(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            exchange_id: String,
            position_mode: PositionMode,
            #[serde(default)]
            is_testnet: bool,
            #[serde(default)]
            extra_config: Value,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let account = admin::create_account(&*conn, &params.exchange_id, params.position_mode, params.is_testnet, params.extra_config)
            .await?;
        Ok(serde_json::to_value(account)?)
    }

    async fn op_admin_list_accounts(&self, auth: &AuthContext) -> DResult<Value> {
        require_admin(auth)?;
        let conn = self.conn().await?;
        Ok(serde_json::to_value(accounts::list_accounts(&*conn).await?)?)
    }

    async fn op_admin_update_account(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            account_id: AccountId,
            position_mode: Option<PositionMode>,
            is_testnet: Option<bool>,
            extra_config: Option<Value>,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        admin::update_account(&*conn, params.account_id, params.position_mode, params.is_testnet, params.extra_config).await?;
        Ok(json!({"account_id": params.account_id}))
    }

    // -- admin: users / api keys --------------------------------------------

    async fn op_admin_create_user_api_key(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            username: String,
            password: String,
            #[serde(default = "default_role")]
            role: String,
            #[serde(default)]
            is_admin: bool,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let mut conn = self.pool.get().await.map_err(oms_database::DbError::from)?;
        let tx = conn.transaction().await.map_err(oms_database::DbError::from)?;
        let password_hash = auth::new_password_hash(&params.password);
        let user = admin::create_user(&tx, &params.username, &password_hash, &params.role).await?;
        let raw_key = new_api_key();
        let key_hash = auth::hash_api_key(&raw_key);
        let api_key = admin::create_api_key(&tx, user.id, &key_hash, &params.role, params.is_admin).await?;
        tx.commit().await.map_err(oms_database::DbError::from)?;
        Ok(json!({"user_id": user.id, "api_key_id": api_key.id, "api_key": raw_key}))
    }

    async fn op_admin_list_users_api_keys(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            user_id: UserId,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let keys = admin::list_api_keys_for_user(&*conn, params.user_id).await?;
        Ok(json!({"api_keys": keys.into_iter().map(api_key_summary_json).collect::<Vec<_>>()}))
    }

    async fn op_admin_create_api_key(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            user_id: UserId,
            #[serde(default = "default_role")]
            role: String,
            #[serde(default)]
            is_admin: bool,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let raw_key = new_api_key();
        let key_hash = auth::hash_api_key(&raw_key);
        let api_key = admin::create_api_key(&*conn, params.user_id, &key_hash, &params.role, params.is_admin).await?;
        Ok(json!({"api_key_id": api_key.id, "api_key": raw_key}))
    }

    async fn op_admin_update_api_key(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            api_key_id: ApiKeyId,
            role: Option<String>,
            status: Option<String>,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        admin::update_api_key(&*conn, params.api_key_id, params.role.as_deref(), params.status.as_deref()).await?;
        Ok(json!({"api_key_id": params.api_key_id}))
    }

    async fn op_admin_list_api_key_permissions(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            api_key_id: ApiKeyId,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let perms = admin::list_api_key_account_permissions(&*conn, params.api_key_id).await?;
        let perms: Vec<Value> = perms
            .into_iter()
            .map(|(account_id, can_trade, can_read)| json!({"account_id": account_id, "can_trade": can_trade, "can_read": can_read}))
            .collect();
        Ok(json!({"permissions": perms}))
    }

    async fn op_admin_upsert_api_key_permission(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            api_key_id: ApiKeyId,
            account_id: AccountId,
            #[serde(default)]
            can_trade: bool,
            #[serde(default = "default_true")]
            can_read: bool,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        admin::upsert_api_key_account_permission(&*conn, params.api_key_id, params.account_id, params.can_trade, params.can_read)
            .await?;
        Ok(json!({"api_key_id": params.api_key_id, "account_id": params.account_id}))
    }

    // -- admin: strategies --------------------------------------------------

    async fn op_admin_create_strategy(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            name: String,
            client_strategy_id: Option<String>,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let strategy = admin::create_strategy(&*conn, &params.name, params.client_strategy_id.as_deref()).await?;
        Ok(serde_json::to_value(strategy)?)
    }

    async fn op_admin_list_strategies(&self, auth: &AuthContext) -> DResult<Value> {
        require_admin(auth)?;
        let conn = self.conn().await?;
        Ok(serde_json::to_value(admin::list_strategies(&*conn).await?)?)
    }

    async fn op_admin_update_strategy(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            strategy_id: StrategyId,
            name: Option<String>,
            status: Option<StrategyStatus>,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        admin::update_strategy(&*conn, params.strategy_id, params.name.as_deref(), params.status).await?;
        Ok(json!({"strategy_id": params.strategy_id}))
    }

    /// Reduced surface: no `admin_list_oms_orders_multi`-style store
    /// function exists, so this loops over `account_ids` and unions the
    /// single-account list calls behind a flat `limit` rather than true
    /// `page`/`page_size` pagination or `date_from`/`date_to` filters
    /// (DESIGN.md).
    async fn op_admin_oms_query(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            view: OmsQueryKind,
            account_ids: Vec<AccountId>,
            #[serde(default = "default_query_limit")]
            limit: i64,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let mut rows = Vec::new();
        for account_id in params.account_ids {
            rows.push(json!({
                "account_id": account_id,
                "rows": self.run_oms_query(&*conn, account_id, params.view, params.limit).await?,
            }));
        }
        Ok(json!({"view": params.view, "accounts": rows}))
    }

    /// Admin-only escape hatch that reassigns orders between strategies
    /// outside the caller-scoped `oms_reassign` path (no `can_trade`
    /// permission check on the target strategy), then force-syncs the UI
    /// with `snapshot_open_orders`/`snapshot_open_positions` (spec.md §9
    /// "several admin mutation endpoints emit per-row snapshot events...
    /// after commit to force UI re-sync", DESIGN.md Open Question 3).
    async fn op_admin_oms_mutate(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            account_id: AccountId,
            order_ids: Vec<OrderId>,
            strategy_id: StrategyId,
            #[serde(default)]
            position_id: Option<PositionId>,
        }
        require_admin(auth)?;
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;

        let mut conn = self.pool.get().await.map_err(|err| DispatchError::from(oms_database::DbError::from(err)))?;
        let tx = conn.transaction().await.map_err(oms_database::DbError::from)?;
        let moved =
            orders::reassign_orders_strategy(&tx, params.account_id, &params.order_ids, params.strategy_id, params.position_id)
                .await?;
        tx.commit().await.map_err(oms_database::DbError::from)?;

        // Snapshots are derived fresh from the store post-commit, not
        // assembled from the mutation's own return value (spec.md §9:
        // "rather than trying to derive events from mutations alone").
        let conn = self.conn().await?;
        let open_orders = orders::list_open_orders_for_account(&*conn, params.account_id).await?;
        events::insert_event(
            &*conn,
            params.account_id,
            EventNamespace::Position.as_str(),
            "snapshot_open_orders",
            &serde_json::to_value(&open_orders)?,
        )
        .await?;
        let open_positions = positions::list_open_positions_for_account(&*conn, params.account_id).await?;
        events::insert_event(
            &*conn,
            params.account_id,
            EventNamespace::Position.as_str(),
            "snapshot_open_positions",
            &serde_json::to_value(&open_positions)?,
        )
        .await?;

        Ok(json!({"account_id": params.account_id, "moved": moved}))
    }

    // -- auth / user self-service --------------------------------------------

    /// `auth_login_password` (spec.md §6): mints a 12-hour bearer token the
    /// same `authenticate` path accepts as an api key.
    async fn op_auth_login_password(&self, request: &Request) -> DResult<Value> {
        const AUTH_TOKEN_TTL_HOURS: i64 = 12;

        #[derive(Deserialize)]
        struct Params {
            user_name: String,
            password: String,
            api_key_id: Option<ApiKeyId>,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let user = admin::fetch_user_by_username(&*conn, &params.user_name)
            .await?
            .ok_or(DispatchError::InvalidApiKey)?;
        if !user.is_active() || !auth::verify_password(&params.password, &user.password_hash) {
            return Err(DispatchError::InvalidApiKey);
        }
        let active_keys = admin::list_active_api_key_ids_for_user(&*conn, user.id).await?;
        let api_key_id = match params.api_key_id {
            Some(requested) if active_keys.contains(&requested) => requested,
            Some(_) => return Err(DispatchError::InvalidApiKey),
            None => *active_keys.first().ok_or(DispatchError::InvalidApiKey)?,
        };
        let api_key = admin::fetch_api_key(&*conn, api_key_id).await?.ok_or(DispatchError::InvalidApiKey)?;

        let raw_token = auth::new_bearer_token();
        let token_hash = auth::hash_api_key(&raw_token);
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(AUTH_TOKEN_TTL_HOURS);
        admin::create_auth_token(&*conn, &token_hash, user.id, api_key_id, expires_at).await?;

        Ok(json!({
            "token": raw_token,
            "token_type": "bearer",
            "expires_at": expires_at,
            "user_id": user.id,
            "role": api_key.role,
            "api_key_id": api_key_id,
        }))
    }

    async fn op_user_profile_get(&self, auth: &AuthContext) -> DResult<Value> {
        let conn = self.conn().await?;
        let (user, _api_key) = self.caller_user(&*conn, auth).await?;
        Ok(json!({"user_id": user.id, "username": user.username, "role": user.role, "status": user.status}))
    }

    async fn op_user_profile_update(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            username: Option<String>,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let (user, _api_key) = self.caller_user(&*conn, auth).await?;
        if let Some(username) = params.username {
            admin::update_username(&*conn, user.id, &username).await?;
        }
        Ok(json!({"user_id": user.id}))
    }

    async fn op_user_password_update(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            old_password: String,
            new_password: String,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let (user, _api_key) = self.caller_user(&*conn, auth).await?;
        if !auth::verify_password(&params.old_password, &user.password_hash) {
            return Err(DispatchError::PermissionDenied);
        }
        let new_hash = auth::new_password_hash(&params.new_password);
        admin::update_user_password(&*conn, user.id, &new_hash).await?;
        Ok(json!({"user_id": user.id}))
    }

    async fn op_user_api_keys_list(&self, auth: &AuthContext) -> DResult<Value> {
        let conn = self.conn().await?;
        let (user, _api_key) = self.caller_user(&*conn, auth).await?;
        let keys = admin::list_api_keys_for_user(&*conn, user.id).await?;
        Ok(json!({"api_keys": keys.into_iter().map(api_key_summary_json).collect::<Vec<_>>()}))
    }

    async fn op_user_api_keys_create(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize, Default)]
        struct Params {
            role: Option<String>,
        }
        let params: Params = serde_json::from_value(request.params.clone()).unwrap_or_default();
        let conn = self.conn().await?;
        let (user, api_key) = self.caller_user(&*conn, auth).await?;
        let raw_key = new_api_key();
        let key_hash = auth::hash_api_key(&raw_key);
        let role = params.role.unwrap_or(api_key.role);
        let created = admin::create_api_key(&*conn, user.id, &key_hash, &role, false).await?;
        Ok(json!({"api_key_id": created.id, "api_key": raw_key}))
    }

    async fn op_user_api_keys_update(&self, auth: &AuthContext, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            api_key_id: ApiKeyId,
            status: Option<String>,
        }
        let params: Params = serde_json::from_value(request.params.clone()).map_err(|_| DispatchError::UnsupportedOp)?;
        let conn = self.conn().await?;
        let (user, _api_key) = self.caller_user(&*conn, auth).await?;
        let target = admin::fetch_api_key(&*conn, params.api_key_id).await?.ok_or(DispatchError::PermissionDenied)?;
        if target.user_id != user.id {
            return Err(DispatchError::PermissionDenied);
        }
        admin::update_api_key(&*conn, params.api_key_id, None, params.status.as_deref()).await?;
        Ok(json!({"api_key_id": params.api_key_id}))
    }

    async fn caller_user(
        &self,
        client: &impl tokio_postgres::GenericClient,
        auth: &AuthContext,
    ) -> DResult<(admin::UserRecord, admin::ApiKeySummary)> {
        let api_key = admin::fetch_api_key(client, ApiKeyId::from(auth.api_key_id))
            .await?
            .ok_or(DispatchError::InvalidApiKey)?;
        let user = admin::fetch_user(client, api_key.user_id).await?.ok_or(DispatchError::InvalidApiKey)?;
        Ok((user, api_key))
    }

    // -- websocket fan-out / status ------------------------------------------

    fn op_ws_tail_id(&self, request: &Request) -> DResult<Value> {
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        Ok(json!({"tail_id": self.event_ring.tail_id(account_id)}))
    }

    fn op_ws_pull_events(&self, request: &Request) -> DResult<Value> {
        #[derive(Deserialize)]
        struct Params {
            #[serde(default)]
            after_id: i64,
            #[serde(default = "default_ws_limit")]
            limit: usize,
        }
        let params: Params = serde_json::from_value(request.params.clone()).unwrap_or(Params {
            after_id: 0,
            limit: default_ws_limit(),
        });
        let account_id = request.account_id.ok_or(DispatchError::AccountNotFound)?;
        let mut events = self.event_ring.pull_after(account_id, EventId::from(params.after_id));
        events.truncate(params.limit);
        Ok(json!({"events": events}))
    }

    fn op_status(&self) -> DResult<Value> {
        let mut pools = json!({});
        for (name, pool) in &self.engines {
            let inflight: Vec<i64> = pool.inflight.iter().map(|v| v.load(Ordering::SeqCst)).collect();
            let active: Vec<usize> = pool.active_accounts.iter().map(|m| m.len()).collect();
            pools[name] = json!({"workers": pool.size(), "inflight": inflight, "active_accounts": active});
        }
        Ok(json!({"ok": true, "pools": pools}))
    }

    /// Tails `event_outbox` and mirrors new rows into the per-account ring
    /// (spec.md §4.7). Runs independently of whoever wrote the row — the
    /// queue worker's executor, the reconciler, or intake inside this
    /// process — so none of them need a handle back into the dispatcher.
    async fn outbox_fanout_loop(self: Arc<Self>, cancellation_token: CancellationToken) {
        const POLL_INTERVAL: Duration = Duration::from_millis(250);
        const BATCH_LIMIT: i64 = 500;
        loop {
            tokio::select! {
                _ = cancellation_token.when_cancelled() => return,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            let last_id = EventId::from(self.last_fanout_id.load(Ordering::SeqCst));
            let conn = match self.pool.get().await {
                Ok(conn) => conn,
                Err(err) => {
                    log::warn!("outbox fanout: failed to borrow connection: {err}");
                    continue;
                }
            };
            let rows = match events::fetch_events_after(&*conn, last_id, BATCH_LIMIT).await {
                Ok(rows) => rows,
                Err(err) => {
                    log::warn!("outbox fanout: failed to read event_outbox: {err}");
                    continue;
                }
            };
            for row in rows {
                self.event_ring.push(
                    row.account_id,
                    RingEvent {
                        id: row.id,
                        namespace: row.namespace,
                        event_type: row.event_type,
                        payload: row.payload,
                        created_at: row.created_at,
                    },
                );
                self.last_fanout_id.store(row.id.get(), Ordering::SeqCst);
            }
        }
    }

    async fn conn(&self) -> DResult<oms_database::PooledClient<'_>> {
        self.pool.get().await.map_err(|err| DispatchError::from(oms_database::DbError::from(err)))
    }
}

fn require_admin(auth: &AuthContext) -> DResult<()> {
    if auth.is_admin || matches!(auth.role, Role::Admin) {
        Ok(())
    } else {
        Err(DispatchError::AdminRequired)
    }
}

/// `_ccxt_requires_trade`: mutating ccxt method names need `can_trade`;
/// everything else (fetch/watch/load) only needs `can_read`.
fn ccxt_method_requires_trade(method: &str) -> bool {
    let lowered = method.to_ascii_lowercase();
    ["create", "cancel", "edit", "transfer", "withdraw", "deposit", "close"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn new_api_key() -> String {
    format!("key_{}", uuid::Uuid::new_v4().simple())
}

fn api_key_summary_json(key: admin::ApiKeySummary) -> Value {
    json!({"id": key.id, "user_id": key.user_id, "role": key.role, "is_admin": key.is_admin, "status": key.status})
}

#[derive(Deserialize)]
struct Batch<T> {
    items: Vec<T>,
    #[serde(default)]
    parallel: bool,
}

fn default_query_limit() -> i64 {
    100
}

fn default_reconcile_limit() -> u32 {
    200
}

fn default_ws_limit() -> usize {
    500
}

fn default_role() -> String {
    "trader".to_owned()
}

fn default_true() -> bool {
    true
}

async fn write_response(write_half: &mut tokio::net::tcp::OwnedWriteHalf, response: &Response) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    write_half.write_all(&line).await?;
    write_half.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccxt_trade_methods_require_trade_permission() {
        assert!(ccxt_method_requires_trade("createOrder"));
        assert!(ccxt_method_requires_trade("cancelOrder"));
        assert!(!ccxt_method_requires_trade("fetchTicker"));
        assert!(!ccxt_method_requires_trade("watchOrderBook"));
    }

    #[test]
    fn new_api_keys_are_unique_and_prefixed() {
        let a = new_api_key();
        let b = new_api_key();
        assert_ne!(a, b);
        assert!(a.starts_with("key_"));
    }

    #[test]
    fn engine_pool_resolves_size() {
        let (pool, receivers) = EnginePool::new("ccxt", 3);
        assert_eq!(pool.size(), 3);
        assert_eq!(receivers.len(), 3);
    }
}
