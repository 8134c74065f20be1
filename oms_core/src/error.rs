use oms_rpc::ErrorCode;

/// Errors raised while validating and enqueuing a `CommandInput` (spec.md
/// §4.3).
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("missing_api_key")]
    MissingApiKey,
    #[error("invalid_api_key")]
    InvalidApiKey,
    #[error("permission_denied")]
    PermissionDenied,
    #[error("strategy_permission_denied")]
    StrategyPermissionDenied,
    #[error("admin_read_only")]
    AdminReadOnly,
    #[error("account_not_found")]
    AccountNotFound,
    #[error("position_not_found")]
    PositionNotFound,
    #[error("close_lock_held")]
    CloseLockHeld,
    #[error("validation_error: {0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] oms_database::DbError),
}

impl IntakeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IntakeError::MissingApiKey => ErrorCode::MissingApiKey,
            IntakeError::InvalidApiKey => ErrorCode::InvalidApiKey,
            IntakeError::PermissionDenied => ErrorCode::PermissionDenied,
            IntakeError::StrategyPermissionDenied => ErrorCode::StrategyPermissionDenied,
            IntakeError::AdminReadOnly => ErrorCode::AdminReadOnly,
            IntakeError::AccountNotFound => ErrorCode::AccountNotFound,
            IntakeError::PositionNotFound => ErrorCode::PositionNotFound,
            IntakeError::CloseLockHeld => ErrorCode::CloseLockHeld,
            IntakeError::Validation(_) => ErrorCode::ValidationError,
            IntakeError::Database(_) => ErrorCode::InternalError,
        }
    }
}

/// Errors raised by the exchange adapter (spec.md §4.2).
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unsupported_engine")]
    UnsupportedEngine,
    #[error("engine_unavailable: {0}")]
    EngineUnavailable(String),
    #[error("unsupported ccxt method: {0}")]
    UnsupportedMethod(String),
    #[error("exchange does not support required capability: {0:?}")]
    CapabilityMissing(Vec<String>),
    #[error("exchange call failed: {0}")]
    ExchangeCall(#[source] anyhow::Error),
}

/// Errors the command executor raises (spec.md §4.5 error model).
/// `Permanent` marks a command failed, not retried; everything else bubbles
/// up so the queue worker schedules a retry with backoff.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Permanent(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Database(#[from] oms_database::DbError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutorError {
    pub fn permanent(message: impl Into<String>) -> Self {
        ExecutorError::Permanent(message.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, ExecutorError::Permanent(_))
    }
}

/// Errors the dispatcher's RPC layer surfaces (spec.md §6, §7).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("missing_api_key")]
    MissingApiKey,
    #[error("invalid_api_key")]
    InvalidApiKey,
    #[error("permission_denied")]
    PermissionDenied,
    #[error("admin_required")]
    AdminRequired,
    #[error("account_not_found")]
    AccountNotFound,
    #[error("order_not_found")]
    OrderNotFound,
    #[error("unsupported_op")]
    UnsupportedOp,
    #[error("unsupported_query")]
    UnsupportedQuery,
    #[error("dispatcher_timeout")]
    Timeout,
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Database(#[from] oms_database::DbError),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::MissingApiKey => ErrorCode::MissingApiKey,
            DispatchError::InvalidApiKey => ErrorCode::InvalidApiKey,
            DispatchError::PermissionDenied => ErrorCode::PermissionDenied,
            DispatchError::AdminRequired => ErrorCode::AdminRequired,
            DispatchError::AccountNotFound => ErrorCode::AccountNotFound,
            DispatchError::OrderNotFound => ErrorCode::OrderNotFound,
            DispatchError::UnsupportedOp => ErrorCode::UnsupportedOp,
            DispatchError::UnsupportedQuery => ErrorCode::UnsupportedQuery,
            DispatchError::Timeout => ErrorCode::DispatcherTimeout,
            DispatchError::Intake(err) => err.code(),
            DispatchError::Adapter(AdapterError::UnsupportedEngine) => ErrorCode::UnsupportedEngine,
            DispatchError::Adapter(AdapterError::EngineUnavailable(_)) => ErrorCode::EngineUnavailable,
            DispatchError::Adapter(_) => ErrorCode::InternalError,
            DispatchError::Database(_) => ErrorCode::InternalError,
        }
    }
}

impl From<DispatchError> for oms_rpc::RpcError {
    fn from(err: DispatchError) -> Self {
        oms_rpc::RpcError::with_message(err.code(), err.to_string())
    }
}
