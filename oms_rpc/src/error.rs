use serde::{Deserialize, Serialize};

/// Error codes the dispatcher RPC surface returns (spec.md §6). Every code
/// the spec enumerates is represented explicitly rather than as a free
/// string, so a `From<DispatchError>` impl in `oms_core` can't typo one.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingApiKey,
    InvalidApiKey,
    PermissionDenied,
    StrategyPermissionDenied,
    AdminRequired,
    AdminReadOnly,
    UnsupportedEngine,
    EngineUnavailable,
    UnsupportedOp,
    UnsupportedQuery,
    ValidationError,
    AccountNotFound,
    OrderNotFound,
    PositionNotFound,
    CloseLockHeld,
    DispatcherTimeout,
    DispatcherUnavailable,
    DispatcherEmptyResponse,
    DispatcherInvalidJson,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingApiKey => "missing_api_key",
            ErrorCode::InvalidApiKey => "invalid_api_key",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::StrategyPermissionDenied => "strategy_permission_denied",
            ErrorCode::AdminRequired => "admin_required",
            ErrorCode::AdminReadOnly => "admin_read_only",
            ErrorCode::UnsupportedEngine => "unsupported_engine",
            ErrorCode::EngineUnavailable => "engine_unavailable",
            ErrorCode::UnsupportedOp => "unsupported_op",
            ErrorCode::UnsupportedQuery => "unsupported_query",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::AccountNotFound => "account_not_found",
            ErrorCode::OrderNotFound => "order_not_found",
            ErrorCode::PositionNotFound => "position_not_found",
            ErrorCode::CloseLockHeld => "close_lock_held",
            ErrorCode::DispatcherTimeout => "dispatcher_timeout",
            ErrorCode::DispatcherUnavailable => "dispatcher_unavailable",
            ErrorCode::DispatcherEmptyResponse => "dispatcher_empty_response",
            ErrorCode::DispatcherInvalidJson => "dispatcher_invalid_json",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

/// `{code, message?}` as carried inside `{ok:false, error:...}` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RpcError {
    pub fn new(code: ErrorCode) -> Self {
        Self { code, message: None }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.code.as_str()),
            None => f.write_str(self.code.as_str()),
        }
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::CloseLockHeld).unwrap();
        assert_eq!(json, "\"close_lock_held\"");
    }

    #[test]
    fn display_includes_message_when_present() {
        let err = RpcError::with_message(ErrorCode::ValidationError, "qty missing");
        assert_eq!(err.to_string(), "validation_error: qty missing");
    }
}
