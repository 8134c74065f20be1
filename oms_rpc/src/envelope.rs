use serde::{Deserialize, Serialize};
use serde_json::Value;

use oms_domain::{AccountId, CommandId, OrderId};

use crate::error::RpcError;
use crate::ops::Op;

/// One line-delimited JSON request (spec.md §4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub op: Op,
    pub x_api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Op-specific body. Every handler deserializes the sub-shape it
    /// expects out of this value rather than the envelope growing one
    /// optional field per op (spec.md §6 "`... op-specific`").
    #[serde(default, flatten)]
    pub params: Value,
}

/// `{ok:true, result}` | `{ok:false, error}` (spec.md §4.4, §6). `ok` is a
/// real JSON boolean, so this is hand-shaped rather than an internally
/// tagged enum (serde's internal tagging would serialize `ok` as a string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Response {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: RpcError) -> Self {
        Response {
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

/// One item of an `oms_commands_batch` request (spec.md §6 `CommandInput`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInput {
    pub account_id: AccountId,
    #[serde(flatten)]
    pub payload: oms_domain::CommandPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Per-item batch result; a batch never fails wholesale on one bad item
/// (spec.md §4.3 step 5, §7 "a batch endpoint never fails the whole batch").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub index: usize,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl CommandResult {
    pub fn success(index: usize, command_id: CommandId, order_id: Option<OrderId>) -> Self {
        Self {
            index,
            ok: true,
            command_id: Some(command_id),
            order_id,
            error: None,
        }
    }

    pub fn failure(index: usize, error: RpcError) -> Self {
        Self {
            index,
            ok: false,
            command_id: None,
            order_id: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn response_ok_round_trips() {
        let resp = Response::ok(serde_json::json!({"a": 1}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], true);
    }

    #[test]
    fn command_result_failure_carries_error() {
        let result = CommandResult::failure(0, crate::error::RpcError::new(ErrorCode::ValidationError));
        assert!(!result.ok);
        assert!(result.command_id.is_none());
    }
}
