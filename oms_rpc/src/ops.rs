use serde::{Deserialize, Serialize};

/// Every operation the dispatcher RPC surface accepts (spec.md §4.4, §6).
/// Handled directly by a worker (not through the command queue) unless
/// noted otherwise.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    AuthCheck,
    AuthorizeAccount,
    AccountsList,
    MetaCcxtExchanges,
    CcxtCall,
    CcxtBatch,
    /// Validated and enqueued onto `command_queue`; executed later by a
    /// queue worker (spec.md §4.3, §4.8) rather than inline in the worker.
    OmsCommandsBatch,
    OmsQuery,
    CcxtRawQuery,
    CcxtRawQueryMulti,
    OmsReassign,
    ReconcileNow,
    ReconcileStatusAccount,
    ReconcileStatusList,
    RiskSetAllowNewPositions,
    RiskSetStrategyAllowNewPositions,
    RiskSetAccountStatus,
    AdminCreateAccount,
    AdminListAccounts,
    AdminUpdateAccount,
    AdminCreateUserApiKey,
    AdminListUsersApiKeys,
    AdminCreateApiKey,
    AdminUpdateApiKey,
    AdminListApiKeyPermissions,
    AdminUpsertApiKeyPermission,
    AdminCreateStrategy,
    AdminListStrategies,
    AdminUpdateStrategy,
    AdminOmsQuery,
    AdminOmsMutate,
    AuthLoginPassword,
    UserProfileGet,
    UserProfileUpdate,
    UserPasswordUpdate,
    UserApiKeysList,
    UserApiKeysCreate,
    UserApiKeysUpdate,
    WsTailId,
    WsPullEvents,
    Status,
}

impl Op {
    /// Account-less ops run on worker 0 of the default engine (spec.md §4.4).
    pub fn is_account_scoped(self) -> bool {
        !matches!(
            self,
            Op::Status | Op::MetaCcxtExchanges | Op::AccountsList | Op::AuthLoginPassword
        )
    }
}

/// `oms_query`/`admin_oms_query` sub-selectors (spec.md §4.1, §6).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmsQueryKind {
    OrdersOpen,
    OrdersHistory,
    Deals,
    PositionsOpen,
    PositionsHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Op::OmsCommandsBatch).unwrap(), "\"oms_commands_batch\"");
    }

    #[test]
    fn status_is_not_account_scoped() {
        assert!(!Op::Status.is_account_scoped());
        assert!(Op::CcxtCall.is_account_scoped());
    }
}
