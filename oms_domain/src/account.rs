use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AccountId, ExchangeId, PositionMode};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Blocked,
}

/// An exchange sub-account under OMS control (spec.md §3 `Account`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub exchange_id: String,
    pub position_mode: PositionMode,
    pub status: AccountStatus,
    pub is_testnet: bool,
    pub dispatcher_worker_hint: Option<i32>,
    pub extra_config: Value,
}

impl Account {
    pub fn is_active(&self) -> bool {
        matches!(self.status, AccountStatus::Active)
    }

    /// Canonical `ccxt.<name>` / `ccxtpro.<name>` exchange id, rewriting bare
    /// legacy ids the way `Account.exchange_id` is stored (spec.md §3).
    pub fn parsed_exchange_id(&self) -> Result<ExchangeId, crate::UnsupportedEngine> {
        ExchangeId::parse(&self.exchange_id)
    }
}

/// Ciphertext or (exceptionally) plaintext exchange credentials for an
/// account. Encrypted values carry the `enc:v1:` tag (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub account_id: AccountId,
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account(status: AccountStatus) -> Account {
        Account {
            id: AccountId::from(1),
            exchange_id: "ccxt.binance".to_owned(),
            position_mode: PositionMode::Hedge,
            status,
            is_testnet: true,
            dispatcher_worker_hint: None,
            extra_config: serde_json::json!({}),
        }
    }

    #[test]
    fn active_account_is_active() {
        assert!(test_account(AccountStatus::Active).is_active());
    }

    #[test]
    fn blocked_account_is_not_active() {
        assert!(!test_account(AccountStatus::Blocked).is_active());
    }

    #[test]
    fn bare_exchange_id_defaults_to_ccxt_engine() {
        let mut account = test_account(AccountStatus::Active);
        account.exchange_id = "binance".to_owned();
        let parsed = account.parsed_exchange_id().unwrap();
        assert_eq!(parsed.canonical(), "ccxt.binance");
    }
}
