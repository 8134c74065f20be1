//! Caller authentication and per-account/per-strategy permission checks
//! (spec.md §4.4), grounded on `dispatcher_server.py`'s `_auth_from_payload`,
//! `_require_account_permission`, `_require_strategy_permission` and
//! `_default_reason_for_role`.

use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio_postgres::GenericClient;

use oms_database::auth::ApiKeyRecord;
use oms_domain::{Account, AccountId, StrategyId};

use crate::error::IntakeError;

/// The resolved identity behind an `x_api_key` (spec.md §4.4). Roles mirror
/// `dispatcher_server.py::_normalize_role`: unrecognized roles fall back to
/// `trader`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: i64,
    pub role: Role,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    Admin,
    Trader,
    PortfolioManager,
    Robot,
    Risk,
    Readonly,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "trader" => Role::Trader,
            "portfolio_manager" => Role::PortfolioManager,
            "robot" => Role::Robot,
            "risk" => Role::Risk,
            "readonly" => Role::Readonly,
            _ => Role::Trader,
        }
    }

    /// Default `reason` stamped on `send_order`/`close_position` payloads
    /// that omit one (spec.md §9 Open Question 1, resolved in DESIGN.md:
    /// role-derived, server-side).
    pub fn default_reason(self) -> &'static str {
        match self {
            Role::Trader | Role::PortfolioManager | Role::Robot | Role::Risk => self.as_str(),
            Role::Readonly | Role::Admin => "readonly",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Trader => "trader",
            Role::PortfolioManager => "portfolio_manager",
            Role::Robot => "robot",
            Role::Risk => "risk",
            Role::Readonly => "readonly",
        }
    }
}

/// `sha256(raw_key)` hex digest — the value stored in `api_keys.key_hash`
/// (spec.md §4.4). The raw key itself never touches the database.
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolves `x_api_key` to an `AuthContext`, or `missing_api_key`/
/// `invalid_api_key` per spec.md §6. Falls back to the `auth_tokens` join
/// (`app/auth.py::validate_api_key`) when the hash doesn't match a raw
/// `api_keys.key_hash` directly, so a token minted by `auth_login_password`
/// authenticates the same way an api key does.
pub async fn authenticate(client: &impl GenericClient, raw_api_key: &str) -> Result<AuthContext, IntakeError> {
    let trimmed = raw_api_key.trim();
    if trimmed.is_empty() {
        return Err(IntakeError::MissingApiKey);
    }
    let hash = hash_api_key(trimmed);
    let record: Option<ApiKeyRecord> = oms_database::auth::fetch_api_key_by_hash(client, &hash).await?;
    if let Some(record) = record {
        return if record.is_active() {
            Ok(AuthContext {
                api_key_id: record.id,
                role: Role::parse(&record.role),
                is_admin: record.is_admin,
            })
        } else {
            Err(IntakeError::InvalidApiKey)
        };
    }
    let token_context = oms_database::admin::fetch_auth_token_context(client, &hash).await?;
    match token_context {
        Some(context) if context.status == "active" => Ok(AuthContext {
            api_key_id: context.api_key_id.get(),
            role: Role::parse(&context.role),
            is_admin: context.is_admin,
        }),
        _ => Err(IntakeError::InvalidApiKey),
    }
}

/// `_hash_password` (salted sha256, `sha256$<salt>$<digest>`).
fn hash_password_with_salt(password: &str, salt_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    format!("sha256${salt_hex}${}", hex::encode(hasher.finalize()))
}

/// Hashes a freshly chosen password with a random salt (spec.md §6
/// `admin_create_user_api_key`, `user_password_update`).
pub fn new_password_hash(password: &str) -> String {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    hash_password_with_salt(password, &hex::encode(salt_bytes))
}

/// Constant-shape comparison against a `sha256$salt$digest` stored hash
/// (`_verify_password`). Malformed stored hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let mut parts = stored_hash.splitn(3, '$');
    let (scheme, salt, digest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(salt), Some(digest)) => (scheme, salt, digest),
        _ => return false,
    };
    if scheme != "sha256" {
        return false;
    }
    let expected = hash_password_with_salt(password, salt);
    let expected_digest = expected.rsplit('$').next().unwrap_or_default();
    constant_time_eq(expected_digest.as_bytes(), digest.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Mints an opaque bearer token for `auth_login_password` (spec.md §6):
/// a random `tok_<urlsafe>` string returned to the caller, stored only as
/// its sha256 hash (the same tag `authenticate` hashes `x_api_key` with).
pub fn new_bearer_token() -> String {
    format!("tok_{}", uuid::Uuid::new_v4().simple())
}

/// `_require_account_permission` (spec.md §4.3 step 1, §4.4): the account
/// must exist, be active, and the key must carry `can_read` (and
/// `can_trade` when `require_trade`).
pub async fn require_account_permission(
    client: &impl GenericClient,
    auth: &AuthContext,
    account_id: AccountId,
    require_trade: bool,
) -> Result<Account, IntakeError> {
    let account = oms_database::accounts::fetch_active_account(client, account_id)
        .await?
        .ok_or(IntakeError::AccountNotFound)?;
    let perms = oms_database::auth::fetch_api_key_account_permissions(client, auth.api_key_id, account_id).await?;
    let (can_trade, can_read) = perms.unwrap_or((false, false));
    if !can_read {
        return Err(IntakeError::PermissionDenied);
    }
    if require_trade && !can_trade {
        return Err(IntakeError::PermissionDenied);
    }
    Ok(account)
}

/// `_require_strategy_permission`: this deployment's simplified permission
/// model has no per-key `restrict_to_strategies` flag, so a strategy-level
/// grant is only consulted for trading ops (spec.md §4.3 step 1, §9
/// "Strategy-scoped API keys").
pub async fn require_strategy_permission(
    client: &impl GenericClient,
    auth: &AuthContext,
    strategy_id: StrategyId,
) -> Result<(), IntakeError> {
    if auth.is_admin {
        return Ok(());
    }
    let allowed = oms_database::auth::api_key_strategy_allowed(client, auth.api_key_id, strategy_id).await?;
    if !allowed {
        return Err(IntakeError::StrategyPermissionDenied);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_falls_back_to_trader() {
        assert_eq!(Role::parse("weird"), Role::Trader);
    }

    #[test]
    fn admin_and_readonly_default_reason_is_readonly() {
        assert_eq!(Role::Admin.default_reason(), "readonly");
        assert_eq!(Role::Readonly.default_reason(), "readonly");
    }

    #[test]
    fn trading_roles_default_reason_matches_role_name() {
        assert_eq!(Role::Trader.default_reason(), "trader");
        assert_eq!(Role::Robot.default_reason(), "robot");
    }

    #[test]
    fn hash_is_deterministic_and_not_the_raw_key() {
        let hash = hash_api_key("secret-key");
        assert_ne!(hash, "secret-key");
        assert_eq!(hash, hash_api_key("secret-key"));
    }

    #[test]
    fn password_round_trips_through_new_hash_and_verify() {
        let hash = new_password_hash("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn two_password_hashes_use_different_salts() {
        assert_ne!(new_password_hash("same-password"), new_password_hash("same-password"));
    }

    #[test]
    fn verify_password_rejects_malformed_stored_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
    }

    #[test]
    fn bearer_tokens_are_unique() {
        assert_ne!(new_bearer_token(), new_bearer_token());
    }
}
