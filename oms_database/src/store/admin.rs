//! Store contracts behind the dispatcher's admin/user-management ops
//! (spec.md §6 `admin_*`, `user_*`, `auth_login_password`), grounded in
//! `examples/original_source/apps/api/dispatcher_server.py`'s `_handle_admin_*`
//! helpers and `app/auth.py`'s token-lookup join. These tables sit alongside
//! the trading tables (spec.md §3 "carried as full store contracts... these
//! are dispatcher operations, not the external RBAC application").

use serde_json::Value;
use tokio_postgres::GenericClient;

use oms_domain::{Account, AccountId, ApiKeyId, PositionMode, Strategy, StrategyId, StrategyStatus, UserId};

use super::strategy_status_from_sql;
use crate::error::{DbError, Result};
use crate::store::accounts::map_account;

pub async fn create_account(
    client: &impl GenericClient,
    exchange_id: &str,
    position_mode: PositionMode,
    is_testnet: bool,
    extra_config: Value,
) -> Result<Account> {
    let position_mode_str = match position_mode {
        PositionMode::Hedge => "hedge",
        PositionMode::Netting => "netting",
        PositionMode::StrategyNetting => "strategy_netting",
    };
    let row = client
        .query_one(
            "INSERT INTO accounts (exchange_id, position_mode, is_testnet, extra_config) VALUES ($1,$2,$3,$4) \
             RETURNING id, exchange_id, position_mode, status, is_testnet, dispatcher_worker_hint, extra_config",
            &[&exchange_id, &position_mode_str, &is_testnet, &extra_config],
        )
        .await?;
    map_account(&row)
}

pub async fn update_account(
    client: &impl GenericClient,
    account_id: AccountId,
    position_mode: Option<PositionMode>,
    is_testnet: Option<bool>,
    extra_config: Option<Value>,
) -> Result<()> {
    if let Some(mode) = position_mode {
        let mode_str = match mode {
            PositionMode::Hedge => "hedge",
            PositionMode::Netting => "netting",
            PositionMode::StrategyNetting => "strategy_netting",
        };
        client
            .execute("UPDATE accounts SET position_mode = $1 WHERE id = $2", &[&mode_str, &account_id.get()])
            .await?;
    }
    if let Some(is_testnet) = is_testnet {
        client
            .execute("UPDATE accounts SET is_testnet = $1 WHERE id = $2", &[&is_testnet, &account_id.get()])
            .await?;
    }
    if let Some(extra_config) = extra_config {
        client
            .execute("UPDATE accounts SET extra_config = $1 WHERE id = $2", &[&extra_config, &account_id.get()])
            .await?;
    }
    Ok(())
}

fn map_strategy(row: &tokio_postgres::Row) -> Result<Strategy> {
    let status: String = row.get("status");
    Ok(Strategy {
        id: StrategyId::from(row.get::<_, i64>("id")),
        name: row.get("name"),
        client_strategy_id: row.get("client_strategy_id"),
        status: strategy_status_from_sql(&status).ok_or(DbError::Decode {
            field: "status",
            reason: status.clone(),
        })?,
    })
}

pub async fn create_strategy(client: &impl GenericClient, name: &str, client_strategy_id: Option<&str>) -> Result<Strategy> {
    let row = client
        .query_one(
            "INSERT INTO strategies (name, client_strategy_id) VALUES ($1,$2) RETURNING id, name, client_strategy_id, status",
            &[&name, &client_strategy_id],
        )
        .await?;
    map_strategy(&row)
}

pub async fn list_strategies(client: &impl GenericClient) -> Result<Vec<Strategy>> {
    let rows = client
        .query("SELECT id, name, client_strategy_id, status FROM strategies ORDER BY id", &[])
        .await?;
    rows.iter().map(map_strategy).collect()
}

pub async fn update_strategy(
    client: &impl GenericClient,
    strategy_id: StrategyId,
    name: Option<&str>,
    status: Option<StrategyStatus>,
) -> Result<()> {
    if let Some(name) = name {
        client
            .execute("UPDATE strategies SET name = $1 WHERE id = $2", &[&name, &strategy_id.get()])
            .await?;
    }
    if let Some(status) = status {
        let status_str = match status {
            StrategyStatus::Active => "active",
            StrategyStatus::Disabled => "disabled",
        };
        client
            .execute("UPDATE strategies SET status = $1 WHERE id = $2", &[&status_str, &strategy_id.get()])
            .await?;
    }
    Ok(())
}

/// `users` row as the dispatcher's auth/profile ops need it (spec.md §6
/// `user_profile_get`, `auth_login_password`).
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub status: String,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

const USER_COLUMNS: &str = "id, username, password_hash, role, status";

fn map_user(row: &tokio_postgres::Row) -> UserRecord {
    UserRecord {
        id: UserId::from(row.get::<_, i64>("id")),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        status: row.get("status"),
    }
}

pub async fn create_user(client: &impl GenericClient, username: &str, password_hash: &str, role: &str) -> Result<UserRecord> {
    let row = client
        .query_one(
            &format!("INSERT INTO users (username, password_hash, role) VALUES ($1,$2,$3) RETURNING {USER_COLUMNS}"),
            &[&username, &password_hash, &role],
        )
        .await?;
    Ok(map_user(&row))
}

pub async fn fetch_user_by_username(client: &impl GenericClient, username: &str) -> Result<Option<UserRecord>> {
    let row = client
        .query_opt(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"), &[&username])
        .await?;
    Ok(row.as_ref().map(map_user))
}

pub async fn fetch_user(client: &impl GenericClient, user_id: UserId) -> Result<Option<UserRecord>> {
    let row = client
        .query_opt(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"), &[&user_id.get()])
        .await?;
    Ok(row.as_ref().map(map_user))
}

pub async fn update_user_password(client: &impl GenericClient, user_id: UserId, password_hash: &str) -> Result<()> {
    client
        .execute(
            "UPDATE users SET password_hash = $1 WHERE id = $2",
            &[&password_hash, &user_id.get()],
        )
        .await?;
    Ok(())
}

pub async fn update_username(client: &impl GenericClient, user_id: UserId, username: &str) -> Result<()> {
    client
        .execute("UPDATE users SET username = $1 WHERE id = $2", &[&username, &user_id.get()])
        .await?;
    Ok(())
}

/// One `api_keys` row, without the raw key (spec.md §6 `user_api_keys_list`,
/// `admin_list_users_api_keys`).
#[derive(Debug, Clone)]
pub struct ApiKeySummary {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub role: String,
    pub is_admin: bool,
    pub status: String,
}

fn map_api_key(row: &tokio_postgres::Row) -> ApiKeySummary {
    ApiKeySummary {
        id: ApiKeyId::from(row.get::<_, i64>("id")),
        user_id: UserId::from(row.get::<_, i64>("user_id")),
        role: row.get("role"),
        is_admin: row.get("is_admin"),
        status: row.get("status"),
    }
}

pub async fn create_api_key(
    client: &impl GenericClient,
    user_id: UserId,
    key_hash: &str,
    role: &str,
    is_admin: bool,
) -> Result<ApiKeySummary> {
    let row = client
        .query_one(
            "INSERT INTO api_keys (user_id, key_hash, role, is_admin) VALUES ($1,$2,$3,$4) \
             RETURNING id, user_id, role, is_admin, status",
            &[&user_id.get(), &key_hash, &role, &is_admin],
        )
        .await?;
    Ok(map_api_key(&row))
}

pub async fn fetch_api_key(client: &impl GenericClient, api_key_id: ApiKeyId) -> Result<Option<ApiKeySummary>> {
    let row = client
        .query_opt(
            "SELECT id, user_id, role, is_admin, status FROM api_keys WHERE id = $1",
            &[&api_key_id.get()],
        )
        .await?;
    Ok(row.as_ref().map(map_api_key))
}

pub async fn list_api_keys_for_user(client: &impl GenericClient, user_id: UserId) -> Result<Vec<ApiKeySummary>> {
    let rows = client
        .query(
            "SELECT id, user_id, role, is_admin, status FROM api_keys WHERE user_id = $1 ORDER BY id",
            &[&user_id.get()],
        )
        .await?;
    Ok(rows.iter().map(map_api_key).collect())
}

pub async fn list_active_api_key_ids_for_user(client: &impl GenericClient, user_id: UserId) -> Result<Vec<ApiKeyId>> {
    let rows = client
        .query(
            "SELECT id FROM api_keys WHERE user_id = $1 AND status = 'active' ORDER BY id",
            &[&user_id.get()],
        )
        .await?;
    Ok(rows.iter().map(|row| ApiKeyId::from(row.get::<_, i64>("id"))).collect())
}

pub async fn list_all_api_keys(client: &impl GenericClient) -> Result<Vec<ApiKeySummary>> {
    let rows = client
        .query("SELECT id, user_id, role, is_admin, status FROM api_keys ORDER BY id", &[])
        .await?;
    Ok(rows.iter().map(map_api_key).collect())
}

pub async fn update_api_key(
    client: &impl GenericClient,
    api_key_id: ApiKeyId,
    role: Option<&str>,
    status: Option<&str>,
) -> Result<()> {
    if let Some(role) = role {
        client
            .execute("UPDATE api_keys SET role = $1 WHERE id = $2", &[&role, &api_key_id.get()])
            .await?;
    }
    if let Some(status) = status {
        client
            .execute("UPDATE api_keys SET status = $1 WHERE id = $2", &[&status, &api_key_id.get()])
            .await?;
    }
    Ok(())
}

pub async fn list_api_key_account_permissions(
    client: &impl GenericClient,
    api_key_id: ApiKeyId,
) -> Result<Vec<(AccountId, bool, bool)>> {
    let rows = client
        .query(
            "SELECT account_id, can_trade, can_read FROM api_key_account_permissions WHERE api_key_id = $1 ORDER BY account_id",
            &[&api_key_id.get()],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| (AccountId::from(row.get::<_, i64>("account_id")), row.get("can_trade"), row.get("can_read")))
        .collect())
}

pub async fn upsert_api_key_account_permission(
    client: &impl GenericClient,
    api_key_id: ApiKeyId,
    account_id: AccountId,
    can_trade: bool,
    can_read: bool,
) -> Result<()> {
    client
        .execute(
            "INSERT INTO api_key_account_permissions (api_key_id, account_id, can_trade, can_read) VALUES ($1,$2,$3,$4) \
             ON CONFLICT (api_key_id, account_id) DO UPDATE SET can_trade = EXCLUDED.can_trade, can_read = EXCLUDED.can_read",
            &[&api_key_id.get(), &account_id.get(), &can_trade, &can_read],
        )
        .await?;
    Ok(())
}

/// Resolved identity behind a bearer token minted by `auth_login_password`
/// (spec.md §6), joining `auth_tokens` back to the api key it authenticates
/// as — mirrors `app/auth.py::validate_api_key`'s token-lookup branch.
pub struct AuthTokenContext {
    pub api_key_id: ApiKeyId,
    pub role: String,
    pub is_admin: bool,
    pub status: String,
}

pub async fn create_auth_token(
    client: &impl GenericClient,
    token_hash: &str,
    user_id: UserId,
    api_key_id: ApiKeyId,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    client
        .execute(
            "INSERT INTO auth_tokens (token, user_id, api_key_id, expires_at) VALUES ($1,$2,$3,$4)",
            &[&token_hash, &user_id.get(), &api_key_id.get(), &expires_at],
        )
        .await?;
    Ok(())
}

pub async fn fetch_auth_token_context(client: &impl GenericClient, token_hash: &str) -> Result<Option<AuthTokenContext>> {
    let row = client
        .query_opt(
            "SELECT k.id, k.role, k.is_admin, k.status FROM auth_tokens t \
             JOIN api_keys k ON k.id = t.api_key_id \
             WHERE t.token = $1 AND t.expires_at > now()",
            &[&token_hash],
        )
        .await?;
    Ok(row.map(|row| AuthTokenContext {
        api_key_id: ApiKeyId::from(row.get::<_, i64>("id")),
        role: row.get("role"),
        is_admin: row.get("is_admin"),
        status: row.get("status"),
    }))
}

