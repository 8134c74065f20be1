use tokio_postgres::{GenericClient, Row};

use oms_domain::{Account, AccountCredentials, AccountId, AccountStatus};

use super::{account_status_from_sql, position_mode_from_sql};
use crate::error::{DbError, Result};

const ACCOUNT_COLUMNS: &str = "id, exchange_id, position_mode, status, is_testnet, dispatcher_worker_hint, extra_config";

pub(crate) fn map_account(row: &Row) -> Result<Account> {
    let status: String = row.get("status");
    let position_mode: String = row.get("position_mode");
    Ok(Account {
        id: AccountId::from(row.get::<_, i64>("id")),
        exchange_id: row.get("exchange_id"),
        position_mode: position_mode_from_sql(&position_mode).ok_or(DbError::Decode {
            field: "position_mode",
            reason: position_mode.clone(),
        })?,
        status: account_status_from_sql(&status).ok_or(DbError::Decode {
            field: "status",
            reason: status.clone(),
        })?,
        is_testnet: row.get("is_testnet"),
        dispatcher_worker_hint: row.get("dispatcher_worker_hint"),
        extra_config: row.get("extra_config"),
    })
}

pub async fn fetch_account(client: &impl GenericClient, account_id: AccountId) -> Result<Option<Account>> {
    let row = client
        .query_opt(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"),
            &[&account_id.get()],
        )
        .await?;
    row.as_ref().map(map_account).transpose()
}

/// Intake resolves `(account_id, pool_id)` for an *active* account only
/// (spec.md §4.3 step 1); `pool_id` is the exchange engine family
/// (`ccxt`/`ccxtpro`) the account's `exchange_id` carries.
pub async fn fetch_active_account(client: &impl GenericClient, account_id: AccountId) -> Result<Option<Account>> {
    Ok(fetch_account(client, account_id)
        .await?
        .filter(|account| matches!(account.status, AccountStatus::Active)))
}

pub async fn list_accounts(client: &impl GenericClient) -> Result<Vec<Account>> {
    let rows = client
        .query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"), &[])
        .await?;
    rows.iter().map(map_account).collect()
}

pub async fn fetch_account_credentials(
    client: &impl GenericClient,
    account_id: AccountId,
) -> Result<Option<AccountCredentials>> {
    let row = client
        .query_opt(
            "SELECT account_id, api_key_enc, secret_enc, passphrase_enc FROM account_credentials WHERE account_id = $1",
            &[&account_id.get()],
        )
        .await?;
    Ok(row.map(|row| AccountCredentials {
        account_id,
        api_key: row.get("api_key_enc"),
        secret: row.get("secret_enc"),
        passphrase: row.get("passphrase_enc"),
    }))
}

pub async fn set_account_status(client: &impl GenericClient, account_id: AccountId, status: AccountStatus) -> Result<()> {
    let status_str = match status {
        AccountStatus::Active => "active",
        AccountStatus::Blocked => "blocked",
    };
    client
        .execute("UPDATE accounts SET status = $1 WHERE id = $2", &[&status_str, &account_id.get()])
        .await?;
    Ok(())
}
