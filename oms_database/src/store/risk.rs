use tokio_postgres::GenericClient;

use oms_domain::{AccountId, StrategyId};

use crate::error::Result;

/// `account_risk_state.allow_new_positions` consulted by intake for
/// non-`reduce_only` `send_order` commands (spec.md §4.3 step 2).
pub async fn fetch_account_allow_new_positions(client: &impl GenericClient, account_id: AccountId) -> Result<bool> {
    let row = client
        .query_opt(
            "SELECT allow_new_positions FROM account_risk_state WHERE account_id = $1",
            &[&account_id.get()],
        )
        .await?;
    Ok(row.map(|row| row.get::<_, bool>("allow_new_positions")).unwrap_or(true))
}

pub async fn set_account_allow_new_positions(client: &impl GenericClient, account_id: AccountId, allow: bool) -> Result<()> {
    client
        .execute(
            "INSERT INTO account_risk_state (account_id, allow_new_positions) VALUES ($1, $2) \
             ON CONFLICT (account_id) DO UPDATE SET allow_new_positions = EXCLUDED.allow_new_positions",
            &[&account_id.get(), &allow],
        )
        .await?;
    Ok(())
}

/// Strategy-level override of the account's `allow_new_positions` flag
/// (spec.md §4.3 step 2 "strategy-level override").
pub async fn fetch_strategy_allow_new_positions(
    client: &impl GenericClient,
    account_id: AccountId,
    strategy_id: StrategyId,
) -> Result<Option<bool>> {
    let row = client
        .query_opt(
            "SELECT allow_new_positions FROM strategy_risk_state WHERE account_id = $1 AND strategy_id = $2",
            &[&account_id.get(), &strategy_id.get()],
        )
        .await?;
    Ok(row.map(|row| row.get("allow_new_positions")))
}

pub async fn set_strategy_allow_new_positions(
    client: &impl GenericClient,
    account_id: AccountId,
    strategy_id: StrategyId,
    allow: bool,
) -> Result<()> {
    client
        .execute(
            "INSERT INTO strategy_risk_state (account_id, strategy_id, allow_new_positions) VALUES ($1, $2, $3) \
             ON CONFLICT (account_id, strategy_id) DO UPDATE SET allow_new_positions = EXCLUDED.allow_new_positions",
            &[&account_id.get(), &strategy_id.get(), &allow],
        )
        .await?;
    Ok(())
}
