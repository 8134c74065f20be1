use tokio_postgres::GenericClient;

use oms_domain::AccountId;

use crate::error::Result;

/// Monotonic millisecond watermark, stored as a decimal string (spec.md §3
/// `ReconciliationCursor`).
pub async fn fetch_reconciliation_cursor(
    client: &impl GenericClient,
    account_id: AccountId,
    entity: &str,
) -> Result<Option<String>> {
    let row = client
        .query_opt(
            "SELECT cursor_value FROM reconciliation_cursor WHERE account_id = $1 AND entity = $2",
            &[&account_id.get(), &entity],
        )
        .await?;
    Ok(row.map(|row| row.get("cursor_value")))
}

/// Upserts the cursor, refusing to move it backwards (spec.md §4.1, §4.6
/// step 7, testable property 4). The comparison happens in SQL so a
/// concurrent reconciler run for the same account can never regress it.
pub async fn update_reconciliation_cursor(
    client: &impl GenericClient,
    account_id: AccountId,
    entity: &str,
    cursor_value: &str,
) -> Result<()> {
    client
        .execute(
            "INSERT INTO reconciliation_cursor (account_id, entity, cursor_value) VALUES ($1, $2, $3) \
             ON CONFLICT (account_id, entity) DO UPDATE SET cursor_value = EXCLUDED.cursor_value \
             WHERE EXCLUDED.cursor_value::numeric > reconciliation_cursor.cursor_value::numeric",
            &[&account_id.get(), &entity, &cursor_value],
        )
        .await?;
    Ok(())
}
