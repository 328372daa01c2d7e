use crate::error::Result;
use crate::models::{TransactionRecord, TransactionStatus};
use rust_decimal::Decimal;
use sqlx::PgPool;

/// Read-side queries over transactions.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT id, user_id, account_id, amount, transaction_type, direction, status, description, reference_number, kyc_status_at_time, created_at, updated_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT id, user_id, account_id, amount, transaction_type, direction, status, description, reference_number, kyc_status_at_time, created_at, updated_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_for_user_by_status(
        &self,
        user_id: i64,
        status: TransactionStatus,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Transactions that lost their user or account binding. The schema
    /// forbids new ones; this scans for pre-migration leftovers.
    pub async fn count_unbound(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transactions WHERE user_id IS NULL OR account_id IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

/// Sum of pending and blocked amounts for a user: funds on hold, excluded
/// from balance.
pub async fn held_funds<'e, E>(executor: E, user_id: i64) -> Result<Decimal>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: (Decimal,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM transactions
        WHERE user_id = $1 AND status IN ('pending', 'blocked')
        "#,
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Held funds scoped to a single account.
pub async fn account_held_funds<'e, E>(executor: E, account_id: i64) -> Result<Decimal>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: (Decimal,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM transactions
        WHERE account_id = $1 AND status IN ('pending', 'blocked')
        "#,
    )
    .bind(account_id)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Fetches a transaction on an arbitrary executor.
pub async fn fetch_transaction<'e, E>(
    executor: E,
    transaction_id: i64,
) -> Result<Option<TransactionRecord>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, TransactionRecord>(
        r#"
        SELECT id, user_id, account_id, amount, transaction_type, direction, status, description, reference_number, kyc_status_at_time, created_at, updated_at
        FROM transactions
        WHERE id = $1
        "#,
    )
    .bind(transaction_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}
