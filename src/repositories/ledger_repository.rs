use crate::error::Result;
use crate::models::LedgerEntry;
use rust_decimal::Decimal;
use sqlx::PgPool;

/// A transaction whose posted sides do not cancel out.
#[derive(Debug, Clone)]
pub struct ImbalancedTransaction {
    pub transaction_id: i64,
    pub credits: Decimal,
    pub debits: Decimal,
}

/// Read-side queries over ledger entries. All pair writes go through the
/// ledger service inside the owning database transaction.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, destination_user_id, description, status, created_at, posted_at, reversed_at
            FROM ledger_entries
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_transaction(&self, transaction_id: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, destination_user_id, description, status, created_at, posted_at, reversed_at
            FROM ledger_entries
            WHERE transaction_id = $1
            ORDER BY id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, destination_user_id, description, status, created_at, posted_at, reversed_at
            FROM ledger_entries
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

    /// System-wide posted credit and debit totals.
    pub async fn posted_totals(&self) -> Result<(Decimal, Decimal)> {
        let row: (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN entry_type = 'credit' THEN amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN entry_type = 'debit' THEN amount ELSE 0 END), 0)
            FROM ledger_entries
            WHERE status = 'posted'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Transactions whose posted credits and debits differ. The seed
    /// injection is the one sanctioned exception and is excluded by its
    /// transaction type.
    pub async fn find_imbalanced_transactions(&self) -> Result<Vec<ImbalancedTransaction>> {
        let rows: Vec<(i64, Decimal, Decimal)> = sqlx::query_as(
            r#"
            SELECT
                l.transaction_id,
                COALESCE(SUM(CASE WHEN l.entry_type = 'credit' THEN l.amount ELSE 0 END), 0) AS credits,
                COALESCE(SUM(CASE WHEN l.entry_type = 'debit' THEN l.amount ELSE 0 END), 0) AS debits
            FROM ledger_entries l
            JOIN transactions t ON t.id = l.transaction_id
            WHERE l.status = 'posted' AND t.transaction_type <> 'system_seed'
            GROUP BY l.transaction_id
            HAVING
                COALESCE(SUM(CASE WHEN l.entry_type = 'credit' THEN l.amount ELSE 0 END), 0)
                <> COALESCE(SUM(CASE WHEN l.entry_type = 'debit' THEN l.amount ELSE 0 END), 0)
            ORDER BY l.transaction_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(transaction_id, credits, debits)| ImbalancedTransaction {
                transaction_id,
                credits,
                debits,
            })
            .collect())
    }

    /// Non-pending entries that never had their pair closed, seed excluded.
    pub async fn find_unpaired_entries(&self) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT l.id, l.user_id, l.entry_type, l.amount, l.transaction_id, l.related_entry_id, l.source_user_id, l.destination_user_id, l.description, l.status, l.created_at, l.posted_at, l.reversed_at
            FROM ledger_entries l
            JOIN transactions t ON t.id = l.transaction_id
            WHERE l.status <> 'pending'
              AND l.related_entry_id IS NULL
              AND t.transaction_type <> 'system_seed'
            ORDER BY l.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Ledger-derived balance for a user: posted credits minus posted debits,
/// computed in one round trip so it can run on a pool or inside an open
/// transaction.
pub async fn posted_balance<'e, E>(executor: E, user_id: i64) -> Result<Decimal>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: (Decimal, Decimal) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN entry_type = 'credit' THEN amount ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN entry_type = 'debit' THEN amount ELSE 0 END), 0)
        FROM ledger_entries
        WHERE user_id = $1 AND status = 'posted'
        "#,
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(row.0 - row.1)
}

/// Posted credit/debit sums for a single transaction.
pub async fn transaction_sums<'e, E>(executor: E, transaction_id: i64) -> Result<(Decimal, Decimal)>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: (Decimal, Decimal) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN entry_type = 'credit' THEN amount ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN entry_type = 'debit' THEN amount ELSE 0 END), 0)
        FROM ledger_entries
        WHERE transaction_id = $1 AND status = 'posted'
        "#,
    )
    .bind(transaction_id)
    .fetch_one(executor)
    .await?;

    Ok(row)
}
