use crate::error::Result;
use crate::models::Account;
use rust_decimal::Decimal;
use sqlx::PgPool;

/// Read-side queries over accounts plus the cached-balance write used by
/// reconciliation.
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            FROM accounts
            WHERE account_number = $1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// The user's primary account: oldest non-admin account they own.
    pub async fn find_primary_for_user(&self, user_id: i64) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            FROM accounts
            WHERE owner_id = $1 AND is_admin_account = FALSE
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            FROM accounts
            WHERE owner_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_ids(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM accounts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Rewrites the cached balance column. Reconciliation only; the ledger
    /// stays untouched.
    pub async fn update_cached_balance(&self, id: i64, balance: Decimal) -> Result<()> {
        sqlx::query("UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(balance)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Accounts whose owner row is missing — an invariant violation.
    pub async fn find_with_missing_owner(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(
            r#"
            SELECT a.id, a.account_number, a.owner_id, a.account_type, a.balance, a.currency, a.status, a.kyc_level, a.is_admin_account, a.created_at, a.updated_at
            FROM accounts a
            LEFT JOIN users u ON u.id = a.owner_id
            WHERE u.id IS NULL
            ORDER BY a.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Fetches an account on an arbitrary executor.
pub async fn fetch_account<'e, E>(executor: E, account_id: i64) -> Result<Option<Account>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
        FROM accounts
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Fetches a user's primary account (oldest non-admin account) on an
/// arbitrary executor.
pub async fn fetch_primary_account<'e, E>(executor: E, user_id: i64) -> Result<Option<Account>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
        FROM accounts
        WHERE owner_id = $1 AND is_admin_account = FALSE
        ORDER BY created_at
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Locks an account row `FOR UPDATE` inside an open transaction and returns
/// it. Callers must lock in ascending account-id order.
pub async fn lock_account<'e, E>(executor: E, account_id: i64) -> Result<Option<Account>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
        FROM accounts
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}
