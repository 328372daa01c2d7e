use crate::error::Result;
use crate::models::User;
use sqlx::PgPool;

/// Read-side queries over users. Writes happen inside service-owned
/// transactions.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_ids(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Users with no account at all — an invariant violation.
    pub async fn find_without_accounts(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
            FROM users u
            WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.owner_id = u.id)
            ORDER BY u.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Fetches a user on an arbitrary executor, usable inside an open
/// transaction.
pub async fn fetch_user<'e, E>(executor: E, user_id: i64) -> Result<Option<User>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}
