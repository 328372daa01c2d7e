use crate::config::AdminSettings;
use crate::error::{EngineError, Result};
use crate::models::{
    primary_account_number, Account, User, SYSTEM_RESERVE_ACCOUNT_NUMBER, SYSTEM_USER_ID,
};
use crate::repositories::{account_repository, user_repository, UserRepository};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use validator::Validate;

/// Initial treasury funding written by the bootstrap seed.
pub const RESERVE_SEED_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 2);

/// Input for user provisioning. Password hashing happens upstream; the core
/// receives and stores the hash.
#[derive(Debug, Clone, Validate)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    pub password_hash: String,
    #[validate(length(min = 1))]
    pub full_name: String,
}

/// Identity provisioning: users and their primary account are born together,
/// atomically. Also owns the idempotent system-reserve bootstrap.
pub struct ProvisioningService {
    pool: PgPool,
    users: UserRepository,
}

impl ProvisioningService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            pool,
        }
    }

    /// Creates a user and their primary account in one database
    /// transaction. A user row without an account is never visible.
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<(User, Account)> {
        if request.validate().is_err() {
            return Err(EngineError::InvalidEmail {
                email: request.email,
            });
        }

        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status)
            VALUES ($1, $2, $3, TRUE, FALSE, FALSE, 'not_started')
            RETURNING id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
            "#,
        )
        .bind(&request.email)
        .bind(&request.full_name)
        .bind(&request.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_email(e, &request.email))?;

        let account_number = primary_account_number(user.id, user.created_at);
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account)
            VALUES ($1, $2, 'primary', 0, 'USD', 'active', 'basic', FALSE)
            RETURNING id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            "#,
        )
        .bind(&account_number)
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            user_id = user.id,
            account_id = account.id,
            "user registered with primary account"
        );

        Ok((user, account))
    }

    /// Verifies credentials. Returns the user on success, `None` for an
    /// unknown email, a bad password, or an inactive user; the three cases
    /// are deliberately indistinguishable.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(None);
        };

        if !user.is_active || !verify_password(password, &user.hashed_password) {
            return Ok(None);
        }

        Ok(Some(user))
    }

    /// Idempotent bootstrap: ensures the system user (id 1, admin, KYC
    /// approved), the treasury account, and the seed injection exist. The
    /// seed is one completed `system_seed` transaction backed by a single
    /// posted credit entry; it is the only posted entry without a pair.
    pub async fn ensure_system_reserve(pool: &PgPool, admin: &AdminSettings) -> Result<()> {
        let mut tx = pool.begin().await?;

        let system_user = user_repository::fetch_user(&mut *tx, SYSTEM_USER_ID).await?;
        if system_user.is_none() {
            let hashed = hash_password(&admin.password)?;
            sqlx::query(
                r#"
                INSERT INTO users (id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status)
                VALUES ($1, $2, 'System Reserve / Treasury', $3, TRUE, TRUE, TRUE, 'approved')
                "#,
            )
            .bind(SYSTEM_USER_ID)
            .bind(&admin.email)
            .bind(&hashed)
            .execute(&mut *tx)
            .await?;

            // The explicit id skips the sequence; realign it.
            sqlx::query("SELECT setval('users_id_seq', (SELECT MAX(id) FROM users))")
                .execute(&mut *tx)
                .await?;

            info!(user_id = SYSTEM_USER_ID, "system user created");
        } else {
            // Re-assert the reserved identity on every boot.
            sqlx::query(
                r#"
                UPDATE users
                SET is_active = TRUE, is_admin = TRUE, is_verified = TRUE, kyc_status = 'approved', updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(SYSTEM_USER_ID)
            .execute(&mut *tx)
            .await?;
        }

        let reserve = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            FROM accounts
            WHERE account_number = $1
            "#,
        )
        .bind(SYSTEM_RESERVE_ACCOUNT_NUMBER)
        .fetch_optional(&mut *tx)
        .await?;

        if reserve.is_none() {
            let reserve = sqlx::query_as::<_, Account>(
                r#"
                INSERT INTO accounts (account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account)
                VALUES ($1, $2, 'treasury', $3, 'USD', 'active', 'full', TRUE)
                RETURNING id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
                "#,
            )
            .bind(SYSTEM_RESERVE_ACCOUNT_NUMBER)
            .bind(SYSTEM_USER_ID)
            .bind(RESERVE_SEED_AMOUNT)
            .fetch_one(&mut *tx)
            .await?;

            let (seed_transaction_id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO transactions (user_id, account_id, amount, transaction_type, direction, status, description, kyc_status_at_time)
                VALUES ($1, $2, $3, 'system_seed', 'credit', 'completed', 'System reserve initialization seed', 'approved')
                RETURNING id
                "#,
            )
            .bind(SYSTEM_USER_ID)
            .bind(reserve.id)
            .bind(RESERVE_SEED_AMOUNT)
            .fetch_one(&mut *tx)
            .await?;

            // External injection: a lone posted credit, sanctioned as the
            // one entry without a pair.
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (user_id, entry_type, amount, transaction_id, description, status, posted_at)
                VALUES ($1, 'credit', $2, $3, 'System reserve initialization seed', 'posted', NOW())
                "#,
            )
            .bind(SYSTEM_USER_ID)
            .bind(RESERVE_SEED_AMOUNT)
            .bind(seed_transaction_id)
            .execute(&mut *tx)
            .await?;

            info!(
                account_number = SYSTEM_RESERVE_ACCOUNT_NUMBER,
                seed = %RESERVE_SEED_AMOUNT,
                "system reserve account seeded"
            );
        }

        tx.commit().await?;
        Ok(())
    }

    /// The user's primary account, or `ORPHANED_USER` if the creation
    /// invariant was somehow violated.
    pub async fn primary_account(&self, user_id: i64) -> Result<Account> {
        account_repository::fetch_primary_account(&self.pool, user_id)
            .await?
            .ok_or(EngineError::OrphanedUser { user_id })
    }
}

/// Argon2id hash of a password, for the bootstrap identity and admin
/// password resets.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| EngineError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Constant-time verification against a stored Argon2id hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn map_unique_email(err: sqlx::Error, email: &str) -> EngineError {
    if let sqlx::Error::Database(ref db) = err {
        if db.constraint() == Some("users_email_key") {
            return EngineError::EmailTaken {
                email: email.to_string(),
            };
        }
    }
    EngineError::Database(err)
}
