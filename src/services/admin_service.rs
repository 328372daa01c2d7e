use crate::error::{EngineError, Result};
use crate::models::{Account, AccountStatus, AuditAction, AuditLogEntry, User};
use crate::repositories::account_repository;
use crate::services::audit_service::{AuditService, NewAuditEntry};
use crate::services::provisioning_service::hash_password;
use sqlx::PgPool;
use tracing::info;

/// Privileged account and identity state changes. Each call is one database
/// transaction: the state change and its audit entry commit together or not
/// at all. Audit-side validation (admin flag, subject existence, account
/// binding) applies to every call.
pub struct AdminService {
    pool: PgPool,
}

impl AdminService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn freeze_account(
        &self,
        admin_id: i64,
        user_id: i64,
        account_id: i64,
        reason: Option<String>,
    ) -> Result<(Account, AuditLogEntry)> {
        let mut tx = self.pool.begin().await?;

        let account = account_repository::lock_account(&mut *tx, account_id)
            .await?
            .ok_or(EngineError::AccountNotFound { account_id })?;
        if account.status == AccountStatus::Closed {
            return Err(EngineError::AccountClosed { account_id });
        }

        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET status = 'frozen', updated_at = NOW()
            WHERE id = $1
            RETURNING id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await?;

        let audit = AuditService::record(
            &mut tx,
            &NewAuditEntry::new(admin_id, user_id, AuditAction::Freeze)
                .with_account(account_id)
                .with_reason(reason.unwrap_or_else(|| "Account frozen by admin".to_string())),
        )
        .await?;

        tx.commit().await?;
        info!(admin_id, account_id, "account frozen");
        Ok((account, audit))
    }

    pub async fn unfreeze_account(
        &self,
        admin_id: i64,
        user_id: i64,
        account_id: i64,
        reason: Option<String>,
    ) -> Result<(Account, AuditLogEntry)> {
        let mut tx = self.pool.begin().await?;

        let account = account_repository::lock_account(&mut *tx, account_id)
            .await?
            .ok_or(EngineError::AccountNotFound { account_id })?;
        if account.status == AccountStatus::Closed {
            return Err(EngineError::AccountClosed { account_id });
        }

        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET status = 'active', updated_at = NOW()
            WHERE id = $1
            RETURNING id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await?;

        let audit = AuditService::record(
            &mut tx,
            &NewAuditEntry::new(admin_id, user_id, AuditAction::Unfreeze)
                .with_account(account_id)
                .with_reason(reason.unwrap_or_else(|| "Account unfrozen by admin".to_string())),
        )
        .await?;

        tx.commit().await?;
        info!(admin_id, account_id, "account unfrozen");
        Ok((account, audit))
    }

    pub async fn approve_kyc(
        &self,
        admin_id: i64,
        user_id: i64,
        reason: Option<String>,
    ) -> Result<(User, AuditLogEntry)> {
        self.set_kyc(admin_id, user_id, true, reason).await
    }

    pub async fn reject_kyc(
        &self,
        admin_id: i64,
        user_id: i64,
        reason: Option<String>,
    ) -> Result<(User, AuditLogEntry)> {
        self.set_kyc(admin_id, user_id, false, reason).await
    }

    async fn set_kyc(
        &self,
        admin_id: i64,
        user_id: i64,
        approve: bool,
        reason: Option<String>,
    ) -> Result<(User, AuditLogEntry)> {
        let mut tx = self.pool.begin().await?;

        let user = if approve {
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET kyc_status = 'approved', is_verified = TRUE, updated_at = NOW()
                WHERE id = $1
                RETURNING id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
                "#,
            )
        } else {
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET kyc_status = 'rejected', updated_at = NOW()
                WHERE id = $1
                RETURNING id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
                "#,
            )
        }
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::UserNotFound { user_id })?;

        let action = if approve {
            AuditAction::ApproveKyc
        } else {
            AuditAction::RejectKyc
        };
        let default_reason = if approve {
            "KYC approved by admin"
        } else {
            "KYC rejected by admin"
        };

        let audit = AuditService::record(
            &mut tx,
            &NewAuditEntry::new(admin_id, user_id, action)
                .with_reason(reason.unwrap_or_else(|| default_reason.to_string())),
        )
        .await?;

        tx.commit().await?;
        info!(admin_id, user_id, approved = approve, "kyc decision recorded");
        Ok((user, audit))
    }

    pub async fn set_admin(
        &self,
        admin_id: i64,
        user_id: i64,
        grant: bool,
        reason: Option<String>,
    ) -> Result<(User, AuditLogEntry)> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_admin = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, full_name, hashed_password, is_active, is_admin, is_verified, kyc_status, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(grant)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::UserNotFound { user_id })?;

        let audit = AuditService::record(
            &mut tx,
            &NewAuditEntry::new(admin_id, user_id, AuditAction::SetAdmin)
                .with_reason(reason.unwrap_or_else(|| "Admin flag changed".to_string()))
                .with_details(serde_json::json!({ "granted": grant })),
        )
        .await?;

        tx.commit().await?;
        info!(admin_id, user_id, granted = grant, "admin flag changed");
        Ok((user, audit))
    }

    /// Stores a fresh hash for the user. The audit entry records only that a
    /// reset happened; the password itself never reaches the trail.
    pub async fn reset_password(
        &self,
        admin_id: i64,
        user_id: i64,
        new_password: &str,
        reason: Option<String>,
    ) -> Result<AuditLogEntry> {
        let hashed = hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE users SET hashed_password = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(&hashed)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(EngineError::UserNotFound { user_id });
        }

        let audit = AuditService::record(
            &mut tx,
            &NewAuditEntry::new(admin_id, user_id, AuditAction::ResetPassword)
                .with_reason(reason.unwrap_or_else(|| "Password reset by admin".to_string()))
                .with_details(serde_json::json!({ "force_change_on_next_login": true })),
        )
        .await?;

        tx.commit().await?;
        info!(admin_id, user_id, "password reset");
        Ok(audit)
    }
}
