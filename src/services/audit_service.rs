use crate::error::{EngineError, Result};
use crate::models::{AuditAction, AuditLogEntry, AuditStatus};
use crate::repositories::{account_repository, user_repository, AuditFilter, AuditRepository};
use sqlx::{PgConnection, PgPool};
use tracing::info;

/// A not-yet-written audit entry.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub admin_id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub action_type: AuditAction,
    pub reason: Option<String>,
    pub details: Option<serde_json::Value>,
    pub status: AuditStatus,
    pub status_message: Option<String>,
}

impl NewAuditEntry {
    pub fn new(admin_id: i64, user_id: i64, action_type: AuditAction) -> Self {
        Self {
            admin_id,
            user_id,
            account_id: None,
            action_type,
            reason: None,
            details: None,
            status: AuditStatus::Success,
            status_message: None,
        }
    }

    pub fn with_account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Append-only trail of privileged actions. Entries are written in the same
/// database transaction as the effect they describe; there is no update or
/// delete path.
pub struct AuditService {
    repo: AuditRepository,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: AuditRepository::new(pool),
        }
    }

    /// Validates and appends an entry on the caller's open transaction.
    ///
    /// The admin must exist and hold the admin flag; the subject must exist;
    /// a provided account must exist and, unless it is an admin account,
    /// belong to the subject.
    pub async fn record(
        conn: &mut PgConnection,
        entry: &NewAuditEntry,
    ) -> Result<AuditLogEntry> {
        let admin = user_repository::fetch_user(&mut *conn, entry.admin_id)
            .await?
            .ok_or(EngineError::UserNotFound {
                user_id: entry.admin_id,
            })?;
        if !admin.is_admin {
            return Err(EngineError::NotAdmin {
                user_id: entry.admin_id,
            });
        }

        user_repository::fetch_user(&mut *conn, entry.user_id)
            .await?
            .ok_or(EngineError::UserNotFound {
                user_id: entry.user_id,
            })?;

        if let Some(account_id) = entry.account_id {
            let account = account_repository::fetch_account(&mut *conn, account_id)
                .await?
                .ok_or(EngineError::AccountNotFound { account_id })?;
            if !account.is_admin_account && account.owner_id != entry.user_id {
                return Err(EngineError::OwnershipViolation {
                    user_id: entry.user_id,
                    account_id,
                });
            }
        }

        let row = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            INSERT INTO audit_logs (admin_id, user_id, account_id, action_type, reason, details, status, status_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, admin_id, user_id, account_id, action_type, reason, details, status, status_message, created_at
            "#,
        )
        .bind(entry.admin_id)
        .bind(entry.user_id)
        .bind(entry.account_id)
        .bind(entry.action_type)
        .bind(&entry.reason)
        .bind(&entry.details)
        .bind(entry.status)
        .bind(&entry.status_message)
        .fetch_one(&mut *conn)
        .await?;

        info!(
            admin_id = entry.admin_id,
            user_id = entry.user_id,
            account_id = ?entry.account_id,
            action = ?entry.action_type,
            audit_id = row.id,
            "admin action recorded"
        );

        Ok(row)
    }

    /// Lists entries matching the filter, newest first.
    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
        self.repo.list(filter).await
    }
}
