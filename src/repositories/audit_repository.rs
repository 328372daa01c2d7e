use crate::error::Result;
use crate::models::{AuditAction, AuditLogEntry};
use sqlx::PgPool;

/// Filter for listing audit entries. All fields optional; newest first.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub admin_id: Option<i64>,
    pub user_id: Option<i64>,
    pub action_type: Option<AuditAction>,
    pub limit: i64,
    pub skip: i64,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }
}

/// Read-side queries over the audit trail. There are no update or delete
/// paths; corrections append compensating entries.
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<AuditLogEntry>> {
        let row = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, admin_id, user_id, account_id, action_type, reason, details, status, status_message, created_at
            FROM audit_logs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
        let limit = if filter.limit <= 0 { 100 } else { filter.limit };

        let rows = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, admin_id, user_id, account_id, action_type, reason, details, status, status_message, created_at
            FROM audit_logs
            WHERE ($1::BIGINT IS NULL OR admin_id = $1)
              AND ($2::BIGINT IS NULL OR user_id = $2)
              AND ($3::audit_action IS NULL OR action_type = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.admin_id)
        .bind(filter.user_id)
        .bind(filter.action_type)
        .bind(limit)
        .bind(filter.skip.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_for(
        &self,
        admin_id: i64,
        user_id: i64,
        action_type: AuditAction,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM audit_logs
            WHERE admin_id = $1 AND user_id = $2 AND action_type = $3
            "#,
        )
        .bind(admin_id)
        .bind(user_id)
        .bind(action_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}
