use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Closed set of privileged actions an admin can take. Anything outside this
/// enum is rejected before it reaches the audit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Fund,
    ReverseTransaction,
    Freeze,
    Unfreeze,
    ApproveKyc,
    RejectKyc,
    ResetPassword,
    CreateUser,
    DeleteUser,
    SetAdmin,
    ReconcileBalance,
}

impl AuditAction {
    /// Parses an external action label; unknown values are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fund" => Some(AuditAction::Fund),
            "reverse_transaction" => Some(AuditAction::ReverseTransaction),
            "freeze" => Some(AuditAction::Freeze),
            "unfreeze" => Some(AuditAction::Unfreeze),
            "approve_kyc" => Some(AuditAction::ApproveKyc),
            "reject_kyc" => Some(AuditAction::RejectKyc),
            "reset_password" => Some(AuditAction::ResetPassword),
            "create_user" => Some(AuditAction::CreateUser),
            "delete_user" => Some(AuditAction::DeleteUser),
            "set_admin" => Some(AuditAction::SetAdmin),
            "reconcile_balance" => Some(AuditAction::ReconcileBalance),
            _ => None,
        }
    }

    /// Returns true if entries with this action must name an account.
    pub fn requires_account(&self) -> bool {
        matches!(
            self,
            AuditAction::Fund
                | AuditAction::Freeze
                | AuditAction::Unfreeze
                | AuditAction::ReconcileBalance
        )
    }
}

/// Outcome recorded with an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failed,
    Pending,
}

/// Immutable record of one privileged action. Written in the same database
/// transaction as the effect it describes; corrections append, never update.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub admin_id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub action_type: AuditAction,
    pub reason: Option<String>,
    pub details: Option<serde_json::Value>,
    pub status: AuditStatus,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
