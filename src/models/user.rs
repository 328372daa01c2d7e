use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The reserved system user. Owns the treasury account and is the
/// counterparty for every external deposit and withdrawal.
pub const SYSTEM_USER_ID: i64 = 1;

/// KYC lifecycle of a user.
/// Only `approved` allows transactions to post; `rejected` refuses them
/// outright; everything in between holds funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "kyc_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotStarted,
    Pending,
    Submitted,
    Approved,
    Rejected,
}

impl KycStatus {
    /// Returns true if transactions by this user may post immediately.
    pub fn allows_posting(&self) -> bool {
        matches!(self, KycStatus::Approved)
    }

    /// Returns true if the user is barred from transacting entirely.
    pub fn is_rejected(&self) -> bool {
        matches!(self, KycStatus::Rejected)
    }

    /// Returns true while verification is still in flight.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            KycStatus::NotStarted | KycStatus::Pending | KycStatus::Submitted
        )
    }
}

/// A platform user. Every non-admin user owns at least one account, created
/// in the same atomic step as the user row itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    pub kyc_status: KycStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// True for the reserved system identity.
    pub fn is_system(&self) -> bool {
        self.id == SYSTEM_USER_ID
    }
}
