use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::user::KycStatus;

/// Kind of money movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// External money in.
    Deposit,
    /// External money out.
    Withdrawal,
    /// User-to-user or reserve-to-user movement.
    FundTransfer,
    /// Interest accrual.
    Interest,
    /// Compensating transaction created by an admin reversal.
    Reversal,
    /// The one-time reserve seed injection.
    SystemSeed,
}

impl TransactionType {
    /// Returns true if an admin reversal may target this transaction.
    pub fn is_reversible(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit
                | TransactionType::Withdrawal
                | TransactionType::FundTransfer
                | TransactionType::Interest
        )
    }
}

/// Which side of the movement this record represents for its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Credit => Direction::Debit,
            Direction::Debit => Direction::Credit,
        }
    }
}

/// Lifecycle status of a transaction.
/// Only `completed` transactions have posted ledger entries; `pending` and
/// `blocked` amounts are held funds, visible but excluded from balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Blocked,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Returns true once no further transition is possible.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    /// Returns true while the amount counts as held funds.
    pub fn is_held(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Blocked)
    }

    /// Persisted label, also used as a metrics dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Blocked => "blocked",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

/// A recorded money movement, always bound to both a user and an account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub direction: Direction,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub reference_number: Option<String>,
    /// Snapshot of the subject's KYC status at admission time.
    pub kyc_status_at_time: Option<KycStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Returns true if an admin reversal may target this transaction in its
    /// current state.
    pub fn can_reverse(&self) -> bool {
        self.transaction_type.is_reversible()
            && matches!(
                self.status,
                TransactionStatus::Completed
                    | TransactionStatus::Pending
                    | TransactionStatus::Blocked
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversible_types() {
        assert!(TransactionType::Deposit.is_reversible());
        assert!(TransactionType::Withdrawal.is_reversible());
        assert!(TransactionType::FundTransfer.is_reversible());
        assert!(!TransactionType::Reversal.is_reversible());
        assert!(!TransactionType::SystemSeed.is_reversible());
    }

    #[test]
    fn test_status_held_and_final() {
        assert!(TransactionStatus::Pending.is_held());
        assert!(TransactionStatus::Blocked.is_held());
        assert!(!TransactionStatus::Completed.is_held());

        assert!(TransactionStatus::Completed.is_final());
        assert!(TransactionStatus::Failed.is_final());
        assert!(TransactionStatus::Cancelled.is_final());
        assert!(!TransactionStatus::Pending.is_final());
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Credit.opposite(), Direction::Debit);
        assert_eq!(Direction::Debit.opposite(), Direction::Credit);
    }

    #[test]
    fn test_type_serialization() {
        let json = serde_json::to_string(&TransactionType::FundTransfer).unwrap();
        assert_eq!(json, "\"fund_transfer\"");
        let json = serde_json::to_string(&TransactionStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
