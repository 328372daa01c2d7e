use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Stable error codes surfaced to callers. The HTTP layer maps these to
/// status codes; the engine never exposes anything beyond the code and the
/// offending field values carried by the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidAmount,
    UserNotFound,
    AccountNotFound,
    TransactionNotFound,
    OwnershipViolation,
    ActorInactive,
    AccountFrozen,
    AccountClosed,
    KycRejected,
    AlreadyReversed,
    InsufficientFunds,
    NotAdmin,
    AmountExceedsCeiling,
    EmailTaken,
    InvalidEmail,
    OrphanedUser,
    LedgerImbalance,
    MissingAccountBinding,
    Timeout,
    DbError,
}

impl ErrorCode {
    /// Stable wire label, also used as a metrics dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidAmount => "INVALID_AMOUNT",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorCode::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            ErrorCode::OwnershipViolation => "OWNERSHIP_VIOLATION",
            ErrorCode::ActorInactive => "ACTOR_INACTIVE",
            ErrorCode::AccountFrozen => "ACCOUNT_FROZEN",
            ErrorCode::AccountClosed => "ACCOUNT_CLOSED",
            ErrorCode::KycRejected => "KYC_REJECTED",
            ErrorCode::AlreadyReversed => "ALREADY_REVERSED",
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::NotAdmin => "NOT_ADMIN",
            ErrorCode::AmountExceedsCeiling => "AMOUNT_EXCEEDS_CEILING",
            ErrorCode::EmailTaken => "EMAIL_TAKEN",
            ErrorCode::InvalidEmail => "INVALID_EMAIL",
            ErrorCode::OrphanedUser => "ORPHANED_USER",
            ErrorCode::LedgerImbalance => "LEDGER_IMBALANCE",
            ErrorCode::MissingAccountBinding => "MISSING_ACCOUNT_BINDING",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::DbError => "DB_ERROR",
        }
    }
}

/// Error type for all engine operations.
///
/// Validation, state, and policy failures are ordinary outcomes returned to
/// the caller. Integrity variants signal a bug: the enclosing database
/// transaction rolls back and the failure is logged at ERROR with enough
/// context to reproduce.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("amount must be positive, got {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("user {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("account {account_id} not found")]
    AccountNotFound { account_id: i64 },

    #[error("transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: i64 },

    #[error("account {account_id} does not belong to user {user_id}")]
    OwnershipViolation { user_id: i64, account_id: i64 },

    #[error("user {user_id} is inactive")]
    ActorInactive { user_id: i64 },

    #[error("account {account_id} is frozen")]
    AccountFrozen { account_id: i64 },

    #[error("account {account_id} is closed")]
    AccountClosed { account_id: i64 },

    #[error("user {user_id} has rejected KYC and cannot transact")]
    KycRejected { user_id: i64 },

    #[error("transaction {transaction_id} is already reversed")]
    AlreadyReversed { transaction_id: i64 },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("user {user_id} is not an admin")]
    NotAdmin { user_id: i64 },

    #[error("amount {amount} exceeds the reserve ceiling {ceiling}")]
    AmountExceedsCeiling { amount: Decimal, ceiling: Decimal },

    #[error("email {email} is already registered")]
    EmailTaken { email: String },

    #[error("{email} is not a valid email address")]
    InvalidEmail { email: String },

    #[error("user {user_id} has no account")]
    OrphanedUser { user_id: i64 },

    #[error("ledger imbalance for transaction {transaction_id}: credits {credits}, debits {debits}")]
    LedgerImbalance {
        transaction_id: i64,
        credits: Decimal,
        debits: Decimal,
    },

    #[error("transaction {transaction_id} is missing a user or account binding")]
    MissingAccountBinding { transaction_id: i64 },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            EngineError::UserNotFound { .. } => ErrorCode::UserNotFound,
            EngineError::AccountNotFound { .. } => ErrorCode::AccountNotFound,
            EngineError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
            EngineError::OwnershipViolation { .. } => ErrorCode::OwnershipViolation,
            EngineError::ActorInactive { .. } => ErrorCode::ActorInactive,
            EngineError::AccountFrozen { .. } => ErrorCode::AccountFrozen,
            EngineError::AccountClosed { .. } => ErrorCode::AccountClosed,
            EngineError::KycRejected { .. } => ErrorCode::KycRejected,
            EngineError::AlreadyReversed { .. } => ErrorCode::AlreadyReversed,
            EngineError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            EngineError::NotAdmin { .. } => ErrorCode::NotAdmin,
            EngineError::AmountExceedsCeiling { .. } => ErrorCode::AmountExceedsCeiling,
            EngineError::EmailTaken { .. } => ErrorCode::EmailTaken,
            EngineError::InvalidEmail { .. } => ErrorCode::InvalidEmail,
            EngineError::OrphanedUser { .. } => ErrorCode::OrphanedUser,
            EngineError::LedgerImbalance { .. } => ErrorCode::LedgerImbalance,
            EngineError::MissingAccountBinding { .. } => ErrorCode::MissingAccountBinding,
            EngineError::Timeout(_) => ErrorCode::Timeout,
            EngineError::Database(_) => ErrorCode::DbError,
            EngineError::Internal(_) => ErrorCode::DbError,
        }
    }

    /// True for variants that indicate a broken invariant rather than a
    /// rejected request. These are never user-facing.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            EngineError::OrphanedUser { .. }
                | EngineError::LedgerImbalance { .. }
                | EngineError::MissingAccountBinding { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes_are_stable() {
        let err = EngineError::InsufficientFunds {
            requested: dec!(80),
            available: dec!(30),
        };
        assert_eq!(err.code(), ErrorCode::InsufficientFunds);

        let err = EngineError::OwnershipViolation {
            user_id: 42,
            account_id: 999,
        };
        assert_eq!(err.code(), ErrorCode::OwnershipViolation);
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::InsufficientFunds).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_FUNDS\"");
        let json = serde_json::to_string(&ErrorCode::KycRejected).unwrap();
        assert_eq!(json, "\"KYC_REJECTED\"");
    }

    #[test]
    fn test_as_str_matches_serde_labels() {
        for code in [
            ErrorCode::InvalidAmount,
            ErrorCode::OwnershipViolation,
            ErrorCode::AlreadyReversed,
            ErrorCode::DbError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json.trim_matches('"'), code.as_str());
        }
    }

    #[test]
    fn test_integrity_classification() {
        assert!(EngineError::LedgerImbalance {
            transaction_id: 1,
            credits: dec!(10),
            debits: dec!(0),
        }
        .is_integrity());
        assert!(EngineError::OrphanedUser { user_id: 5 }.is_integrity());
        assert!(!EngineError::InvalidAmount { amount: dec!(-1) }.is_integrity());
        assert!(!EngineError::Timeout(std::time::Duration::from_secs(5)).is_integrity());
    }

    #[test]
    fn test_display_carries_field_values() {
        let err = EngineError::InsufficientFunds {
            requested: dec!(50),
            available: dec!(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("50"));
        assert!(msg.contains("30"));
    }
}
