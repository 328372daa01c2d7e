use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The treasury account that backs every admin funding operation.
pub const SYSTEM_RESERVE_ACCOUNT_NUMBER: &str = "SYS-RESERVE-0001";

/// Product class of an account. `Treasury` is reserved for the system
/// reserve; `Primary` is the account created alongside every new user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Business,
    Investment,
    Treasury,
    Primary,
}

/// Operational state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    /// Returns true if the account can participate in transactions.
    pub fn is_operational(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

/// KYC tier granted to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "kyc_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KycLevel {
    None,
    Basic,
    Full,
}

/// A customer (or treasury) account. The `balance` column is a cached
/// projection of the ledger, maintained by reconciliation; admission
/// decisions never read it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub account_number: String,
    pub owner_id: i64,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    pub kyc_level: KycLevel,
    pub is_admin_account: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// True for the system reserve.
    pub fn is_reserve(&self) -> bool {
        self.account_number == SYSTEM_RESERVE_ACCOUNT_NUMBER
    }

    pub fn is_operational(&self) -> bool {
        self.status.is_operational()
    }
}

/// Account number for a user's primary account, derived from the user id and
/// the sub-second component of the creation instant.
pub fn primary_account_number(user_id: i64, created: DateTime<Utc>) -> String {
    format!("ACC{}_{}", user_id, created.timestamp_subsec_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_status_operational() {
        assert!(AccountStatus::Active.is_operational());
        assert!(!AccountStatus::Frozen.is_operational());
        assert!(!AccountStatus::Closed.is_operational());
    }

    #[test]
    fn test_primary_account_number_shape() {
        let created = Utc::now();
        let number = primary_account_number(42, created);
        assert!(number.starts_with("ACC42_"));
        let suffix = number.strip_prefix("ACC42_").unwrap();
        assert!(suffix.parse::<u32>().is_ok());
    }

    #[test]
    fn test_account_type_serialization() {
        let json = serde_json::to_string(&AccountType::Treasury).unwrap();
        assert_eq!(json, "\"treasury\"");
        let parsed: AccountType = serde_json::from_str("\"primary\"").unwrap();
        assert_eq!(parsed, AccountType::Primary);
    }
}
