use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Side of a double-entry pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entry_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    /// Returns the opposite entry type.
    pub fn opposite(&self) -> Self {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

/// Posting state of a ledger entry. Only `posted` entries affect balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entry_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Posted,
    Reversed,
}

/// One half of a double-entry record, kept against the account owner's user
/// id. Every posted entry has exactly one posted opposite of equal amount
/// with the same `transaction_id`, closed in both directions through
/// `related_entry_id`. The single exception is the reserve seed injection,
/// whose credit stands alone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub entry_type: EntryType,
    /// Always positive; the sign comes from `entry_type`.
    pub amount: Decimal,
    pub transaction_id: i64,
    /// The matching opposite entry. NULL only mid-write (and for the seed).
    pub related_entry_id: Option<i64>,
    /// Where the money came from, when the counterparty is known.
    pub source_user_id: Option<i64>,
    /// Where the money went, when the counterparty is known.
    pub destination_user_id: Option<i64>,
    pub description: Option<String>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// The entry's contribution to its user's balance: positive for credits,
    /// negative for debits.
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }

    /// Returns true while the entry counts toward balance.
    pub fn is_posted(&self) -> bool {
        matches!(self.status, EntryStatus::Posted)
    }
}
