pub mod account;
pub mod audit_log;
pub mod ledger_entry;
pub mod transaction;
pub mod user;

pub use account::{
    primary_account_number, Account, AccountStatus, AccountType, KycLevel,
    SYSTEM_RESERVE_ACCOUNT_NUMBER,
};
pub use audit_log::{AuditAction, AuditLogEntry, AuditStatus};
pub use ledger_entry::{EntryStatus, EntryType, LedgerEntry};
pub use transaction::{Direction, TransactionRecord, TransactionStatus, TransactionType};
pub use user::{KycStatus, User, SYSTEM_USER_ID};
