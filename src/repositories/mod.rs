pub mod account_repository;
pub mod audit_repository;
pub mod ledger_repository;
pub mod transaction_repository;
pub mod user_repository;

pub use account_repository::AccountRepository;
pub use audit_repository::{AuditFilter, AuditRepository};
pub use ledger_repository::{ImbalancedTransaction, LedgerRepository};
pub use transaction_repository::TransactionRepository;
pub use user_repository::UserRepository;

use sqlx::PgPool;

/// Database connection pool type alias.
pub type DbPool = PgPool;
