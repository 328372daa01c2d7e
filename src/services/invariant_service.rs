use crate::error::Result;
use crate::models::{primary_account_number, Account, AuditAction, SYSTEM_USER_ID};
use crate::observability::metrics::get_metrics;
use crate::repositories::{
    AccountRepository, ImbalancedTransaction, LedgerRepository, TransactionRepository,
    UserRepository,
};
use crate::services::audit_service::{AuditService, NewAuditEntry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, info};

/// Findings of one verifier sweep. Every non-zero field is a critical
/// integrity signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvariantReport {
    /// Users with no account at all.
    pub orphaned_users: Vec<i64>,
    /// Accounts whose owner row is gone.
    pub accounts_missing_owner: Vec<i64>,
    /// Transactions with a NULL user or account binding.
    pub unbound_transactions: i64,
    /// Users whose KYC status column is missing.
    pub users_missing_kyc: i64,
    /// Transactions whose posted credits and debits differ (seed excluded).
    pub imbalanced_transactions: Vec<(i64, String)>,
    /// Posted entries whose pair was never closed (seed excluded).
    pub unpaired_entries: Vec<i64>,
}

impl InvariantReport {
    pub fn total_violations(&self) -> i64 {
        self.orphaned_users.len() as i64
            + self.accounts_missing_owner.len() as i64
            + self.unbound_transactions
            + self.users_missing_kyc
            + self.imbalanced_transactions.len() as i64
            + self.unpaired_entries.len() as i64
    }

    pub fn is_clean(&self) -> bool {
        self.total_violations() == 0
    }
}

/// What a repair pass changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairSummary {
    pub accounts_created: Vec<i64>,
    pub kyc_backfilled: u64,
}

/// Scans the store for violations of the core invariants: every user has an
/// account, every account an owner, every transaction both bindings, every
/// posted pair balanced. Repair mode creates missing primary accounts and
/// backfills missing KYC statuses.
pub struct InvariantService {
    pool: PgPool,
    users: UserRepository,
    accounts: AccountRepository,
    transactions: TransactionRepository,
    ledger: LedgerRepository,
}

impl InvariantService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            accounts: AccountRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn verify(&self) -> Result<InvariantReport> {
        let mut report = InvariantReport::default();

        for user in self.users.find_without_accounts().await? {
            error!(user_id = user.id, email = %user.email, "user has no account");
            report.orphaned_users.push(user.id);
        }

        for account in self.accounts.find_with_missing_owner().await? {
            error!(
                account_id = account.id,
                owner_id = account.owner_id,
                "account owner row is missing"
            );
            report.accounts_missing_owner.push(account.id);
        }

        report.unbound_transactions = self.transactions.count_unbound().await?;
        if report.unbound_transactions > 0 {
            error!(
                count = report.unbound_transactions,
                "transactions with NULL user or account binding"
            );
        }

        let (missing_kyc,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE kyc_status IS NULL")
                .fetch_one(&self.pool)
                .await?;
        report.users_missing_kyc = missing_kyc;
        if missing_kyc > 0 {
            error!(count = missing_kyc, "users without a KYC status");
        }

        for ImbalancedTransaction {
            transaction_id,
            credits,
            debits,
        } in self.ledger.find_imbalanced_transactions().await?
        {
            error!(
                transaction_id,
                %credits,
                %debits,
                "posted entries do not balance"
            );
            report
                .imbalanced_transactions
                .push((transaction_id, format!("credits {credits} != debits {debits}")));
        }

        for entry in self.ledger.find_unpaired_entries().await? {
            error!(entry_id = entry.id, transaction_id = entry.transaction_id, "posted entry has no pair");
            report.unpaired_entries.push(entry.id);
        }

        get_metrics().set_invariant_violations(report.total_violations());

        if report.is_clean() {
            info!("invariant sweep clean");
        }

        Ok(report)
    }

    /// Creates a primary account for each orphaned user (audited as a
    /// system-user action) and backfills missing KYC statuses.
    pub async fn repair(&self) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();

        for user in self.users.find_without_accounts().await? {
            let mut tx = self.pool.begin().await?;

            let account_number = primary_account_number(user.id, Utc::now());
            let account = sqlx::query_as::<_, Account>(
                r#"
                INSERT INTO accounts (account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account)
                VALUES ($1, $2, 'primary', 0, 'USD', 'active', 'basic', FALSE)
                RETURNING id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
                "#,
            )
            .bind(&account_number)
            .bind(user.id)
            .fetch_one(&mut *tx)
            .await?;

            AuditService::record(
                &mut tx,
                &NewAuditEntry::new(SYSTEM_USER_ID, user.id, AuditAction::CreateUser)
                    .with_account(account.id)
                    .with_reason("Primary account created for orphaned user")
                    .with_details(serde_json::json!({
                        "account_number": account.account_number,
                    })),
            )
            .await?;

            tx.commit().await?;

            info!(user_id = user.id, account_id = account.id, "orphaned user repaired");
            summary.accounts_created.push(account.id);
        }

        let backfilled =
            sqlx::query("UPDATE users SET kyc_status = 'not_started' WHERE kyc_status IS NULL")
                .execute(&self.pool)
                .await?;
        summary.kyc_backfilled = backfilled.rows_affected();

        Ok(summary)
    }
}
