use crate::error::{EngineError, Result};
use crate::models::{TransactionStatus, SYSTEM_USER_ID};
use crate::observability::metrics::get_metrics;
use crate::observability::LatencyTimer;
use crate::repositories::{
    ledger_repository, transaction_repository, AccountRepository, LedgerRepository,
    TransactionRepository, UserRepository,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Tolerance used when comparing ledger-derived balances against the cached
/// column; differences below this absorb rounding.
pub const BALANCE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Available and held funds for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundSummary {
    pub user_id: i64,
    pub available: Decimal,
    pub held: Decimal,
    pub total: Decimal,
    pub pending_count: i64,
    pub blocked_count: i64,
}

/// System-wide posted totals. A balanced ledger keeps credits equal to
/// debits; the sum of user balances equals the external-injection net.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemTotals {
    pub total_credits_posted: Decimal,
    pub total_debits_posted: Decimal,
    pub sum_of_user_balances: Decimal,
}

/// Per-user breakdown of posted money movements by provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionBreakdown {
    pub balance: Decimal,
    pub deposits: Decimal,
    pub withdrawals: Decimal,
    pub transfers_received: Decimal,
}

/// Single source of truth for balances: every answer is derived from posted
/// ledger entries. The cached `accounts.balance` column is never consulted.
/// All reads are lock-free.
pub struct BalanceService {
    pool: PgPool,
    users: UserRepository,
    accounts: AccountRepository,
    transactions: TransactionRepository,
    ledger: LedgerRepository,
}

impl BalanceService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            accounts: AccountRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            pool,
        }
    }

    /// Posted credits minus posted debits for a user.
    pub async fn user_balance(&self, user_id: i64) -> Result<Decimal> {
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(EngineError::UserNotFound { user_id });
        }
        let timer = LatencyTimer::new();
        let balance = ledger_repository::posted_balance(&self.pool, user_id).await?;
        get_metrics().record_balance_query_latency(timer.elapsed_ms());
        Ok(balance)
    }

    /// The ledger is kept per user, so an account's balance is its owner's
    /// balance.
    pub async fn account_balance(&self, account_id: i64) -> Result<Decimal> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(EngineError::AccountNotFound { account_id })?;

        ledger_repository::posted_balance(&self.pool, account.owner_id).await
    }

    /// Amounts tied up in pending or blocked transactions. Visible, but
    /// excluded from the available balance.
    pub async fn held_funds(&self, user_id: i64) -> Result<Decimal> {
        transaction_repository::held_funds(&self.pool, user_id).await
    }

    pub async fn account_held_funds(&self, account_id: i64) -> Result<Decimal> {
        transaction_repository::account_held_funds(&self.pool, account_id).await
    }

    /// The `GetBalance` payload: available, held, and hold counts.
    pub async fn fund_summary(&self, user_id: i64) -> Result<FundSummary> {
        let available = self.user_balance(user_id).await?;
        let held = self.held_funds(user_id).await?;
        let pending_count = self
            .transactions
            .count_for_user_by_status(user_id, TransactionStatus::Pending)
            .await?;
        let blocked_count = self
            .transactions
            .count_for_user_by_status(user_id, TransactionStatus::Blocked)
            .await?;

        Ok(FundSummary {
            user_id,
            available,
            held,
            total: available + held,
            pending_count,
            blocked_count,
        })
    }

    pub async fn system_totals(&self) -> Result<SystemTotals> {
        let (total_credits_posted, total_debits_posted) = self.ledger.posted_totals().await?;

        let mut sum_of_user_balances = Decimal::ZERO;
        for user_id in self.users.list_ids().await? {
            sum_of_user_balances += ledger_repository::posted_balance(&self.pool, user_id).await?;
        }

        Ok(SystemTotals {
            total_credits_posted,
            total_debits_posted,
            sum_of_user_balances,
        })
    }

    pub async fn all_user_balances(&self) -> Result<Vec<(i64, Decimal)>> {
        let mut balances = Vec::new();
        for user_id in self.users.list_ids().await? {
            let balance = ledger_repository::posted_balance(&self.pool, user_id).await?;
            balances.push((user_id, balance));
        }
        Ok(balances)
    }

    /// Breakdown of a user's posted movements by counterparty provenance:
    /// deposits come from the system user, withdrawals go to it, transfers
    /// come from everyone else.
    pub async fn transaction_breakdown(&self, user_id: i64) -> Result<TransactionBreakdown> {
        let balance = self.user_balance(user_id).await?;

        let (deposits,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM ledger_entries
            WHERE user_id = $1 AND entry_type = 'credit' AND status = 'posted' AND source_user_id = $2
            "#,
        )
        .bind(user_id)
        .bind(SYSTEM_USER_ID)
        .fetch_one(&self.pool)
        .await?;

        let (withdrawals,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM ledger_entries
            WHERE user_id = $1 AND entry_type = 'debit' AND status = 'posted' AND destination_user_id = $2
            "#,
        )
        .bind(user_id)
        .bind(SYSTEM_USER_ID)
        .fetch_one(&self.pool)
        .await?;

        let (transfers_received,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM ledger_entries
            WHERE user_id = $1 AND entry_type = 'credit' AND status = 'posted'
              AND source_user_id IS NOT NULL AND source_user_id <> $2
            "#,
        )
        .bind(user_id)
        .bind(SYSTEM_USER_ID)
        .fetch_one(&self.pool)
        .await?;

        Ok(TransactionBreakdown {
            balance,
            deposits,
            withdrawals,
            transfers_received,
        })
    }
}

/// True when two balance figures agree within the rounding tolerance.
pub fn balances_match(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= BALANCE_TOLERANCE
}
