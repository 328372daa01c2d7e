use crate::error::{EngineError, Result};
use crate::models::{AuditAction, SYSTEM_USER_ID};
use crate::observability::metrics::get_metrics;
use crate::repositories::{account_repository, ledger_repository, AccountRepository};
use crate::services::audit_service::{AuditService, NewAuditEntry};
use crate::services::balance_service::balances_match;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

/// Outcome of comparing one account's cached balance against the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub account_id: i64,
    pub stored: Decimal,
    pub calculated: Decimal,
    pub difference: Decimal,
    pub needs_correction: bool,
}

/// Detects and (in repair mode) fixes drift between the cached
/// `accounts.balance` column and the ledger-derived balance. The ledger
/// itself is never modified.
pub struct ReconciliationService {
    pool: PgPool,
    accounts: AccountRepository,
}

impl ReconciliationService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn reconcile_account(&self, account_id: i64) -> Result<ReconciliationReport> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(EngineError::AccountNotFound { account_id })?;

        let calculated = ledger_repository::posted_balance(&self.pool, account.owner_id).await?;
        let difference = account.balance - calculated;

        Ok(ReconciliationReport {
            account_id,
            stored: account.balance,
            calculated,
            difference,
            needs_correction: !balances_match(account.balance, calculated),
        })
    }

    /// Sweeps every account and returns the drifted ones. In repair mode
    /// each drifted cache is rewritten from the ledger, with a
    /// `reconcile_balance` audit entry committed in the same transaction.
    pub async fn reconcile_all(&self, repair: bool) -> Result<Vec<ReconciliationReport>> {
        let mut drifted = Vec::new();

        for account_id in self.accounts.list_ids().await? {
            let report = self.reconcile_account(account_id).await?;
            if !report.needs_correction {
                continue;
            }

            warn!(
                account_id,
                stored = %report.stored,
                calculated = %report.calculated,
                difference = %report.difference,
                "cached balance drifted from ledger"
            );
            get_metrics().record_reconciliation_drift(repair);

            if repair {
                self.repair_account(&report).await?;
            }

            drifted.push(report);
        }

        Ok(drifted)
    }

    async fn repair_account(&self, report: &ReconciliationReport) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let account = account_repository::lock_account(&mut *tx, report.account_id)
            .await?
            .ok_or(EngineError::AccountNotFound {
                account_id: report.account_id,
            })?;

        sqlx::query("UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(report.account_id)
            .bind(report.calculated)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut tx,
            &NewAuditEntry::new(SYSTEM_USER_ID, account.owner_id, AuditAction::ReconcileBalance)
                .with_account(report.account_id)
                .with_reason("Cached balance rebuilt from ledger")
                .with_details(serde_json::json!({
                    "stored": report.stored,
                    "calculated": report.calculated,
                    "difference": report.difference,
                })),
        )
        .await?;

        tx.commit().await?;

        info!(
            account_id = report.account_id,
            balance = %report.calculated,
            "cached balance repaired"
        );
        Ok(())
    }

    /// Startup pass: rewrites every cached balance from the ledger so the
    /// column starts truthful. Returns the number of accounts touched.
    pub async fn rebuild_cached_balances(&self) -> Result<usize> {
        let ids = self.accounts.list_ids().await?;
        let count = ids.len();

        for account_id in ids {
            let account = self
                .accounts
                .find_by_id(account_id)
                .await?
                .ok_or(EngineError::AccountNotFound { account_id })?;
            let calculated =
                ledger_repository::posted_balance(&self.pool, account.owner_id).await?;
            self.accounts
                .update_cached_balance(account_id, calculated)
                .await?;
        }

        Ok(count)
    }
}
