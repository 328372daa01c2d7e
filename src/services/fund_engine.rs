use crate::config::EngineSettings;
use crate::error::{EngineError, Result};
use crate::models::{
    AuditAction, Direction, KycStatus, TransactionRecord, TransactionStatus, TransactionType,
    SYSTEM_RESERVE_ACCOUNT_NUMBER, SYSTEM_USER_ID,
};
use crate::observability::metrics::get_metrics;
use crate::repositories::{account_repository, user_repository};
use crate::services::audit_service::{AuditService, NewAuditEntry};
use crate::services::ledger_service::{LedgerService, PairSpec};
use crate::services::transaction_gate::{
    AccountBinding, AdmissionRequest, OperationKind, TransactionGate,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a user-to-user transfer: one transaction record per side.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub debit_transaction: TransactionRecord,
    pub credit_transaction: TransactionRecord,
}

/// Result of an admin funding from the reserve.
#[derive(Debug, Clone)]
pub struct AdminFundOutcome {
    pub transaction: TransactionRecord,
    pub audit_id: i64,
    pub debit_entry_id: Option<i64>,
    pub credit_entry_id: Option<i64>,
}

/// Result of an admin reversal. Held transactions are cancelled in place and
/// produce no compensating transaction.
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    pub original: TransactionRecord,
    pub reversal: Option<TransactionRecord>,
    pub audit_id: i64,
}

/// Composes the gate, the ledger, and the audit trail into atomic money
/// movements. Every operation runs inside one database transaction under a
/// wall-clock deadline; account rows are locked `FOR UPDATE` in ascending id
/// order before any balance is read, so two concurrent debits cannot both
/// pass the sufficient-funds check.
pub struct FundEngine {
    pool: PgPool,
    gate: TransactionGate,
    timeout: Duration,
}

impl FundEngine {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            gate: TransactionGate::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn from_settings(pool: PgPool, settings: &EngineSettings) -> Self {
        Self {
            pool,
            gate: TransactionGate::new().with_reserve_ceiling(settings.reserve_ceiling),
            timeout: settings.operation_timeout(),
        }
    }

    pub fn with_gate(mut self, gate: TransactionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// External money in: the user is credited, the system user carries the
    /// matching debit.
    pub async fn deposit(
        &self,
        user_id: i64,
        account_id: i64,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransactionRecord> {
        let record = self
            .with_deadline(self.deposit_inner(user_id, account_id, amount, description))
            .await;
        self.observe("deposit", &record);
        record
    }

    async fn deposit_inner(
        &self,
        user_id: i64,
        account_id: i64,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransactionRecord> {
        let mut tx = self.pool.begin().await?;

        account_repository::lock_account(&mut *tx, account_id).await?;

        let admission = self
            .gate
            .admit(
                &mut tx,
                &AdmissionRequest {
                    actor_user_id: user_id,
                    operation: OperationKind::Deposit,
                    amount,
                    source: None,
                    target: Some(AccountBinding {
                        account_id,
                        user_id,
                    }),
                },
            )
            .await?;

        let record = insert_transaction(
            &mut tx,
            NewTransaction {
                user_id,
                account_id,
                amount,
                transaction_type: TransactionType::Deposit,
                direction: Direction::Credit,
                status: admission.initial_status,
                description: description.or_else(|| Some("Deposit".to_string())),
                kyc_status_at_time: admission.kyc_for(user_id),
            },
        )
        .await?;

        if admission.initial_status == TransactionStatus::Completed {
            LedgerService::append_pair(
                &mut tx,
                &PairSpec {
                    transaction_id: record.id,
                    debit_user_id: SYSTEM_USER_ID,
                    credit_user_id: user_id,
                    amount,
                    description: format!("Deposit into account {}", account_id),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    /// External money out: the user is debited, the system user credited.
    pub async fn withdraw(
        &self,
        user_id: i64,
        account_id: i64,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransactionRecord> {
        let record = self
            .with_deadline(self.withdraw_inner(user_id, account_id, amount, description))
            .await;
        self.observe("withdrawal", &record);
        record
    }

    async fn withdraw_inner(
        &self,
        user_id: i64,
        account_id: i64,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransactionRecord> {
        let mut tx = self.pool.begin().await?;

        account_repository::lock_account(&mut *tx, account_id).await?;

        let admission = self
            .gate
            .admit(
                &mut tx,
                &AdmissionRequest {
                    actor_user_id: user_id,
                    operation: OperationKind::Withdrawal,
                    amount,
                    source: Some(AccountBinding {
                        account_id,
                        user_id,
                    }),
                    target: None,
                },
            )
            .await?;

        let record = insert_transaction(
            &mut tx,
            NewTransaction {
                user_id,
                account_id,
                amount,
                transaction_type: TransactionType::Withdrawal,
                direction: Direction::Debit,
                status: admission.initial_status,
                description: description.or_else(|| Some("Withdrawal".to_string())),
                kyc_status_at_time: admission.kyc_for(user_id),
            },
        )
        .await?;

        if admission.initial_status == TransactionStatus::Completed {
            LedgerService::append_pair(
                &mut tx,
                &PairSpec {
                    transaction_id: record.id,
                    debit_user_id: user_id,
                    credit_user_id: SYSTEM_USER_ID,
                    amount,
                    description: format!("Withdrawal from account {}", account_id),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    /// Moves money between two users' primary accounts. Both sides get a
    /// transaction record sharing one reference number; the ledger pair
    /// hangs off the sender-side transaction.
    pub async fn transfer(
        &self,
        sender_id: i64,
        recipient_id: i64,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransferOutcome> {
        let outcome = self
            .with_deadline(self.transfer_inner(sender_id, recipient_id, amount, description))
            .await;
        match &outcome {
            Ok(o) => get_metrics().record_operation("transfer", o.debit_transaction.status),
            Err(e) => get_metrics().record_rejection("transfer", e.code()),
        }
        outcome
    }

    async fn transfer_inner(
        &self,
        sender_id: i64,
        recipient_id: i64,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransferOutcome> {
        let mut tx = self.pool.begin().await?;

        user_repository::fetch_user(&mut *tx, recipient_id)
            .await?
            .ok_or(EngineError::UserNotFound {
                user_id: recipient_id,
            })?;

        let sender_account = account_repository::fetch_primary_account(&mut *tx, sender_id)
            .await?
            .ok_or(EngineError::OrphanedUser { user_id: sender_id })?;
        let recipient_account = account_repository::fetch_primary_account(&mut *tx, recipient_id)
            .await?
            .ok_or(EngineError::OrphanedUser {
                user_id: recipient_id,
            })?;

        // Deadlock avoidance: canonical ascending lock order, never the
        // caller-supplied order.
        let mut lock_order = [sender_account.id, recipient_account.id];
        lock_order.sort_unstable();
        for id in lock_order {
            account_repository::lock_account(&mut *tx, id).await?;
        }

        let admission = self
            .gate
            .admit(
                &mut tx,
                &AdmissionRequest {
                    actor_user_id: sender_id,
                    operation: OperationKind::Transfer,
                    amount,
                    source: Some(AccountBinding {
                        account_id: sender_account.id,
                        user_id: sender_id,
                    }),
                    target: Some(AccountBinding {
                        account_id: recipient_account.id,
                        user_id: recipient_id,
                    }),
                },
            )
            .await?;

        let reference = transfer_reference();
        let note = description.unwrap_or_else(|| "Fund transfer".to_string());

        let debit_transaction = insert_transaction_with_reference(
            &mut tx,
            NewTransaction {
                user_id: sender_id,
                account_id: sender_account.id,
                amount,
                transaction_type: TransactionType::FundTransfer,
                direction: Direction::Debit,
                status: admission.initial_status,
                description: Some(format!("{} to user {}", note, recipient_id)),
                kyc_status_at_time: admission.kyc_for(sender_id),
            },
            Some(format!("{}-D", reference)),
        )
        .await?;

        let credit_transaction = insert_transaction_with_reference(
            &mut tx,
            NewTransaction {
                user_id: recipient_id,
                account_id: recipient_account.id,
                amount,
                transaction_type: TransactionType::FundTransfer,
                direction: Direction::Credit,
                status: admission.initial_status,
                description: Some(format!("{} from user {}", note, sender_id)),
                kyc_status_at_time: admission.kyc_for(recipient_id),
            },
            Some(format!("{}-C", reference)),
        )
        .await?;

        if admission.initial_status == TransactionStatus::Completed {
            LedgerService::append_pair(
                &mut tx,
                &PairSpec {
                    transaction_id: debit_transaction.id,
                    debit_user_id: sender_id,
                    credit_user_id: recipient_id,
                    amount,
                    description: format!("Transfer {} to user {}", reference, recipient_id),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(TransferOutcome {
            debit_transaction,
            credit_transaction,
        })
    }

    /// Admin-only: funds a user from the system reserve and records the
    /// audit entry atomically. The reserve is exempt from the
    /// sufficient-funds check and may go negative, bounded only by the
    /// configured ceiling.
    pub async fn admin_fund_from_reserve(
        &self,
        admin_id: i64,
        target_user_id: i64,
        target_account_id: i64,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<AdminFundOutcome> {
        let outcome = self
            .with_deadline(self.admin_fund_inner(
                admin_id,
                target_user_id,
                target_account_id,
                amount,
                reason,
            ))
            .await;
        match &outcome {
            Ok(o) => get_metrics().record_operation("admin_fund", o.transaction.status),
            Err(e) => get_metrics().record_rejection("admin_fund", e.code()),
        }
        outcome
    }

    async fn admin_fund_inner(
        &self,
        admin_id: i64,
        target_user_id: i64,
        target_account_id: i64,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<AdminFundOutcome> {
        let mut tx = self.pool.begin().await?;

        let admin = user_repository::fetch_user(&mut *tx, admin_id)
            .await?
            .ok_or(EngineError::UserNotFound { user_id: admin_id })?;
        if !admin.is_admin {
            return Err(EngineError::NotAdmin { user_id: admin_id });
        }
        // Funding oneself is not a privileged operation.
        if admin_id == target_user_id {
            return Err(EngineError::NotAdmin { user_id: admin_id });
        }

        let reserve = fetch_reserve_account(&mut tx).await?;

        let mut lock_order = [reserve.id, target_account_id];
        lock_order.sort_unstable();
        for id in lock_order {
            account_repository::lock_account(&mut *tx, id).await?;
        }

        let admission = self
            .gate
            .admit(
                &mut tx,
                &AdmissionRequest {
                    actor_user_id: admin_id,
                    operation: OperationKind::AdminFund,
                    amount,
                    source: Some(AccountBinding {
                        account_id: reserve.id,
                        user_id: SYSTEM_USER_ID,
                    }),
                    target: Some(AccountBinding {
                        account_id: target_account_id,
                        user_id: target_user_id,
                    }),
                },
            )
            .await?;

        let record = insert_transaction(
            &mut tx,
            NewTransaction {
                user_id: target_user_id,
                account_id: target_account_id,
                amount,
                transaction_type: TransactionType::FundTransfer,
                direction: Direction::Credit,
                status: admission.initial_status,
                description: Some("Admin funding from system reserve".to_string()),
                kyc_status_at_time: admission.kyc_for(target_user_id),
            },
        )
        .await?;

        let mut debit_entry_id = None;
        let mut credit_entry_id = None;
        if admission.initial_status == TransactionStatus::Completed {
            let (debit, credit) = LedgerService::append_pair(
                &mut tx,
                &PairSpec {
                    transaction_id: record.id,
                    debit_user_id: SYSTEM_USER_ID,
                    credit_user_id: target_user_id,
                    amount,
                    description: format!("Fund transfer to user {}", target_user_id),
                },
            )
            .await?;
            debit_entry_id = Some(debit.id);
            credit_entry_id = Some(credit.id);
        }

        let target_account = account_repository::fetch_account(&mut *tx, target_account_id)
            .await?
            .ok_or(EngineError::AccountNotFound {
                account_id: target_account_id,
            })?;

        let audit = AuditService::record(
            &mut tx,
            &NewAuditEntry::new(admin_id, target_user_id, AuditAction::Fund)
                .with_account(target_account_id)
                .with_reason(reason.unwrap_or_else(|| "Admin funding from system reserve".to_string()))
                .with_details(serde_json::json!({
                    "source_account": SYSTEM_RESERVE_ACCOUNT_NUMBER,
                    "target_account": target_account.account_number,
                    "amount": amount,
                    "debit_entry_id": debit_entry_id,
                    "credit_entry_id": credit_entry_id,
                    "transaction_id": record.id,
                })),
        )
        .await?;

        tx.commit().await?;

        info!(
            admin_id,
            target_user_id,
            target_account_id,
            %amount,
            transaction_id = record.id,
            audit_id = audit.id,
            "reserve funding committed"
        );

        Ok(AdminFundOutcome {
            transaction: record,
            audit_id: audit.id,
            debit_entry_id,
            credit_entry_id,
        })
    }

    /// Admin-only: reverses a transaction. Completed originals get a
    /// compensating pair and their entries marked reversed; held originals
    /// are cancelled without ledger effect. Reversing again returns
    /// `ALREADY_REVERSED`.
    pub async fn admin_reverse(
        &self,
        admin_id: i64,
        transaction_id: i64,
        reason: Option<String>,
    ) -> Result<ReversalOutcome> {
        let outcome = self
            .with_deadline(self.admin_reverse_inner(admin_id, transaction_id, reason))
            .await;
        match &outcome {
            Ok(_) => get_metrics().record_reversal(),
            Err(e) => get_metrics().record_rejection("reversal", e.code()),
        }
        outcome
    }

    async fn admin_reverse_inner(
        &self,
        admin_id: i64,
        transaction_id: i64,
        reason: Option<String>,
    ) -> Result<ReversalOutcome> {
        let mut tx = self.pool.begin().await?;

        let admin = user_repository::fetch_user(&mut *tx, admin_id)
            .await?
            .ok_or(EngineError::UserNotFound { user_id: admin_id })?;
        if !admin.is_admin {
            return Err(EngineError::NotAdmin { user_id: admin_id });
        }

        // Serialize competing reversals on the transaction row itself.
        let original = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT id, user_id, account_id, amount, transaction_type, direction, status, description, reference_number, kyc_status_at_time, created_at, updated_at
            FROM transactions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EngineError::TransactionNotFound { transaction_id })?;

        if !original.can_reverse() {
            return Err(EngineError::AlreadyReversed { transaction_id });
        }

        let note = reason.unwrap_or_else(|| "Admin reversal".to_string());

        let (outcome_original, reversal) = if original.status.is_held() {
            let cancelled = sqlx::query_as::<_, TransactionRecord>(
                r#"
                UPDATE transactions
                SET status = 'cancelled', updated_at = NOW()
                WHERE id = $1
                RETURNING id, user_id, account_id, amount, transaction_type, direction, status, description, reference_number, kyc_status_at_time, created_at, updated_at
                "#,
            )
            .bind(transaction_id)
            .fetch_one(&mut *tx)
            .await?;
            (cancelled, None)
        } else {
            let reversal = insert_transaction(
                &mut tx,
                NewTransaction {
                    user_id: original.user_id,
                    account_id: original.account_id,
                    amount: original.amount,
                    transaction_type: TransactionType::Reversal,
                    direction: original.direction.opposite(),
                    status: TransactionStatus::Completed,
                    description: Some(format!(
                        "Reversal of transaction {}: {}",
                        transaction_id, note
                    )),
                    kyc_status_at_time: original.kyc_status_at_time,
                },
            )
            .await?;

            // A transfer's pair hangs off the sender-side record; when the
            // recipient-side record is targeted, resolve the sibling through
            // the shared reference number.
            let ledger_transaction_id = if original.transaction_type
                == TransactionType::FundTransfer
                && original.direction == Direction::Credit
            {
                sibling_transfer_id(&mut tx, &original)
                    .await?
                    .unwrap_or(transaction_id)
            } else {
                transaction_id
            };

            LedgerService::reverse(
                &mut tx,
                ledger_transaction_id,
                reversal.id,
                format!("Reversal of transaction {}: {}", transaction_id, note),
            )
            .await?;

            (original.clone(), Some(reversal))
        };

        let audit = AuditService::record(
            &mut tx,
            &NewAuditEntry::new(admin_id, original.user_id, AuditAction::ReverseTransaction)
                .with_account(original.account_id)
                .with_reason(note)
                .with_details(serde_json::json!({
                    "transaction_id": transaction_id,
                    "amount_reversed": original.amount,
                    "reversal_transaction_id": reversal.as_ref().map(|r| r.id),
                    "cancelled_hold": reversal.is_none(),
                })),
        )
        .await?;

        tx.commit().await?;

        info!(
            admin_id,
            transaction_id,
            reversal_id = ?reversal.as_ref().map(|r| r.id),
            audit_id = audit.id,
            "reversal committed"
        );

        Ok(ReversalOutcome {
            original: outcome_original,
            reversal,
            audit_id: audit.id,
        })
    }

    async fn with_deadline<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "fund-engine operation timed out, rolling back");
                Err(EngineError::Timeout(self.timeout))
            }
        }
    }

    fn observe(&self, operation: &'static str, result: &Result<TransactionRecord>) {
        match result {
            Ok(record) => get_metrics().record_operation(operation, record.status),
            Err(err) => get_metrics().record_rejection(operation, err.code()),
        }
    }
}

struct NewTransaction {
    user_id: i64,
    account_id: i64,
    amount: Decimal,
    transaction_type: TransactionType,
    direction: Direction,
    status: TransactionStatus,
    description: Option<String>,
    kyc_status_at_time: Option<KycStatus>,
}

async fn insert_transaction(
    conn: &mut PgConnection,
    new: NewTransaction,
) -> Result<TransactionRecord> {
    let reference = transfer_reference();
    insert_transaction_with_reference(conn, new, Some(reference)).await
}

async fn insert_transaction_with_reference(
    conn: &mut PgConnection,
    new: NewTransaction,
    reference_number: Option<String>,
) -> Result<TransactionRecord> {
    let row = sqlx::query_as::<_, TransactionRecord>(
        r#"
        INSERT INTO transactions (user_id, account_id, amount, transaction_type, direction, status, description, reference_number, kyc_status_at_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, user_id, account_id, amount, transaction_type, direction, status, description, reference_number, kyc_status_at_time, created_at, updated_at
        "#,
    )
    .bind(new.user_id)
    .bind(new.account_id)
    .bind(new.amount)
    .bind(new.transaction_type)
    .bind(new.direction)
    .bind(new.status)
    .bind(&new.description)
    .bind(&reference_number)
    .bind(new.kyc_status_at_time)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

async fn fetch_reserve_account(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<crate::models::Account> {
    let account = sqlx::query_as::<_, crate::models::Account>(
        r#"
        SELECT id, account_number, owner_id, account_type, balance, currency, status, kyc_level, is_admin_account, created_at, updated_at
        FROM accounts
        WHERE account_number = $1
        "#,
    )
    .bind(SYSTEM_RESERVE_ACCOUNT_NUMBER)
    .fetch_optional(&mut **tx)
    .await?
    // The reserve is created at bootstrap; its absence is a deployment
    // fault, not a caller error.
    .ok_or(EngineError::Database(sqlx::Error::RowNotFound))?;

    Ok(account)
}

async fn sibling_transfer_id(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    original: &TransactionRecord,
) -> Result<Option<i64>> {
    let Some(prefix) = original
        .reference_number
        .as_deref()
        .and_then(|r| r.strip_suffix("-C"))
    else {
        return Ok(None);
    };

    let sibling: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM transactions WHERE reference_number = $1")
            .bind(format!("{}-D", prefix))
            .fetch_optional(&mut **tx)
            .await?;

    Ok(sibling.map(|s| s.0))
}

fn transfer_reference() -> String {
    format!("TXN-{}", Uuid::new_v4())
}
