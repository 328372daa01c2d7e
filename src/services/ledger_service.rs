use crate::error::{EngineError, Result};
use crate::models::{EntryStatus, EntryType, LedgerEntry};
use crate::observability::metrics::get_metrics;
use crate::observability::LatencyTimer;
use crate::repositories::ledger_repository;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::error;

/// One double-entry pair to be written: money moves from the debit user to
/// the credit user.
#[derive(Debug, Clone)]
pub struct PairSpec {
    pub transaction_id: i64,
    pub debit_user_id: i64,
    pub credit_user_id: i64,
    pub amount: Decimal,
    pub description: String,
}

/// Append-only double-entry writes. Every function runs on the caller's open
/// transaction; the caller owns commit and rollback.
pub struct LedgerService;

impl LedgerService {
    /// Inserts a balanced pair of posted entries for one transaction: the
    /// debit first, then the credit, then the links that close the pair in
    /// both directions. Verifies the posted sums before returning; a
    /// mismatch is a `LEDGER_IMBALANCE` and the enclosing transaction must
    /// roll back.
    pub async fn append_pair(
        conn: &mut PgConnection,
        spec: &PairSpec,
    ) -> Result<(LedgerEntry, LedgerEntry)> {
        if spec.amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount {
                amount: spec.amount,
            });
        }

        let timer = LatencyTimer::new();

        let debit = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (user_id, entry_type, amount, transaction_id, destination_user_id, description, status, posted_at)
            VALUES ($1, 'debit', $2, $3, $4, $5, 'posted', NOW())
            RETURNING id, user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, destination_user_id, description, status, created_at, posted_at, reversed_at
            "#,
        )
        .bind(spec.debit_user_id)
        .bind(spec.amount)
        .bind(spec.transaction_id)
        .bind(spec.credit_user_id)
        .bind(&spec.description)
        .fetch_one(&mut *conn)
        .await?;

        let credit = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger_entries (user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, description, status, posted_at)
            VALUES ($1, 'credit', $2, $3, $4, $5, $6, 'posted', NOW())
            RETURNING id, user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, destination_user_id, description, status, created_at, posted_at, reversed_at
            "#,
        )
        .bind(spec.credit_user_id)
        .bind(spec.amount)
        .bind(spec.transaction_id)
        .bind(debit.id)
        .bind(spec.debit_user_id)
        .bind(&spec.description)
        .fetch_one(&mut *conn)
        .await?;

        let debit = sqlx::query_as::<_, LedgerEntry>(
            r#"
            UPDATE ledger_entries
            SET related_entry_id = $2
            WHERE id = $1
            RETURNING id, user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, destination_user_id, description, status, created_at, posted_at, reversed_at
            "#,
        )
        .bind(debit.id)
        .bind(credit.id)
        .fetch_one(&mut *conn)
        .await?;

        let (credits, debits) =
            ledger_repository::transaction_sums(&mut *conn, spec.transaction_id).await?;
        if credits != debits {
            let err = EngineError::LedgerImbalance {
                transaction_id: spec.transaction_id,
                credits,
                debits,
            };
            error!(
                transaction_id = spec.transaction_id,
                %credits,
                %debits,
                "ledger pair write left transaction unbalanced"
            );
            return Err(err);
        }

        get_metrics().record_ledger_write_latency(timer.elapsed_ms());

        Ok((debit, credit))
    }

    /// Reverses the posted pair of `original_transaction_id` by writing the
    /// opposite pair against `reversal_transaction_id` and marking the
    /// originals reversed. Entries already reversed yield
    /// `ALREADY_REVERSED`; no compensating pair is written twice.
    pub async fn reverse(
        conn: &mut PgConnection,
        original_transaction_id: i64,
        reversal_transaction_id: i64,
        description: String,
    ) -> Result<(LedgerEntry, LedgerEntry)> {
        let originals = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, user_id, entry_type, amount, transaction_id, related_entry_id, source_user_id, destination_user_id, description, status, created_at, posted_at, reversed_at
            FROM ledger_entries
            WHERE transaction_id = $1
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(original_transaction_id)
        .fetch_all(&mut *conn)
        .await?;

        if originals
            .iter()
            .any(|e| e.status == EntryStatus::Reversed)
        {
            return Err(EngineError::AlreadyReversed {
                transaction_id: original_transaction_id,
            });
        }

        let debit = originals
            .iter()
            .find(|e| e.entry_type == EntryType::Debit && e.status == EntryStatus::Posted);
        let credit = originals
            .iter()
            .find(|e| e.entry_type == EntryType::Credit && e.status == EntryStatus::Posted);

        let (debit, credit) = match (debit, credit) {
            (Some(d), Some(c)) => (d, c),
            _ => {
                let err = EngineError::LedgerImbalance {
                    transaction_id: original_transaction_id,
                    credits: credit.map(|c| c.amount).unwrap_or_default(),
                    debits: debit.map(|d| d.amount).unwrap_or_default(),
                };
                error!(
                    transaction_id = original_transaction_id,
                    entry_count = originals.len(),
                    "reversal target has no posted debit/credit pair"
                );
                return Err(err);
            }
        };

        // Opposite pair: the original creditor pays the original debtor back.
        let reversal = LedgerService::append_pair(
            conn,
            &PairSpec {
                transaction_id: reversal_transaction_id,
                debit_user_id: credit.user_id,
                credit_user_id: debit.user_id,
                amount: debit.amount,
                description,
            },
        )
        .await?;

        sqlx::query(
            r#"
            UPDATE ledger_entries
            SET status = 'reversed', reversed_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(vec![debit.id, credit.id])
        .execute(&mut *conn)
        .await?;

        Ok(reversal)
    }
}
