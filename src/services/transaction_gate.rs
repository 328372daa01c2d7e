use crate::error::{EngineError, Result};
use crate::models::{Account, AccountStatus, KycStatus, TransactionStatus, User};
use crate::repositories::{account_repository, ledger_repository, user_repository};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use std::sync::Arc;

/// The kind of money movement being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deposit,
    Withdrawal,
    Transfer,
    AdminFund,
}

/// An account reference together with the user claimed to own it.
#[derive(Debug, Clone, Copy)]
pub struct AccountBinding {
    pub account_id: i64,
    pub user_id: i64,
}

/// Input to the admission decision. `source` is the debit side, `target`
/// the credit side; either may be absent depending on the operation.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub actor_user_id: i64,
    pub operation: OperationKind,
    pub amount: Decimal,
    pub source: Option<AccountBinding>,
    pub target: Option<AccountBinding>,
}

/// KYC snapshot taken for one party at admission time.
#[derive(Debug, Clone, Copy)]
pub struct PartyKyc {
    pub user_id: i64,
    pub kyc_status: KycStatus,
}

/// A positive admission verdict: the operation may proceed at
/// `initial_status`. Rejections are reported through `EngineError`.
#[derive(Debug, Clone)]
pub struct Admission {
    pub initial_status: TransactionStatus,
    pub reason: String,
    parties: Vec<PartyKyc>,
}

impl Admission {
    /// The KYC status snapshotted for `user_id`, if that user was a party.
    pub fn kyc_for(&self, user_id: i64) -> Option<KycStatus> {
        self.parties
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.kyc_status)
    }
}

/// Advisory compliance verdict. `Block` admits the operation but holds the
/// funds at `blocked` status.
#[derive(Debug, Clone)]
pub enum ComplianceVerdict {
    Pass,
    Block { reason: String },
}

/// Pluggable fraud/compliance hook consulted last. Implementations must be
/// deterministic for a given request so admissions can be replayed.
#[async_trait]
pub trait CompliancePredicate: Send + Sync {
    async fn review(&self, request: &AdmissionRequest) -> ComplianceVerdict;
}

/// Default predicate: passes everything.
pub struct PassAll;

#[async_trait]
impl CompliancePredicate for PassAll {
    async fn review(&self, _request: &AdmissionRequest) -> ComplianceVerdict {
        ComplianceVerdict::Pass
    }
}

/// Admission controller: decides, before any ledger write, whether a money
/// movement may proceed and at what initial status. Rules run in a fixed
/// order and the first failure wins. Runs on the caller's transaction so the
/// sufficient-funds read happens under the caller's row locks.
pub struct TransactionGate {
    compliance: Arc<dyn CompliancePredicate>,
    reserve_ceiling: Option<Decimal>,
}

impl TransactionGate {
    pub fn new() -> Self {
        Self {
            compliance: Arc::new(PassAll),
            reserve_ceiling: None,
        }
    }

    pub fn with_compliance(mut self, predicate: Arc<dyn CompliancePredicate>) -> Self {
        self.compliance = predicate;
        self
    }

    pub fn with_reserve_ceiling(mut self, ceiling: Option<Decimal>) -> Self {
        self.reserve_ceiling = ceiling;
        self
    }

    pub async fn admit(
        &self,
        conn: &mut PgConnection,
        request: &AdmissionRequest,
    ) -> Result<Admission> {
        // Rule 1: positive amount.
        if request.amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount {
                amount: request.amount,
            });
        }

        // Rule 2: the actor exists and is active.
        let actor = user_repository::fetch_user(&mut *conn, request.actor_user_id)
            .await?
            .ok_or(EngineError::UserNotFound {
                user_id: request.actor_user_id,
            })?;
        if !actor.is_active {
            return Err(EngineError::ActorInactive {
                user_id: actor.id,
            });
        }

        let bindings: Vec<AccountBinding> =
            [request.source, request.target].into_iter().flatten().collect();

        // Rule 3: every referenced account exists.
        let mut referenced: Vec<(AccountBinding, Account)> = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let account = account_repository::fetch_account(&mut *conn, binding.account_id)
                .await?
                .ok_or(EngineError::AccountNotFound {
                    account_id: binding.account_id,
                })?;
            referenced.push((binding, account));
        }

        // Rule 4: ownership binding. Admin accounts require an admin actor
        // instead of an owner match.
        for (binding, account) in &referenced {
            if account.is_admin_account {
                if !actor.is_admin {
                    return Err(EngineError::OwnershipViolation {
                        user_id: request.actor_user_id,
                        account_id: account.id,
                    });
                }
            } else if account.owner_id != binding.user_id {
                return Err(EngineError::OwnershipViolation {
                    user_id: binding.user_id,
                    account_id: account.id,
                });
            }
        }

        // Rule 5: account status.
        for (_, account) in &referenced {
            match account.status {
                AccountStatus::Active => {}
                AccountStatus::Frozen => {
                    return Err(EngineError::AccountFrozen {
                        account_id: account.id,
                    })
                }
                AccountStatus::Closed => {
                    return Err(EngineError::AccountClosed {
                        account_id: account.id,
                    })
                }
            }
        }

        let mut accounts: Vec<(Account, User)> = Vec::with_capacity(referenced.len());
        for (binding, account) in referenced {
            let owner = user_repository::fetch_user(&mut *conn, binding.user_id)
                .await?
                .ok_or(EngineError::UserNotFound {
                    user_id: binding.user_id,
                })?;
            accounts.push((account, owner));
        }

        // Rule 6: KYC gate over every non-admin party. A rejected party
        // refuses the operation; any party still in progress holds it.
        let mut parties = Vec::new();
        let mut initial_status = TransactionStatus::Completed;
        for (_, owner) in &accounts {
            parties.push(PartyKyc {
                user_id: owner.id,
                kyc_status: owner.kyc_status,
            });
            if owner.is_admin {
                continue;
            }
            if owner.kyc_status.is_rejected() {
                return Err(EngineError::KycRejected { user_id: owner.id });
            }
            if owner.kyc_status.is_in_progress() {
                initial_status = TransactionStatus::Pending;
            }
        }

        // Rule 7: sufficient funds on the debit side. The treasury is exempt
        // only for an admin funding operation, bounded by the optional
        // ceiling.
        if let Some(source) = request.source {
            let reserve_exempt = request.operation == OperationKind::AdminFund
                && actor.is_admin
                && accounts
                    .iter()
                    .any(|(a, _)| a.id == source.account_id && a.is_admin_account);

            if reserve_exempt {
                if let Some(ceiling) = self.reserve_ceiling {
                    if request.amount > ceiling {
                        return Err(EngineError::AmountExceedsCeiling {
                            amount: request.amount,
                            ceiling,
                        });
                    }
                }
            } else if needs_funds_check(request.operation) {
                let available =
                    ledger_repository::posted_balance(&mut *conn, source.user_id).await?;
                if available < request.amount {
                    return Err(EngineError::InsufficientFunds {
                        requested: request.amount,
                        available,
                    });
                }
            }
        }

        // Rule 8: advisory compliance hook; may only downgrade.
        let reason = match self.compliance.review(request).await {
            ComplianceVerdict::Pass => admission_reason(initial_status),
            ComplianceVerdict::Block { reason } => {
                initial_status = TransactionStatus::Blocked;
                reason
            }
        };

        Ok(Admission {
            initial_status,
            reason,
            parties,
        })
    }
}

impl Default for TransactionGate {
    fn default() -> Self {
        Self::new()
    }
}

fn needs_funds_check(operation: OperationKind) -> bool {
    matches!(
        operation,
        OperationKind::Withdrawal | OperationKind::Transfer | OperationKind::AdminFund
    )
}

fn admission_reason(status: TransactionStatus) -> String {
    match status {
        TransactionStatus::Pending => "held pending KYC approval".to_string(),
        _ => "admitted".to_string(),
    }
}
