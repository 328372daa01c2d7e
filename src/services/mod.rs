pub mod admin_service;
pub mod audit_service;
pub mod balance_service;
pub mod fund_engine;
pub mod invariant_service;
pub mod ledger_service;
pub mod provisioning_service;
pub mod reconciliation_service;
pub mod transaction_gate;

pub use admin_service::AdminService;
pub use audit_service::{AuditService, NewAuditEntry};
pub use balance_service::{
    balances_match, BalanceService, FundSummary, SystemTotals, TransactionBreakdown,
    BALANCE_TOLERANCE,
};
pub use fund_engine::{AdminFundOutcome, FundEngine, ReversalOutcome, TransferOutcome};
pub use invariant_service::{InvariantReport, InvariantService, RepairSummary};
pub use ledger_service::{LedgerService, PairSpec};
pub use provisioning_service::{
    hash_password, verify_password, CreateUserRequest, ProvisioningService, RESERVE_SEED_AMOUNT,
};
pub use reconciliation_service::{ReconciliationReport, ReconciliationService};
pub use transaction_gate::{
    AccountBinding, Admission, AdmissionRequest, CompliancePredicate, ComplianceVerdict,
    OperationKind, PassAll, TransactionGate,
};
