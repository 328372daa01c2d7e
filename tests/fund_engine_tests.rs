mod common;

use banking_core::error::ErrorCode;
use banking_core::models::{
    Direction, EntryStatus, EntryType, KycStatus, TransactionStatus, TransactionType,
    SYSTEM_USER_ID,
};
use banking_core::repositories::LedgerRepository;
use banking_core::services::{
    BalanceService, FundEngine, TransactionGate, RESERVE_SEED_AMOUNT,
};
use rust_decimal_macros::dec;
use std::time::Duration;

#[tokio::test]
async fn test_deposit_posts_balanced_pair() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "deposit@example.com").await;
    let engine = FundEngine::new(pool.clone());

    let record = engine
        .deposit(user.id, account.id, dec!(120.50), None)
        .await
        .unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.transaction_type, TransactionType::Deposit);
    assert_eq!(record.direction, Direction::Credit);
    assert_eq!(record.kyc_status_at_time, Some(KycStatus::Approved));

    let ledger = LedgerRepository::new(pool.clone());
    let entries = ledger.find_by_transaction(record.id).await.unwrap();
    assert_eq!(entries.len(), 2);

    let debit = entries.iter().find(|e| e.entry_type == EntryType::Debit).unwrap();
    let credit = entries.iter().find(|e| e.entry_type == EntryType::Credit).unwrap();
    assert_eq!(debit.user_id, SYSTEM_USER_ID);
    assert_eq!(credit.user_id, user.id);
    assert_eq!(debit.amount, dec!(120.50));
    assert_eq!(credit.amount, dec!(120.50));
    assert_eq!(debit.related_entry_id, Some(credit.id));
    assert_eq!(credit.related_entry_id, Some(debit.id));
    assert_eq!(debit.status, EntryStatus::Posted);
    assert_eq!(credit.status, EntryStatus::Posted);

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(user.id).await.unwrap(), dec!(120.50));
    assert_eq!(
        balances.user_balance(SYSTEM_USER_ID).await.unwrap(),
        RESERVE_SEED_AMOUNT - dec!(120.50)
    );
}

#[tokio::test]
async fn test_deposit_before_kyc_is_held() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_user(&pool, "held@example.com").await;
    let engine = FundEngine::new(pool.clone());

    let record = engine
        .deposit(user.id, account.id, dec!(50), None)
        .await
        .unwrap();
    assert_eq!(record.status, TransactionStatus::Pending);
    assert_eq!(record.kyc_status_at_time, Some(KycStatus::NotStarted));

    // No posted ledger entries; the amount is held, not available.
    let ledger = LedgerRepository::new(pool.clone());
    assert!(ledger.find_by_transaction(record.id).await.unwrap().is_empty());

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(user.id).await.unwrap(), dec!(0.00));
    assert_eq!(balances.held_funds(user.id).await.unwrap(), dec!(50.00));

    let summary = balances.fund_summary(user.id).await.unwrap();
    assert_eq!(summary.available, dec!(0.00));
    assert_eq!(summary.held, dec!(50.00));
    assert_eq!(summary.total, dec!(50.00));
    assert_eq!(summary.pending_count, 1);
    assert_eq!(summary.blocked_count, 0);
}

#[tokio::test]
async fn test_withdrawal_debits_user() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "withdraw@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine
        .deposit(user.id, account.id, dec!(100), None)
        .await
        .unwrap();
    let record = engine
        .withdraw(user.id, account.id, dec!(40), None)
        .await
        .unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.direction, Direction::Debit);

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(user.id).await.unwrap(), dec!(60));

    // The system user received the matching credit.
    let ledger = LedgerRepository::new(pool.clone());
    let entries = ledger.find_by_transaction(record.id).await.unwrap();
    let credit = entries.iter().find(|e| e.entry_type == EntryType::Credit).unwrap();
    assert_eq!(credit.user_id, SYSTEM_USER_ID);
}

#[tokio::test]
async fn test_withdrawal_insufficient_funds() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "broke@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine
        .deposit(user.id, account.id, dec!(30), None)
        .await
        .unwrap();
    let err = engine
        .withdraw(user.id, account.id, dec!(50), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InsufficientFunds);

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(user.id).await.unwrap(), dec!(30));
}

#[tokio::test]
async fn test_transfer_moves_funds_between_users() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (sender, sender_account) = common::create_approved_user(&pool, "sender@example.com").await;
    let (recipient, _) = common::create_approved_user(&pool, "recipient@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine
        .deposit(sender.id, sender_account.id, dec!(100), None)
        .await
        .unwrap();

    let outcome = engine
        .transfer(sender.id, recipient.id, dec!(40), None)
        .await
        .unwrap();

    assert_eq!(outcome.debit_transaction.user_id, sender.id);
    assert_eq!(outcome.debit_transaction.direction, Direction::Debit);
    assert_eq!(outcome.credit_transaction.user_id, recipient.id);
    assert_eq!(outcome.credit_transaction.direction, Direction::Credit);
    assert_eq!(
        outcome.debit_transaction.transaction_type,
        TransactionType::FundTransfer
    );
    assert_eq!(outcome.debit_transaction.status, TransactionStatus::Completed);
    assert_eq!(outcome.credit_transaction.status, TransactionStatus::Completed);

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(sender.id).await.unwrap(), dec!(60));
    assert_eq!(balances.user_balance(recipient.id).await.unwrap(), dec!(40));

    // One balanced pair, attached to the debit-side transaction.
    let ledger = LedgerRepository::new(pool.clone());
    let entries = ledger
        .find_by_transaction(outcome.debit_transaction.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    let debit = entries.iter().find(|e| e.entry_type == EntryType::Debit).unwrap();
    let credit = entries.iter().find(|e| e.entry_type == EntryType::Credit).unwrap();
    assert_eq!(debit.user_id, sender.id);
    assert_eq!(credit.user_id, recipient.id);
    assert_eq!(credit.source_user_id, Some(sender.id));
}

#[tokio::test]
async fn test_transfer_insufficient_funds_leaves_no_trace() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (sender, sender_account) = common::create_approved_user(&pool, "poor@example.com").await;
    let (recipient, _) = common::create_approved_user(&pool, "rich@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine
        .deposit(sender.id, sender_account.id, dec!(30), None)
        .await
        .unwrap();

    let before = common::ledger_entry_count(&pool).await;
    let err = engine
        .transfer(sender.id, recipient.id, dec!(50), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InsufficientFunds);

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(sender.id).await.unwrap(), dec!(30));
    assert_eq!(balances.user_balance(recipient.id).await.unwrap(), dec!(0));
    assert_eq!(common::ledger_entry_count(&pool).await, before);
}

#[tokio::test]
async fn test_transfer_held_when_recipient_kyc_pending() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (sender, sender_account) = common::create_approved_user(&pool, "kyc-ok@example.com").await;
    let (recipient, _) = common::create_user(&pool, "kyc-pending@example.com").await;
    common::set_kyc(&pool, recipient.id, "pending").await;

    let engine = FundEngine::new(pool.clone());
    engine
        .deposit(sender.id, sender_account.id, dec!(100), None)
        .await
        .unwrap();

    let outcome = engine
        .transfer(sender.id, recipient.id, dec!(25), None)
        .await
        .unwrap();
    assert_eq!(outcome.debit_transaction.status, TransactionStatus::Pending);
    assert_eq!(outcome.credit_transaction.status, TransactionStatus::Pending);

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(sender.id).await.unwrap(), dec!(100));
    assert_eq!(balances.user_balance(recipient.id).await.unwrap(), dec!(0));
}

#[tokio::test]
async fn test_admin_fund_from_reserve() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "funded@example.com").await;
    let engine = FundEngine::new(pool.clone());

    let outcome = engine
        .admin_fund_from_reserve(
            SYSTEM_USER_ID,
            user.id,
            account.id,
            dec!(250.00),
            Some("welcome".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
    assert_eq!(outcome.transaction.amount, dec!(250.00));
    assert!(outcome.debit_entry_id.is_some());
    assert!(outcome.credit_entry_id.is_some());

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(user.id).await.unwrap(), dec!(250.00));
    assert_eq!(
        balances.user_balance(SYSTEM_USER_ID).await.unwrap(),
        RESERVE_SEED_AMOUNT - dec!(250.00)
    );

    // Exactly one 250 credit for the user, paired with one 250 debit for
    // the system user.
    let ledger = LedgerRepository::new(pool.clone());
    let entries = ledger
        .find_by_transaction(outcome.transaction.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    let debit = entries.iter().find(|e| e.entry_type == EntryType::Debit).unwrap();
    let credit = entries.iter().find(|e| e.entry_type == EntryType::Credit).unwrap();
    assert_eq!(debit.user_id, SYSTEM_USER_ID);
    assert_eq!(credit.user_id, user.id);
    assert_eq!(debit.amount, dec!(250.00));
    assert_eq!(credit.amount, dec!(250.00));

    // Audit entry committed with the operation.
    let (audit_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM audit_logs WHERE id = $1 AND action_type = 'fund'",
    )
    .bind(outcome.audit_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(audit_count, 1);
}

#[tokio::test]
async fn test_admin_fund_requires_admin() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "target@example.com").await;
    let (impostor, _) = common::create_approved_user(&pool, "impostor@example.com").await;
    let engine = FundEngine::new(pool.clone());

    let err = engine
        .admin_fund_from_reserve(impostor.id, user.id, account.id, dec!(10), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotAdmin);
}

#[tokio::test]
async fn test_admin_cannot_fund_self() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let reserve = common::reserve_account(&pool).await;
    let engine = FundEngine::new(pool.clone());

    let err = engine
        .admin_fund_from_reserve(SYSTEM_USER_ID, SYSTEM_USER_ID, reserve.id, dec!(10), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotAdmin);
}

#[tokio::test]
async fn test_admin_fund_respects_ceiling() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "ceiling@example.com").await;
    let gate = TransactionGate::new().with_reserve_ceiling(Some(dec!(100)));
    let engine = FundEngine::new(pool.clone()).with_gate(gate);

    let err = engine
        .admin_fund_from_reserve(SYSTEM_USER_ID, user.id, account.id, dec!(250), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AmountExceedsCeiling);
}

#[tokio::test]
async fn test_concurrent_withdrawals_cannot_both_pass() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "race@example.com").await;
    let engine = FundEngine::new(pool.clone());
    engine
        .deposit(user.id, account.id, dec!(100), None)
        .await
        .unwrap();

    let engine_a = FundEngine::new(pool.clone());
    let engine_b = FundEngine::new(pool.clone());
    let (a, b) = tokio::join!(
        engine_a.withdraw(user.id, account.id, dec!(80), None),
        engine_b.withdraw(user.id, account.id, dec!(80), None),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent withdrawal may pass");

    let failure = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert_eq!(failure.code(), ErrorCode::InsufficientFunds);

    let balances = BalanceService::new(pool.clone());
    assert_eq!(balances.user_balance(user.id).await.unwrap(), dec!(20));
}

#[tokio::test]
async fn test_operation_deadline_rolls_back() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "slow@example.com").await;
    let engine = FundEngine::new(pool.clone()).with_timeout(Duration::from_millis(0));

    let err = engine
        .deposit(user.id, account.id, dec!(10), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);

    // Nothing committed.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
