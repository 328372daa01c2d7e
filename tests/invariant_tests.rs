mod common;

use banking_core::models::SYSTEM_USER_ID;
use banking_core::services::{FundEngine, InvariantService};
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_sweep_is_clean_after_normal_operations() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (a, a_account) = common::create_approved_user(&pool, "inv-a@example.com").await;
    let (b, b_account) = common::create_approved_user(&pool, "inv-b@example.com").await;
    let (c, c_account) = common::create_user(&pool, "inv-c@example.com").await;

    let engine = FundEngine::new(pool.clone());
    engine.deposit(a.id, a_account.id, dec!(400), None).await.unwrap();
    engine.transfer(a.id, b.id, dec!(150), None).await.unwrap();
    engine.withdraw(a.id, a_account.id, dec!(50), None).await.unwrap();
    engine.deposit(c.id, c_account.id, dec!(25), None).await.unwrap(); // held
    engine
        .admin_fund_from_reserve(SYSTEM_USER_ID, b.id, b_account.id, dec!(10), None)
        .await
        .unwrap();

    let invariants = InvariantService::new(pool.clone());
    let report = invariants.verify().await.unwrap();
    assert!(report.is_clean(), "unexpected violations: {:?}", report);
}

#[tokio::test]
async fn test_orphaned_user_detected_and_repaired() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (orphan_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (email, full_name, hashed_password)
        VALUES ('lost@example.com', 'Lost', 'x')
        RETURNING id
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    let invariants = InvariantService::new(pool.clone());
    let report = invariants.verify().await.unwrap();
    assert_eq!(report.orphaned_users, vec![orphan_id]);
    assert!(!report.is_clean());

    let summary = invariants.repair().await.unwrap();
    assert_eq!(summary.accounts_created.len(), 1);

    // The repair is audited as a system-user action.
    let (audits,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM audit_logs WHERE user_id = $1 AND action_type = 'create_user'",
    )
    .bind(orphan_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(audits, 1);

    let report = invariants.verify().await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_ledger_balance_law_holds_per_transaction() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (a, a_account) = common::create_approved_user(&pool, "law-a@example.com").await;
    let (b, b_account) = common::create_approved_user(&pool, "law-b@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine.deposit(a.id, a_account.id, dec!(120), None).await.unwrap();
    engine.transfer(a.id, b.id, dec!(45), None).await.unwrap();
    engine.withdraw(b.id, b_account.id, dec!(20), None).await.unwrap();

    // Outside the seed injection, every transaction's posted credits equal
    // its posted debits.
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT l.transaction_id
        FROM ledger_entries l
        JOIN transactions t ON t.id = l.transaction_id
        WHERE l.status = 'posted' AND t.transaction_type <> 'system_seed'
        GROUP BY l.transaction_id
        HAVING SUM(CASE WHEN l.entry_type = 'credit' THEN l.amount ELSE -l.amount END) <> 0
        "#,
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert!(rows.is_empty(), "imbalanced transactions: {:?}", rows);
}

#[tokio::test]
async fn test_no_completed_transaction_without_approved_kyc() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (a, a_account) = common::create_approved_user(&pool, "kyc-prop-a@example.com").await;
    let (c, c_account) = common::create_user(&pool, "kyc-prop-c@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine.deposit(a.id, a_account.id, dec!(60), None).await.unwrap();
    engine.deposit(c.id, c_account.id, dec!(60), None).await.unwrap(); // held

    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM transactions
        WHERE status = 'completed'
          AND transaction_type <> 'system_seed'
          AND (kyc_status_at_time IS NULL OR kyc_status_at_time <> 'approved')
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_no_transaction_on_foreign_non_admin_account() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (a, a_account) = common::create_approved_user(&pool, "own-a@example.com").await;
    let (b, _) = common::create_approved_user(&pool, "own-b@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine.deposit(a.id, a_account.id, dec!(90), None).await.unwrap();
    engine.transfer(a.id, b.id, dec!(30), None).await.unwrap();

    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM transactions t
        JOIN accounts acc ON acc.id = t.account_id
        WHERE acc.is_admin_account = FALSE AND acc.owner_id <> t.user_id
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_non_pending_entries_have_closed_pairs() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (a, a_account) = common::create_approved_user(&pool, "pair-a@example.com").await;
    let engine = FundEngine::new(pool.clone());
    engine.deposit(a.id, a_account.id, dec!(15), None).await.unwrap();

    let invariants = InvariantService::new(pool.clone());
    let report = invariants.verify().await.unwrap();
    assert!(report.unpaired_entries.is_empty());
    assert!(report.imbalanced_transactions.is_empty());
}
