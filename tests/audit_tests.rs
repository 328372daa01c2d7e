mod common;

use banking_core::error::ErrorCode;
use banking_core::models::{AccountStatus, AuditAction, KycStatus, SYSTEM_USER_ID};
use banking_core::repositories::{AuditFilter, AuditRepository};
use banking_core::services::{
    AdminService, AuditService, FundEngine, NewAuditEntry, ProvisioningService,
};
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_every_admin_fund_has_exactly_one_audit_entry() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "audited@example.com").await;
    let engine = FundEngine::new(pool.clone());

    engine
        .admin_fund_from_reserve(SYSTEM_USER_ID, user.id, account.id, dec!(75), None)
        .await
        .unwrap();

    let audits = AuditRepository::new(pool.clone());
    assert_eq!(
        audits
            .count_for(SYSTEM_USER_ID, user.id, AuditAction::Fund)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_audit_record_validates_admin_and_binding() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "subject@example.com").await;
    let (other, _) = common::create_approved_user(&pool, "other@example.com").await;

    // Non-admin author.
    let mut tx = pool.begin().await.unwrap();
    let err = AuditService::record(
        &mut tx,
        &NewAuditEntry::new(other.id, user.id, AuditAction::Freeze).with_account(account.id),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotAdmin);
    drop(tx);

    // Unknown subject.
    let mut tx = pool.begin().await.unwrap();
    let err = AuditService::record(
        &mut tx,
        &NewAuditEntry::new(SYSTEM_USER_ID, 999_999, AuditAction::ApproveKyc),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UserNotFound);
    drop(tx);

    // Account that does not belong to the subject.
    let mut tx = pool.begin().await.unwrap();
    let err = AuditService::record(
        &mut tx,
        &NewAuditEntry::new(SYSTEM_USER_ID, other.id, AuditAction::Freeze)
            .with_account(account.id),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::OwnershipViolation);
    drop(tx);
}

#[tokio::test]
async fn test_audit_listing_filters_and_ordering() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "history@example.com").await;
    let admin = AdminService::new(pool.clone());

    admin
        .freeze_account(SYSTEM_USER_ID, user.id, account.id, None)
        .await
        .unwrap();
    admin
        .unfreeze_account(SYSTEM_USER_ID, user.id, account.id, None)
        .await
        .unwrap();
    admin
        .approve_kyc(SYSTEM_USER_ID, user.id, None)
        .await
        .unwrap();

    let audits = AuditService::new(pool.clone());

    let all = audits
        .list(&AuditFilter {
            user_id: Some(user.id),
            ..AuditFilter::new()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    // Newest first.
    assert_eq!(all[0].action_type, AuditAction::ApproveKyc);
    assert_eq!(all[2].action_type, AuditAction::Freeze);

    let frozen_only = audits
        .list(&AuditFilter {
            user_id: Some(user.id),
            action_type: Some(AuditAction::Freeze),
            ..AuditFilter::new()
        })
        .await
        .unwrap();
    assert_eq!(frozen_only.len(), 1);

    let paged = audits
        .list(&AuditFilter {
            user_id: Some(user.id),
            limit: 1,
            skip: 1,
            ..AuditFilter::new()
        })
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].action_type, AuditAction::Unfreeze);
}

#[tokio::test]
async fn test_freeze_unfreeze_round_trip() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_approved_user(&pool, "freeze@example.com").await;
    let admin = AdminService::new(pool.clone());

    let (frozen, _) = admin
        .freeze_account(SYSTEM_USER_ID, user.id, account.id, Some("suspicious".to_string()))
        .await
        .unwrap();
    assert_eq!(frozen.status, AccountStatus::Frozen);

    let (active, _) = admin
        .unfreeze_account(SYSTEM_USER_ID, user.id, account.id, None)
        .await
        .unwrap();
    assert_eq!(active.status, AccountStatus::Active);
}

#[tokio::test]
async fn test_kyc_decision_unlocks_posting() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_user(&pool, "kyc-flow@example.com").await;
    let admin = AdminService::new(pool.clone());
    let engine = FundEngine::new(pool.clone());

    // Held before approval.
    let held = engine.deposit(user.id, account.id, dec!(10), None).await.unwrap();
    assert!(held.status.is_held());

    let (approved, _) = admin
        .approve_kyc(SYSTEM_USER_ID, user.id, None)
        .await
        .unwrap();
    assert_eq!(approved.kyc_status, KycStatus::Approved);
    assert!(approved.is_verified);

    let posted = engine.deposit(user.id, account.id, dec!(10), None).await.unwrap();
    assert!(!posted.status.is_held());
}

#[tokio::test]
async fn test_reject_kyc_blocks_user() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, account) = common::create_user(&pool, "kyc-reject@example.com").await;
    let admin = AdminService::new(pool.clone());
    let engine = FundEngine::new(pool.clone());

    let (rejected, _) = admin
        .reject_kyc(SYSTEM_USER_ID, user.id, Some("documents invalid".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.kyc_status, KycStatus::Rejected);

    let err = engine
        .deposit(user.id, account.id, dec!(10), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::KycRejected);
}

#[tokio::test]
async fn test_set_admin_and_password_reset_are_audited() {
    let _guard = common::lock_db().await;
    let pool = common::setup_test_db().await;
    common::reset_and_bootstrap(&pool).await;

    let (user, _) = common::create_approved_user(&pool, "promote@example.com").await;
    let admin = AdminService::new(pool.clone());

    let (promoted, _) = admin
        .set_admin(SYSTEM_USER_ID, user.id, true, None)
        .await
        .unwrap();
    assert!(promoted.is_admin);

    admin
        .reset_password(SYSTEM_USER_ID, user.id, "new-password", None)
        .await
        .unwrap();

    // The new password works; the old one does not.
    let provisioning = ProvisioningService::new(pool.clone());
    assert!(provisioning
        .authenticate("promote@example.com", "new-password")
        .await
        .unwrap()
        .is_some());
    assert!(provisioning
        .authenticate("promote@example.com", "test-password")
        .await
        .unwrap()
        .is_none());

    let audits = AuditRepository::new(pool.clone());
    assert_eq!(
        audits
            .count_for(SYSTEM_USER_ID, user.id, AuditAction::SetAdmin)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        audits
            .count_for(SYSTEM_USER_ID, user.id, AuditAction::ResetPassword)
            .await
            .unwrap(),
        1
    );

    // The audit trail never carries the password.
    let entries = audits
        .list(&AuditFilter {
            user_id: Some(user.id),
            action_type: Some(AuditAction::ResetPassword),
            ..AuditFilter::new()
        })
        .await
        .unwrap();
    let details = serde_json::to_string(&entries[0].details).unwrap();
    assert!(!details.contains("new-password"));
}
