//! Integration tests for member-code reconciliation
//!
//! Tests cover:
//! - Canonical `LCH-SSSS-O` codes derived from serial/order
//! - Recovery of legacy `LCH<digits>` codes
//! - Propagation to offerings and tickets
//! - Family head linking, including duplicate heads
//! - Orphaned legacy copies
//! - Skipped members, dry runs and the activity log

use lch_admin::claims::{AdminClaims, SuperadminGrant};
use lch_admin::reconcile::{
    member_code_status, ReconcileOptions, ReconcileReport, Reconciler, SkipReason,
};
use lch_common::db::init_memory_database;
use lch_common::member_code::is_canonical;
use lch_common::Error;
use sqlx::SqlitePool;

/// Test helper: superadmin grant for an admin that exists in the database
async fn superadmin(db: &SqlitePool) -> SuperadminGrant {
    sqlx::query(
        "INSERT INTO admin_users (id, username, name, is_superadmin)
         VALUES ('admin-1', 'root', 'Parish Office', 'yes')",
    )
    .execute(db)
    .await
    .unwrap();

    lch_admin::claims::load_by_id(db, "admin-1")
        .await
        .unwrap()
        .expect("admin should exist")
        .require_superadmin()
        .expect("admin should be superadmin")
}

/// Test helper: insert a member with an explicit creation time
async fn insert_member(
    db: &SqlitePool,
    id: &str,
    code: &str,
    serial: Option<i64>,
    order: Option<i64>,
    created_at: &str,
) {
    sqlx::query(
        "INSERT INTO members (id, member_code, name, member_serial_num, member_order, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(code)
    .bind(format!("Member {}", id))
    .bind(serial)
    .bind(order)
    .bind(created_at)
    .execute(db)
    .await
    .unwrap();
}

async fn insert_offering(db: &SqlitePool, id: &str, member_id: Option<&str>, code: &str) {
    sqlx::query("INSERT INTO offerings (id, member_id, member_code, amount) VALUES (?, ?, ?, 100)")
        .bind(id)
        .bind(member_id)
        .bind(code)
        .execute(db)
        .await
        .unwrap();
}

async fn insert_ticket(db: &SqlitePool, id: &str, member_id: Option<&str>, code: &str) {
    sqlx::query(
        "INSERT INTO tickets (id, member_id, member_code, subject)
         VALUES (?, ?, ?, 'Certificate')",
    )
    .bind(id)
    .bind(member_id)
    .bind(code)
    .execute(db)
    .await
    .unwrap();
}

async fn member_code(db: &SqlitePool, id: &str) -> String {
    sqlx::query_scalar("SELECT member_code FROM members WHERE id = ?")
        .bind(id)
        .fetch_one(db)
        .await
        .unwrap()
}

async fn head_of_family(db: &SqlitePool, id: &str) -> Option<String> {
    sqlx::query_scalar("SELECT head_of_family FROM members WHERE id = ?")
        .bind(id)
        .fetch_one(db)
        .await
        .unwrap()
}

async fn copy_code(db: &SqlitePool, table: &str, id: &str) -> Option<String> {
    sqlx::query_scalar(&format!("SELECT member_code FROM {} WHERE id = ?", table))
        .bind(id)
        .fetch_one(db)
        .await
        .unwrap()
}

async fn activity_count(db: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM activity_logs")
        .fetch_one(db)
        .await
        .unwrap()
}

async fn run(db: &SqlitePool, grant: &SuperadminGrant) -> ReconcileReport {
    Reconciler::new(db.clone())
        .run(grant, ReconcileOptions::default())
        .await
        .expect("reconciliation should succeed")
}

/// A small parish: two families, one legacy member, one unrecoverable member
async fn seed_parish(db: &SqlitePool) {
    insert_member(db, "m1", "LCH12", Some(12), Some(1), "2024-01-01 10:00:00").await;
    insert_member(db, "m2", "LCH12B", Some(12), Some(2), "2024-01-01 10:01:00").await;
    insert_member(db, "m3", "LCH-0003-1", Some(3), Some(1), "2024-01-01 10:02:00").await;
    insert_member(db, "m4", "LCH42", None, None, "2024-01-01 10:03:00").await;
    insert_member(db, "m5", "ABC123", None, None, "2024-01-01 10:04:00").await;

    insert_offering(db, "o1", Some("m2"), "LCH12B").await;
    insert_offering(db, "o2", Some("m4"), "LCH42").await;
    insert_offering(db, "o3", Some("deleted-member"), "lch7").await;
    insert_offering(db, "o4", Some("m5"), "ABC123").await;

    insert_ticket(db, "t1", Some("m1"), "LCH12").await;
    insert_ticket(db, "t2", None, "LCH0099").await;
}

#[tokio::test]
async fn test_codes_are_canonical_after_reconciliation() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let report = run(&db, &grant).await;

    assert_eq!(member_code(&db, "m1").await, "LCH-0012-1");
    assert_eq!(member_code(&db, "m2").await, "LCH-0012-2");
    assert_eq!(member_code(&db, "m3").await, "LCH-0003-1");
    assert_eq!(member_code(&db, "m4").await, "LCH-0042-1");

    // m1, m2 and m4 changed; m3 was already canonical
    assert_eq!(report.updated_members, 3);
    assert_eq!(report.synced_members, 1);
    for id in ["m1", "m2", "m3", "m4"] {
        assert!(is_canonical(&member_code(&db, id).await), "{} not canonical", id);
    }
}

#[tokio::test]
async fn test_second_run_updates_nothing() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let first = run(&db, &grant).await;
    assert!(first.updated_members > 0);

    let second = run(&db, &grant).await;
    assert_eq!(second.updated_members, 0);
    assert_eq!(second.fixed_offerings, 0);
    assert_eq!(second.fixed_tickets, 0);
    assert_eq!(second.head_links_updated, 0);
    assert!(second.changes.is_empty());
}

#[tokio::test]
async fn test_copies_follow_member_code() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let report = run(&db, &grant).await;

    assert_eq!(copy_code(&db, "offerings", "o1").await.as_deref(), Some("LCH-0012-2"));
    assert_eq!(copy_code(&db, "offerings", "o2").await.as_deref(), Some("LCH-0042-1"));
    assert_eq!(copy_code(&db, "tickets", "t1").await.as_deref(), Some("LCH-0012-1"));
    assert_eq!(report.synced_offering_rows, 2);
    assert_eq!(report.synced_ticket_rows, 1);
}

#[tokio::test]
async fn test_legacy_code_recovered_as_family_head() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    insert_member(&db, "m1", "LCH42", None, None, "2024-01-01 10:00:00").await;

    run(&db, &grant).await;

    let (serial, order): (Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT member_serial_num, member_order FROM members WHERE id = 'm1'")
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(serial, Some(42));
    assert_eq!(order, Some(1));
    assert_eq!(member_code(&db, "m1").await, "LCH-0042-1");

    // Recovered members head their own family in pass 2
    assert_eq!(head_of_family(&db, "m1").await.as_deref(), Some("LCH-0042-1"));
}

#[tokio::test]
async fn test_family_members_point_at_head() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let report = run(&db, &grant).await;

    assert_eq!(head_of_family(&db, "m1").await.as_deref(), Some("LCH-0012-1"));
    assert_eq!(head_of_family(&db, "m2").await.as_deref(), Some("LCH-0012-1"));
    assert_eq!(head_of_family(&db, "m3").await.as_deref(), Some("LCH-0003-1"));
    assert_eq!(head_of_family(&db, "m5").await, None);

    // Families 3, 12 and 42
    assert_eq!(report.families_linked, 3);
    assert_eq!(report.head_links_updated, 4);
    assert!(report.conflicting_heads.is_empty());
}

#[tokio::test]
async fn test_family_without_head_is_left_alone() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    insert_member(&db, "m1", "", Some(8), Some(2), "2024-01-01 10:00:00").await;
    sqlx::query("UPDATE members SET head_of_family = 'LCH-0008-1' WHERE id = 'm1'")
        .execute(&db)
        .await
        .unwrap();

    let report = run(&db, &grant).await;

    assert_eq!(member_code(&db, "m1").await, "LCH-0008-2");
    assert_eq!(head_of_family(&db, "m1").await.as_deref(), Some("LCH-0008-1"));
    assert_eq!(report.families_linked, 0);
}

#[tokio::test]
async fn test_duplicate_heads_first_created_wins() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    insert_member(&db, "late", "", Some(5), Some(1), "2024-03-01 09:00:00").await;
    insert_member(&db, "early", "", Some(5), Some(1), "2024-02-01 09:00:00").await;
    insert_member(&db, "child", "", Some(5), Some(2), "2024-04-01 09:00:00").await;

    let report = run(&db, &grant).await;

    assert_eq!(report.conflicting_heads, vec![5]);
    assert_eq!(report.families_linked, 1);
    for id in ["late", "early", "child"] {
        assert_eq!(head_of_family(&db, id).await.as_deref(), Some("LCH-0005-1"));
    }
}

#[tokio::test]
async fn test_orphaned_legacy_copies_are_fixed() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let report = run(&db, &grant).await;

    // o3 belongs to a deleted member; t2 has no member at all
    assert_eq!(copy_code(&db, "offerings", "o3").await.as_deref(), Some("LCH-0007-1"));
    assert_eq!(copy_code(&db, "tickets", "t2").await.as_deref(), Some("LCH-0099-1"));
    assert_eq!(report.fixed_offerings, 1);
    assert_eq!(report.fixed_tickets, 1);
}

#[tokio::test]
async fn test_orphan_pass_ignores_non_legacy_shapes() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    insert_offering(&db, "o1", None, "LCH-0004-2").await;
    insert_offering(&db, "o2", None, "LCH12B").await;
    insert_ticket(&db, "t1", None, "XLCH5").await;

    let report = run(&db, &grant).await;

    assert_eq!(report.fixed_offerings, 0);
    assert_eq!(report.fixed_tickets, 0);
    assert_eq!(copy_code(&db, "offerings", "o1").await.as_deref(), Some("LCH-0004-2"));
    assert_eq!(copy_code(&db, "offerings", "o2").await.as_deref(), Some("LCH12B"));
    assert_eq!(copy_code(&db, "tickets", "t1").await.as_deref(), Some("XLCH5"));
}

#[tokio::test]
async fn test_zero_serial_legacy_code_is_recovered() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    insert_member(&db, "m1", "LCH0", None, None, "2024-01-01 10:00:00").await;
    insert_offering(&db, "o1", None, "LCH0").await;

    let report = run(&db, &grant).await;

    assert_eq!(report.updated_members, 1);
    assert!(report.skipped.is_empty());
    assert_eq!(report.fixed_offerings, 1);
    assert_eq!(member_code(&db, "m1").await, "LCH-0000-1");
    assert_eq!(copy_code(&db, "offerings", "o1").await.as_deref(), Some("LCH-0000-1"));

    let second = run(&db, &grant).await;
    assert_eq!(second.updated_members, 0);
    assert_eq!(second.fixed_offerings, 0);
    assert_eq!(member_code(&db, "m1").await, "LCH-0000-1");
}

#[tokio::test]
async fn test_canonical_member_still_rewrites_stale_copies() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    insert_member(&db, "m3", "LCH-0003-1", Some(3), Some(1), "2024-01-01 10:00:00").await;
    insert_offering(&db, "o1", Some("m3"), "LCH3").await;
    insert_ticket(&db, "t1", Some("m3"), "LCH-3-1").await;

    let report = run(&db, &grant).await;

    assert_eq!(report.updated_members, 0);
    assert_eq!(report.synced_members, 1);
    assert_eq!(report.synced_offering_rows, 1);
    assert_eq!(report.synced_ticket_rows, 1);
    // Rewritten by pass 1, so the orphan pass has nothing left
    assert_eq!(report.fixed_offerings, 0);
    assert_eq!(copy_code(&db, "offerings", "o1").await.as_deref(), Some("LCH-0003-1"));
    assert_eq!(copy_code(&db, "tickets", "t1").await.as_deref(), Some("LCH-0003-1"));
}

#[tokio::test]
async fn test_failure_in_late_pass_rolls_back_everything() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    // Only the orphan pass writes this value (ticket t2)
    sqlx::query(
        "CREATE TRIGGER block_orphan_fix BEFORE UPDATE OF member_code ON tickets
         WHEN NEW.member_code = 'LCH-0099-1'
         BEGIN SELECT RAISE(ABORT, 'ticket locked'); END",
    )
    .execute(&db)
    .await
    .unwrap();

    let result = Reconciler::new(db.clone())
        .run(&grant, ReconcileOptions::default())
        .await;

    assert!(matches!(result, Err(Error::Database(_))), "got {:?}", result);
    assert_eq!(member_code(&db, "m1").await, "LCH12");
    assert_eq!(member_code(&db, "m4").await, "LCH42");
    assert_eq!(copy_code(&db, "offerings", "o1").await.as_deref(), Some("LCH12B"));
    assert_eq!(copy_code(&db, "tickets", "t1").await.as_deref(), Some("LCH12"));
    assert_eq!(head_of_family(&db, "m2").await, None);
    assert_eq!(activity_count(&db).await, 0);
}

#[tokio::test]
async fn test_unrecoverable_member_is_skipped() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let report = run(&db, &grant).await;

    assert_eq!(member_code(&db, "m5").await, "ABC123");
    assert_eq!(copy_code(&db, "offerings", "o4").await.as_deref(), Some("ABC123"));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].member_id, "m5");
    assert_eq!(report.skipped[0].member_code, "ABC123");
    assert_eq!(report.skipped[0].reason, SkipReason::NoSerialOrLegacyCode);
}

#[tokio::test]
async fn test_serial_wider_than_four_digits() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    insert_member(&db, "m1", "", Some(123456), Some(3), "2024-01-01 10:00:00").await;

    run(&db, &grant).await;

    assert_eq!(member_code(&db, "m1").await, "LCH-123456-3");
}

#[tokio::test]
async fn test_dry_run_rolls_back() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let report = Reconciler::new(db.clone())
        .run(&grant, ReconcileOptions { dry_run: true })
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.updated_members, 3);
    assert_eq!(report.fixed_offerings, 1);

    assert_eq!(member_code(&db, "m1").await, "LCH12");
    assert_eq!(member_code(&db, "m4").await, "LCH42");
    assert_eq!(copy_code(&db, "offerings", "o3").await.as_deref(), Some("lch7"));
    assert_eq!(head_of_family(&db, "m2").await, None);
    assert_eq!(activity_count(&db).await, 0);

    // The real run reports the same numbers
    let real = run(&db, &grant).await;
    assert_eq!(real.updated_members, report.updated_members);
    assert_eq!(real.fixed_offerings, report.fixed_offerings);
}

#[tokio::test]
async fn test_committed_run_is_logged() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let report = run(&db, &grant).await;

    let (admin_id, admin_name, module, action, details): (String, String, String, String, String) =
        sqlx::query_as("SELECT admin_id, admin_name, module, action, details FROM activity_logs")
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(admin_id, "admin-1");
    assert_eq!(admin_name, "Parish Office");
    assert_eq!(module, "Maintenance");
    assert_eq!(action, "Reformat Member Codes");
    assert_eq!(details, report.summary());
}

#[tokio::test]
async fn test_non_superadmin_gets_no_grant() {
    let claims = AdminClaims {
        admin_id: "admin-2".to_string(),
        username: "clerk".to_string(),
        name: "Clerk".to_string(),
        is_superadmin: "no".to_string(),
    };

    let err = claims.require_superadmin().unwrap_err();
    assert!(matches!(
        err,
        Error::Forbidden(msg) if msg == "Only superadmins can perform this action"
    ));
}

#[tokio::test]
async fn test_status_reflects_pending_work() {
    let db = init_memory_database().await.unwrap();
    let grant = superadmin(&db).await;
    seed_parish(&db).await;

    let before = member_code_status(&db).await.unwrap();
    assert_eq!(before.total_members, 5);
    assert_eq!(before.total_families, 2);
    assert_eq!(before.pending_member_updates, 3);
    assert_eq!(before.unrecoverable_members, 1);
    assert_eq!(before.members_without_head_of_family, 5);
    // o2 and o3 (lch7); t1 and t2
    assert_eq!(before.legacy_offering_codes, 2);
    assert_eq!(before.legacy_ticket_codes, 2);

    run(&db, &grant).await;

    let after = member_code_status(&db).await.unwrap();
    assert_eq!(after.total_families, 3);
    assert_eq!(after.pending_member_updates, 0);
    assert_eq!(after.unrecoverable_members, 1);
    assert_eq!(after.members_with_head_of_family, 4);
    assert_eq!(after.legacy_offering_codes, 0);
    assert_eq!(after.legacy_ticket_codes, 0);
}
