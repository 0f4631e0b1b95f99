//! Read-only snapshot of member-code health

use lch_common::db::{CodeCopyTable, Member};
use lch_common::member_code::is_strict_legacy;
use lch_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use super::passes::{plan_member_code, CodePlan};

/// Counts shown before running a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCodeStatus {
    pub total_members: i64,
    /// Distinct positive serial numbers
    pub total_families: i64,
    pub members_with_head_of_family: i64,
    pub members_without_head_of_family: i64,
    /// Members a reconciliation would rewrite
    pub pending_member_updates: i64,
    /// Members a reconciliation would skip
    pub unrecoverable_members: i64,
    /// Offering rows still carrying `LCH<digits>`
    pub legacy_offering_codes: i64,
    /// Ticket rows still carrying `LCH<digits>`
    pub legacy_ticket_codes: i64,
}

/// Compute the current status without writing anything
pub async fn member_code_status(db: &SqlitePool) -> Result<MemberCodeStatus> {
    let members = sqlx::query_as::<_, Member>(
        "SELECT id, member_code, name, member_serial_num, member_order, head_of_family
         FROM members",
    )
    .fetch_all(db)
    .await?;

    let total_families: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT member_serial_num) FROM members WHERE member_serial_num > 0",
    )
    .fetch_one(db)
    .await?;

    let mut status = MemberCodeStatus {
        total_members: members.len() as i64,
        total_families,
        ..Default::default()
    };

    for member in &members {
        let has_head = member
            .head_of_family
            .as_deref()
            .is_some_and(|code| !code.trim().is_empty());
        if has_head {
            status.members_with_head_of_family += 1;
        } else {
            status.members_without_head_of_family += 1;
        }

        match plan_member_code(member) {
            CodePlan::Rewrite(_) => status.pending_member_updates += 1,
            CodePlan::Skip(_) => status.unrecoverable_members += 1,
            CodePlan::Keep(_) => {}
        }
    }

    status.legacy_offering_codes = count_legacy_copies(db, CodeCopyTable::Offerings).await?;
    status.legacy_ticket_codes = count_legacy_copies(db, CodeCopyTable::Tickets).await?;

    Ok(status)
}

async fn count_legacy_copies(db: &SqlitePool, table: CodeCopyTable) -> Result<i64> {
    let sql = format!(
        "SELECT member_code FROM {} WHERE member_code LIKE 'LCH%'",
        table.table_name()
    );
    let codes: Vec<String> = sqlx::query_scalar(&sql).fetch_all(db).await?;

    Ok(codes.iter().filter(|code| is_strict_legacy(code)).count() as i64)
}
