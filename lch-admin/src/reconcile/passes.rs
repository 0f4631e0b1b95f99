//! The three reconciliation passes
//!
//! Every function here runs on the caller's connection (a transaction in
//! practice) and never commits.

use std::collections::{BTreeMap, BTreeSet};

use lch_common::db::{CodeCopyTable, Member, MemberCodeRef};
use lch_common::{MemberCode, Result};
use sqlx::SqliteConnection;

use super::{MemberOutcome, SkipReason};

/// What normalization should do with one member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePlan {
    /// Stored code already matches
    Keep(MemberCode),
    /// Stored code must be replaced (serial/order persisted too)
    Rewrite(MemberCode),
    Skip(SkipReason),
}

/// Decide the canonical code for `member` without touching the database
///
/// Serial and order come from the row when both are present. Otherwise the
/// serial is recovered from a legacy `LCH<digits>` code and the member is
/// assumed to head its family.
pub fn plan_member_code(member: &Member) -> CodePlan {
    let code = match (member.serial(), member.order()) {
        (Some(serial), Some(order)) => MemberCode::new(serial, order),
        _ => match MemberCode::from_legacy(&member.member_code) {
            Some(recovered) => recovered,
            None => return CodePlan::Skip(SkipReason::NoSerialOrLegacyCode),
        },
    };

    if code.to_string() == member.member_code {
        CodePlan::Keep(code)
    } else {
        CodePlan::Rewrite(code)
    }
}

/// Outcome of pass 1 for one member, with the copy rows it wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Normalized {
    pub outcome: MemberOutcome,
    pub offering_rows: u64,
    pub ticket_rows: u64,
}

pub(super) async fn load_members(conn: &mut SqliteConnection) -> Result<Vec<Member>> {
    let members = sqlx::query_as::<_, Member>(
        "SELECT id, member_code, name, member_serial_num, member_order, head_of_family
         FROM members ORDER BY created_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(members)
}

/// Pass 1 for a single member
pub(super) async fn normalize_member(
    conn: &mut SqliteConnection,
    member: &Member,
) -> Result<Normalized> {
    let (code, rewrite) = match plan_member_code(member) {
        CodePlan::Skip(reason) => {
            return Ok(Normalized {
                outcome: MemberOutcome::Skipped { reason },
                offering_rows: 0,
                ticket_rows: 0,
            })
        }
        CodePlan::Keep(code) => (code, false),
        CodePlan::Rewrite(code) => (code, true),
    };
    let rendered = code.to_string();

    if rewrite {
        sqlx::query(
            "UPDATE members
             SET member_code = ?, member_serial_num = ?, member_order = ?,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(&rendered)
        .bind(code.serial)
        .bind(code.order)
        .bind(&member.id)
        .execute(&mut *conn)
        .await?;
    }

    // Copies are rewritten even when the member row was already canonical
    let offering_rows = sync_copies(conn, CodeCopyTable::Offerings, &member.id, &rendered).await?;
    let ticket_rows = sync_copies(conn, CodeCopyTable::Tickets, &member.id, &rendered).await?;

    let outcome = if rewrite {
        MemberOutcome::Updated {
            previous_code: member.member_code.clone(),
            code: rendered,
        }
    } else {
        MemberOutcome::Synced { code: rendered }
    };

    Ok(Normalized {
        outcome,
        offering_rows,
        ticket_rows,
    })
}

async fn sync_copies(
    conn: &mut SqliteConnection,
    table: CodeCopyTable,
    member_id: &str,
    code: &str,
) -> Result<u64> {
    let sql = format!(
        "UPDATE {} SET member_code = ? WHERE member_id = ?",
        table.table_name()
    );
    let result = sqlx::query(&sql)
        .bind(code)
        .bind(member_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Totals of pass 2
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct FamilyLinks {
    pub families_linked: u64,
    pub rows_updated: u64,
    pub conflicting_serials: Vec<i64>,
}

/// Pass 2: point every family member at the family head's code
///
/// Heads are read once, after pass 1, so recovered serials are included.
/// When a serial has several order-1 members the earliest created wins and
/// the serial is reported.
pub(super) async fn link_family_heads(conn: &mut SqliteConnection) -> Result<FamilyLinks> {
    let heads: Vec<(i64, String)> = sqlx::query_as(
        "SELECT member_serial_num, member_code FROM members
         WHERE member_order = 1 AND member_serial_num > 0
         ORDER BY member_serial_num, created_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let (head_codes, conflicting) = index_family_heads(heads);

    let mut links = FamilyLinks {
        conflicting_serials: conflicting.into_iter().collect(),
        ..Default::default()
    };

    for (serial, head_code) in &head_codes {
        let result = sqlx::query(
            "UPDATE members SET head_of_family = ?
             WHERE member_serial_num = ? AND head_of_family IS NOT ?",
        )
        .bind(head_code)
        .bind(serial)
        .bind(head_code)
        .execute(&mut *conn)
        .await?;

        links.families_linked += 1;
        links.rows_updated += result.rows_affected();
    }

    Ok(links)
}

/// Map serial → first head code; collect serials seen more than once
fn index_family_heads(heads: Vec<(i64, String)>) -> (BTreeMap<i64, String>, BTreeSet<i64>) {
    let mut head_codes = BTreeMap::new();
    let mut conflicting = BTreeSet::new();

    for (serial, code) in heads {
        if head_codes.contains_key(&serial) {
            conflicting.insert(serial);
        } else {
            head_codes.insert(serial, code);
        }
    }

    (head_codes, conflicting)
}

/// Pass 3: rewrite `LCH<digits>` copies to `LCH-SSSS-1`
///
/// Targets rows no live member re-synced in pass 1. The order is always 1
/// because the owning member is unknown.
pub(super) async fn fix_orphan_codes(
    conn: &mut SqliteConnection,
    table: CodeCopyTable,
) -> Result<u64> {
    let select = format!(
        "SELECT id, member_id, member_code FROM {} WHERE member_code LIKE 'LCH%'",
        table.table_name()
    );
    let rows: Vec<MemberCodeRef> = sqlx::query_as(&select).fetch_all(&mut *conn).await?;

    let update = format!("UPDATE {} SET member_code = ? WHERE id = ?", table.table_name());
    let mut fixed = 0;

    for row in rows {
        let Some(code) = row.member_code.as_deref().and_then(MemberCode::from_strict_legacy) else {
            continue;
        };

        sqlx::query(&update)
            .bind(code.to_string())
            .bind(&row.id)
            .execute(&mut *conn)
            .await?;
        fixed += 1;
    }

    Ok(fixed)
}
