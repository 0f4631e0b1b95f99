//! Member-code reconciliation
//!
//! Recomputes every member's canonical `LCH-SSSS-O` code and propagates it:
//!
//! 1. **Normalize**: derive each member's code from serial/order (or a legacy
//!    `LCH<digits>` code), persist it when it changed, and sync the copies on
//!    the member's offerings and tickets.
//! 2. **Link family heads**: set `head_of_family` for every member of a family
//!    to the code of the family's order-1 member.
//! 3. **Fix orphaned copies**: rewrite offering/ticket codes still in the
//!    `LCH<digits>` shape to `LCH-SSSS-1`.
//!
//! All passes share one transaction. A storage error rolls back everything,
//! and a dry run rolls back on purpose.

mod passes;
mod status;

use std::time::Instant;

use lch_common::db::CodeCopyTable;
use lch_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::activity::{record_activity, ActivityEntry};
use crate::claims::SuperadminGrant;

pub use passes::{plan_member_code, CodePlan};
pub use status::{member_code_status, MemberCodeStatus};

/// Why a member was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Serial or order missing and the stored code is not `LCH<digits>`
    NoSerialOrLegacyCode,
}

/// Result of normalizing one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    /// Code rewritten; copies re-synced
    Updated { previous_code: String, code: String },
    /// Code already canonical; copies re-synced
    Synced { code: String },
    /// Nothing written for this member
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Run every pass, then roll back
    pub dry_run: bool,
}

/// A member whose code changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChange {
    pub member_id: String,
    pub previous_code: String,
    pub code: String,
}

/// A member that could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMember {
    pub member_id: String,
    pub member_code: String,
    pub reason: SkipReason,
}

/// Summary returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Members whose code was rewritten
    pub updated_members: u64,
    /// Ticket rows fixed by the orphan pass
    pub fixed_tickets: u64,
    /// Offering rows fixed by the orphan pass
    pub fixed_offerings: u64,
    /// Members already canonical (copies re-synced)
    pub synced_members: u64,
    /// Offering rows written while syncing member copies
    pub synced_offering_rows: u64,
    /// Ticket rows written while syncing member copies
    pub synced_ticket_rows: u64,
    /// Families with an order-1 member
    pub families_linked: u64,
    /// Member rows whose head_of_family value changed
    pub head_links_updated: u64,
    /// Serials with more than one order-1 member
    pub conflicting_heads: Vec<i64>,
    pub changes: Vec<CodeChange>,
    pub skipped: Vec<SkippedMember>,
    pub dry_run: bool,
}

impl ReconcileReport {
    fn record_member(&mut self, member_id: &str, member_code: &str, outcome: MemberOutcome) {
        match outcome {
            MemberOutcome::Updated {
                previous_code,
                code,
            } => {
                self.updated_members += 1;
                self.changes.push(CodeChange {
                    member_id: member_id.to_string(),
                    previous_code,
                    code,
                });
            }
            MemberOutcome::Synced { .. } => self.synced_members += 1,
            MemberOutcome::Skipped { reason } => self.skipped.push(SkippedMember {
                member_id: member_id.to_string(),
                member_code: member_code.to_string(),
                reason,
            }),
        }
    }

    fn record_orphan_fix(&mut self, table: CodeCopyTable, fixed: u64) {
        match table {
            CodeCopyTable::Offerings => self.fixed_offerings += fixed,
            CodeCopyTable::Tickets => self.fixed_tickets += fixed,
        }
    }

    /// One-line summary for logs and the activity log
    pub fn summary(&self) -> String {
        format!(
            "updated {} member codes, fixed {} offerings and {} tickets, skipped {} members",
            self.updated_members,
            self.fixed_offerings,
            self.fixed_tickets,
            self.skipped.len()
        )
    }
}

/// Runs reconciliation against one database
pub struct Reconciler {
    db: SqlitePool,
}

impl Reconciler {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Reconcile every member, offering and ticket
    ///
    /// Requires a [`SuperadminGrant`]; nothing is read or written before the
    /// caller has one.
    pub async fn run(
        &self,
        grant: &SuperadminGrant,
        options: ReconcileOptions,
    ) -> Result<ReconcileReport> {
        let started = Instant::now();
        let mut report = ReconcileReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        let mut tx = self.db.begin().await?;

        let members = passes::load_members(&mut tx).await?;
        info!(
            "Reconciling member codes for {} members (requested by {})",
            members.len(),
            grant.claims().username
        );

        for member in &members {
            let normalized = passes::normalize_member(&mut tx, member).await?;
            match &normalized.outcome {
                MemberOutcome::Updated {
                    previous_code,
                    code,
                } => debug!("Updating {} -> {} (member {})", previous_code, code, member.id),
                MemberOutcome::Skipped { reason } => warn!(
                    "Could not derive serial/order for member {} (code {:?}): {:?}",
                    member.id, member.member_code, reason
                ),
                MemberOutcome::Synced { .. } => {}
            }
            report.synced_offering_rows += normalized.offering_rows;
            report.synced_ticket_rows += normalized.ticket_rows;
            report.record_member(&member.id, &member.member_code, normalized.outcome);
        }

        info!("Syncing head_of_family references");
        let families = passes::link_family_heads(&mut tx).await?;
        report.families_linked = families.families_linked;
        report.head_links_updated = families.rows_updated;
        report.conflicting_heads = families.conflicting_serials;
        for serial in &report.conflicting_heads {
            warn!("Family serial {} has more than one order-1 member", serial);
        }

        info!("Fixing remaining legacy codes on offerings and tickets");
        for table in CodeCopyTable::ALL {
            let fixed = passes::fix_orphan_codes(&mut tx, table).await?;
            report.record_orphan_fix(table, fixed);
        }

        if options.dry_run {
            tx.rollback().await?;
            info!(
                "Dry run finished in {} ms, rolled back: {}",
                started.elapsed().as_millis(),
                report.summary()
            );
            return Ok(report);
        }

        record_activity(
            &mut tx,
            &ActivityEntry {
                admin: grant.claims(),
                module: "Maintenance",
                action: "Reformat Member Codes",
                target_id: None,
                details: report.summary(),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            "Member code reconciliation finished in {} ms: {}",
            started.elapsed().as_millis(),
            report.summary()
        );

        Ok(report)
    }
}
