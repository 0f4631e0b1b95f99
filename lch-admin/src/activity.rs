//! Activity log writes
//!
//! Admin actions are recorded in `activity_logs`. The write runs on the
//! caller's connection so it commits or rolls back together with the action.

use lch_common::Result;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::claims::AdminClaims;

/// One activity log row
#[derive(Debug, Clone)]
pub struct ActivityEntry<'a> {
    pub admin: &'a AdminClaims,
    pub module: &'a str,
    pub action: &'a str,
    pub target_id: Option<&'a str>,
    pub details: String,
}

/// Insert an activity log row, returning its id
pub async fn record_activity(
    conn: &mut SqliteConnection,
    entry: &ActivityEntry<'_>,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO activity_logs (id, admin_id, admin_name, module, action, target_id, details)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&entry.admin.admin_id)
    .bind(entry.admin.display_name())
    .bind(entry.module)
    .bind(entry.action)
    .bind(entry.target_id)
    .bind(&entry.details)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}
