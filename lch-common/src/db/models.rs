//! Database models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Literal stored in `admin_users.is_superadmin` for superadmins
pub const SUPERADMIN_FLAG: &str = "yes";

/// Member row, restricted to the identity columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub member_code: String,
    pub name: String,
    pub member_serial_num: Option<i64>,
    pub member_order: Option<i64>,
    pub head_of_family: Option<String>,
}

impl Member {
    /// Serial number, treating NULL and non-positive values as absent
    pub fn serial(&self) -> Option<i64> {
        self.member_serial_num.filter(|serial| *serial > 0)
    }

    /// Order within the family, treating NULL and non-positive values as absent
    pub fn order(&self) -> Option<i64> {
        self.member_order.filter(|order| *order > 0)
    }
}

/// Admin user row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdminUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: String,
    pub is_superadmin: String,
    pub status: String,
}

/// Row of a table that carries a denormalized member code
/// (offerings, tickets)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MemberCodeRef {
    pub id: String,
    pub member_id: Option<String>,
    pub member_code: Option<String>,
}

/// Tables holding a denormalized copy of a member's code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeCopyTable {
    Offerings,
    Tickets,
}

impl CodeCopyTable {
    pub const ALL: [CodeCopyTable; 2] = [CodeCopyTable::Offerings, CodeCopyTable::Tickets];

    pub fn table_name(&self) -> &'static str {
        match self {
            CodeCopyTable::Offerings => "offerings",
            CodeCopyTable::Tickets => "tickets",
        }
    }
}
