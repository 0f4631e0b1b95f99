//! Caller identity and privilege checks
//!
//! Handlers and the CLI resolve the acting admin into [`AdminClaims`] and pass
//! them explicitly. Privileged operations take a [`SuperadminGrant`], which can
//! only be obtained through [`AdminClaims::require_superadmin`].

use lch_common::db::{AdminUser, SUPERADMIN_FLAG};
use lch_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;

/// Message returned when a non-superadmin attempts a superadmin action
pub const SUPERADMIN_REQUIRED: &str = "Only superadmins can perform this action";

/// Authorization claims of the acting admin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminClaims {
    pub admin_id: String,
    pub username: String,
    pub name: String,
    /// Raw flag from the admin record; only the literal "yes" grants superadmin
    pub is_superadmin: String,
}

impl AdminClaims {
    pub fn is_superadmin(&self) -> bool {
        self.is_superadmin == SUPERADMIN_FLAG
    }

    /// Name used in activity logs
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.username
        } else {
            &self.name
        }
    }

    /// Capability check performed before any superadmin operation
    pub fn require_superadmin(&self) -> Result<SuperadminGrant> {
        if self.is_superadmin() {
            Ok(SuperadminGrant {
                claims: self.clone(),
            })
        } else {
            Err(Error::Forbidden(SUPERADMIN_REQUIRED.to_string()))
        }
    }
}

impl From<AdminUser> for AdminClaims {
    fn from(user: AdminUser) -> Self {
        Self {
            admin_id: user.id,
            username: user.username,
            name: user.name,
            is_superadmin: user.is_superadmin,
        }
    }
}

/// Proof that the holder passed the superadmin check
#[derive(Debug, Clone)]
pub struct SuperadminGrant {
    claims: AdminClaims,
}

impl SuperadminGrant {
    pub fn claims(&self) -> &AdminClaims {
        &self.claims
    }
}

/// Load claims for an active admin by id
pub async fn load_by_id(db: &SqlitePool, admin_id: &str) -> Result<Option<AdminClaims>> {
    let user: Option<AdminUser> = sqlx::query_as(
        "SELECT id, username, name, role, is_superadmin, status
         FROM admin_users WHERE id = ? AND status = 'active'",
    )
    .bind(admin_id)
    .fetch_optional(db)
    .await?;

    Ok(user.map(AdminClaims::from))
}

/// Load claims for an active admin by username
pub async fn load_by_username(db: &SqlitePool, username: &str) -> Result<Option<AdminClaims>> {
    let user: Option<AdminUser> = sqlx::query_as(
        "SELECT id, username, name, role, is_superadmin, status
         FROM admin_users WHERE username = ? AND status = 'active'",
    )
    .bind(username)
    .fetch_optional(db)
    .await?;

    Ok(user.map(AdminClaims::from))
}
