//! # LCH Common Library
//!
//! Shared code for the LCH parish administration services including:
//! - Database initialization and row models
//! - Member-code formatting and legacy-code parsing
//! - API request signing and the response envelope
//! - Configuration loading

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod member_code;

pub use error::{Error, Result};
pub use member_code::MemberCode;
