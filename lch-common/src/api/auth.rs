//! Request signing with a shared secret
//!
//! Trusted peers (the web front end's server side, operator tooling) sign
//! every protected request:
//! - `timestamp`: Unix epoch milliseconds, at most 1000ms old and 1ms ahead
//! - `hash`: SHA-256 over the canonical JSON of the request fields with the
//!   hash replaced by 64 zeros, followed by the decimal shared secret
//!
//! The secret lives in `settings.api_shared_secret`. A secret of `0` turns
//! checking off.

use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;

/// Settings key holding the shared secret
pub const SHARED_SECRET_KEY: &str = "api_shared_secret";

/// Oldest accepted timestamp, relative to now
pub const MAX_PAST_MS: i64 = 1000;

/// Furthest accepted timestamp in the future (clock drift)
pub const MAX_FUTURE_MS: i64 = 1;

const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Signature validation failures
#[derive(Debug, Clone, Error)]
pub enum SignatureError {
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    #[error("Invalid hash")]
    InvalidHash { provided: String, calculated: String },

    #[error("Database error: {0}")]
    Database(String),
}

/// Current time in Unix epoch milliseconds
pub fn current_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Load the shared secret, generating one on first use
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, SignatureError> {
    let stored: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(SHARED_SECRET_KEY)
            .fetch_optional(db)
            .await
            .map_err(|e| SignatureError::Database(e.to_string()))?;

    match stored.flatten() {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|e| SignatureError::Database(format!("Invalid shared secret: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate and store a random non-zero shared secret
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, SignatureError> {
    let secret = {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen::<i64>();
            if candidate != 0 {
                break candidate;
            }
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| SignatureError::Database(e.to_string()))?;

    Ok(secret)
}

/// Check `timestamp` against the accepted window around now
///
/// # Examples
///
/// ```
/// use lch_common::api::auth::{current_millis, validate_timestamp};
///
/// let now = current_millis();
/// assert!(validate_timestamp(now - 500).is_ok());
/// assert!(validate_timestamp(now - 5000).is_err());
/// ```
pub fn validate_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = current_millis();
    let age = now - timestamp;

    if age > MAX_PAST_MS {
        return Err(SignatureError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", age, MAX_PAST_MS),
        });
    }

    if age < -MAX_FUTURE_MS {
        return Err(SignatureError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                -age, MAX_FUTURE_MS
            ),
        });
    }

    Ok(())
}

/// Compute the request hash for `fields` under `shared_secret`
///
/// # Examples
///
/// ```
/// use lch_common::api::auth::calculate_hash;
/// use serde_json::json;
///
/// let fields = json!({ "dry_run": true, "timestamp": 1730000000000i64, "hash": "" });
/// let hash = calculate_hash(&fields, 42);
/// assert_eq!(hash.len(), 64);
/// ```
pub fn calculate_hash(fields: &Value, shared_secret: i64) -> String {
    let mut value = fields.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let mut hasher = Sha256::new();
    hasher.update(to_canonical_json(&value).as_bytes());
    hasher.update(shared_secret.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical JSON: object keys sorted, no whitespace
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(key, _)| *key);
            let body: Vec<String> = entries
                .into_iter()
                .map(|(key, v)| format!("{}:{}", Value::String(key.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(to_canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        // serde_json renders scalars without whitespace and with proper escaping
        other => other.to_string(),
    }
}

/// Compare a provided hash against the one computed for `fields`
pub fn validate_hash(
    provided_hash: &str,
    fields: &Value,
    shared_secret: i64,
) -> Result<(), SignatureError> {
    let calculated = calculate_hash(fields, shared_secret);

    if !provided_hash.eq_ignore_ascii_case(&calculated) {
        return Err(SignatureError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}
