//! Serializable builder configuration and the crate's default TTLs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default logical lifetime of a value under logic TTL.
pub const DEFAULT_LOGIC_TTL: Duration = Duration::from_secs(10 * 60);
/// Default physical TTL of a value written back after a logic TTL refresh.
pub const DEFAULT_LOGIC_WRITE_BACK_TTL: Duration = Duration::from_secs(60 * 60);
/// Default physical TTL of a value loaded on a miss.
pub const DEFAULT_MISS_LOADER_WRITE_BACK_TTL: Duration = Duration::from_secs(60 * 60);
/// Default physical TTL of a protective default.
pub const DEFAULT_NIL_CACHE_WRITE_BACK_TTL: Duration = Duration::from_secs(60 * 60);
/// Default TTL used by the multi-tier write-back.
pub const DEFAULT_MULTI_WRITE_BACK_TTL: Duration = Duration::from_secs(60);

/// File/env friendly form of the builder's feature toggles and TTLs.
///
/// TTLs are signed milliseconds; `0` means never expire and negative values
/// are rejected when the configuration is applied.
///
/// # Example
///
/// ```
/// # use cache_stack::config::CacheConfig;
/// let config = CacheConfig::from_json(r#"{ "logic_expire": true, "logic_ttl_ms": 30000 }"#)?;
/// assert!(config.singleflight);
/// assert_eq!(config.logic_ttl_ms, 30_000);
/// # Ok::<(), cache_stack::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub singleflight: bool,
    pub logic_expire: bool,
    pub logic_ttl_ms: i64,
    pub logic_write_back_ttl_ms: i64,
    pub miss_loader_write_back_ttl_ms: i64,
    pub nil_cache_write_back_ttl_ms: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            singleflight: true,
            logic_expire: false,
            logic_ttl_ms: DEFAULT_LOGIC_TTL.as_millis() as i64,
            logic_write_back_ttl_ms: DEFAULT_LOGIC_WRITE_BACK_TTL.as_millis() as i64,
            miss_loader_write_back_ttl_ms: DEFAULT_MISS_LOADER_WRITE_BACK_TTL.as_millis() as i64,
            nil_cache_write_back_ttl_ms: DEFAULT_NIL_CACHE_WRITE_BACK_TTL.as_millis() as i64,
        }
    }
}

impl CacheConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::ConfigError(format!("invalid cache config: {}", e)))
    }
}

/// Convert a configured millisecond TTL, rejecting negatives.
pub(crate) fn ttl_from_millis(field: &str, ms: i64) -> Result<Duration> {
    u64::try_from(ms)
        .map(Duration::from_millis)
        .map_err(|_| Error::ConfigError(format!("{} require >= 0, but got: {}ms", field, ms)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.singleflight);
        assert!(!config.logic_expire);
        assert_eq!(config.logic_ttl_ms, 600_000);
        assert_eq!(config.logic_write_back_ttl_ms, 3_600_000);
        assert_eq!(config.miss_loader_write_back_ttl_ms, 3_600_000);
        assert_eq!(config.nil_cache_write_back_ttl_ms, 3_600_000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CacheConfig::from_json(r#"{"singleflight": false, "nil_cache_write_back_ttl_ms": 500}"#)
            .expect("Failed to parse config");
        assert!(!config.singleflight);
        assert_eq!(config.nil_cache_write_back_ttl_ms, 500);
        assert_eq!(config.logic_ttl_ms, 600_000);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = CacheConfig::from_json("{ not json").expect_err("malformed");
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_negative_ttl_rejected() {
        assert_eq!(
            ttl_from_millis("logic_ttl_ms", 0).expect("zero"),
            Duration::ZERO
        );
        let err = ttl_from_millis("logic_ttl_ms", -1).expect_err("negative");
        assert!(err.to_string().contains("logic_ttl_ms"));
    }
}
