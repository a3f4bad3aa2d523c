//! # cache-stack
//!
//! Composable, type-safe cache middleware over any key/value store.
//!
//! ## Features
//!
//! - **Store Agnostic:** One small [`Store`] trait; a dashmap-backed
//!   [`MemoryStore`] ships as the reference implementation
//! - **Byte Stage:** Codecs (JSON, postcard) and gzip compression compiled
//!   into a typed pipeline
//! - **Logical TTL:** Serve stale values while refreshing them inline
//! - **Request Coalescing:** Singleflight for reads and loaders
//! - **Penetration Guards:** Missed-loader and nil-cache decorators
//! - **Multi-Tier:** Ordered tiers with a fallback loader and write-back
//! - **Observable:** Every operation reported to pluggable metrics and logs
//!
//! ## Quick Start
//!
//! ```
//! use cache_stack::{Builder, Cache, Context, MemoryStore};
//! use cache_stack::codec::JsonCodec;
//! use cache_stack::decorator::loader;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cache_stack::Result<()> {
//! let users = Builder::<String>::new("users", Arc::new(MemoryStore::new()))
//!     .with_codec(JsonCodec)
//!     .with_logic_expire(true)
//!     .with_logic_ttl(Duration::from_secs(30))
//!     .with_miss_loader(loader(|_ctx, key: String| async move {
//!         Ok(format!("loaded {}", key))
//!     }))
//!     .build()?;
//!
//! let ctx = Context::background();
//! assert_eq!(users.get(&ctx, "alice").await?, "loaded alice");
//! # Ok(())
//! # }
//! ```
//!
//! Builders can also be driven from configuration:
//!
//! ```
//! use cache_stack::config::CacheConfig;
//! use cache_stack::{Builder, MemoryStore};
//! use std::sync::Arc;
//!
//! let config = CacheConfig::from_json(r#"{"singleflight": true, "logic_expire": false}"#)?;
//! let cache = Builder::<u64>::new("counters", Arc::new(MemoryStore::new()))
//!     .with_config(&config)
//!     .build()?;
//! # let _ = cache;
//! # Ok::<(), cache_stack::Error>(())
//! ```

#[macro_use]
extern crate log;

pub mod builder;
pub mod cache;
pub mod codec;
pub mod config;
pub mod context;
pub mod decorator;
pub mod error;
pub mod multi;
pub mod observability;
pub mod singleflight;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use builder::Builder;
pub use cache::{Cache, CacheValue, DynCache};
pub use context::Context;
pub use error::{Error, Result};
pub use multi::{MultiBuilder, MultiCache};
pub use store::Store;

#[cfg(feature = "inmemory")]
pub use store::MemoryStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
