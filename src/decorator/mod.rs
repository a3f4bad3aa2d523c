//! Cache layers. Each type here implements [`crate::Cache`] over an inner
//! cache of the same contract and adds one behavior.

pub mod bytes;
pub mod codec;
pub mod compression;
pub mod loader;
pub mod logic_ttl;
pub mod missed_loader;
pub mod nil_cache;
pub mod observable;
pub mod singleflight;

pub use bytes::{BytesPassThrough, LogicTtlBytesAdapter};
pub use codec::CodecDecorator;
pub use compression::CompressionDecorator;
pub use loader::{loader, protection, singleflight_loader, LoaderFn, ProtectionFn};
pub use logic_ttl::{LogicTtlConfig, LogicTtlDecorator, LogicTtlValue};
pub use missed_loader::MissedLoaderDecorator;
pub use nil_cache::NilCacheDecorator;
pub use observable::ObservableDecorator;
pub use singleflight::SingleflightDecorator;
