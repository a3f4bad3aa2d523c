//! Builder that compiles a declarative feature set into one cache.
//!
//! Configuration is recorded by chainable `with_*` setters; nothing is
//! assembled until [`Builder::build`]. Every configuration violation found
//! along the way is collected and reported together as
//! [`Error::InvalidConfig`].

use crate::cache::{BaseCache, CacheFactory, CacheValue, Decorator, DynCache};
use crate::codec::{Codec, CompressionCodec};
use crate::config::{
    ttl_from_millis, CacheConfig, DEFAULT_LOGIC_TTL, DEFAULT_LOGIC_WRITE_BACK_TTL,
    DEFAULT_MISS_LOADER_WRITE_BACK_TTL, DEFAULT_NIL_CACHE_WRITE_BACK_TTL,
};
use crate::decorator::bytes::is_bytes_type;
use crate::decorator::{
    singleflight_loader, BytesPassThrough, CodecDecorator, CompressionDecorator, LoaderFn,
    LogicTtlBytesAdapter, LogicTtlConfig, LogicTtlDecorator, LogicTtlValue,
    MissedLoaderDecorator, NilCacheDecorator, ObservableDecorator, ProtectionFn,
    SingleflightDecorator,
};
use crate::error::{Error, Result};
use crate::observability::{LogFacade, Logger, Metrics, NoOpMetrics, Observable};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::sync::Arc;
use std::time::Duration;

/// Byte-to-byte stage (compression, encryption, ...).
pub type ByteTransform =
    Box<dyn FnOnce(DynCache<Vec<u8>>, &Observable) -> Result<DynCache<Vec<u8>>> + Send>;

/// Terminal adapter from the byte stage to typed values.
pub type TypeAdapter<T> =
    Box<dyn FnOnce(DynCache<Vec<u8>>, &Observable) -> Result<DynCache<T>> + Send>;

/// Box a closure as a [`ByteTransform`].
pub fn byte_transform<F>(f: F) -> ByteTransform
where
    F: FnOnce(DynCache<Vec<u8>>, &Observable) -> Result<DynCache<Vec<u8>>> + Send + 'static,
{
    Box::new(f)
}

/// Box a closure as a [`TypeAdapter`].
pub fn type_adapter<T, F>(f: F) -> TypeAdapter<T>
where
    T: CacheValue,
    F: FnOnce(DynCache<Vec<u8>>, &Observable) -> Result<DynCache<T>> + Send + 'static,
{
    Box::new(f)
}

/// A codec captured for both wire shapes a compiled cache may need.
struct CodecPlan<T: CacheValue> {
    plain: TypeAdapter<T>,
    logic: TypeAdapter<LogicTtlValue<T>>,
}

struct LogicFeature<T: CacheValue> {
    enabled: bool,
    logic_ttl: Duration,
    write_back_ttl: Duration,
    loader: Option<LoaderFn<T>>,
    bytes_adapter: bool,
}

/// Fluent builder for a single cache.
///
/// Layers are always assembled in the same order, outermost first:
///
/// ```text
/// outer decorators → observable → extra decorators → singleflight
///   → nil cache → missed loader → staged cache → store
/// ```
///
/// # Example
///
/// ```
/// # use cache_stack::{Builder, Cache, Context, MemoryStore};
/// # use cache_stack::codec::JsonCodec;
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cache_stack::Result<()> {
/// let cache = Builder::<String>::new("greetings", Arc::new(MemoryStore::new()))
///     .with_codec(JsonCodec)
///     .build()?;
///
/// let ctx = Context::background();
/// cache.set(&ctx, "k", "hello".to_string(), Duration::from_secs(60)).await?;
/// assert_eq!(cache.get(&ctx, "k").await?, "hello");
/// # Ok(())
/// # }
/// ```
pub struct Builder<T: CacheValue> {
    name: String,
    store: Arc<dyn Store>,
    errors: Vec<Error>,

    singleflight: bool,
    codec: Option<CodecPlan<T>>,
    type_adapter: Option<TypeAdapter<T>>,
    byte_transforms: Vec<ByteTransform>,
    logic: LogicFeature<T>,

    miss_loader: Option<LoaderFn<T>>,
    miss_write_back_ttl: Duration,
    nil_protection: Option<ProtectionFn<T>>,
    nil_write_back_ttl: Duration,

    factory: Option<CacheFactory<T>>,
    decorators: Vec<Decorator<T>>,
    outer_decorators: Vec<Decorator<T>>,
    observe_decorator: Option<Decorator<T>>,

    metrics: Arc<dyn Metrics>,
    logger: Arc<dyn Logger>,
}

impl<T: CacheValue> Builder<T> {
    /// Start a builder for the cache `name` over `store`.
    ///
    /// An empty name is reported by [`Builder::build`].
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        let name = name.into();
        let mut errors = Vec::new();
        if name.is_empty() {
            errors.push(Error::ConfigError("cache name cannot be empty".to_string()));
        }

        Builder {
            name,
            store,
            errors,
            singleflight: true,
            codec: None,
            type_adapter: None,
            byte_transforms: Vec::new(),
            logic: LogicFeature {
                enabled: false,
                logic_ttl: DEFAULT_LOGIC_TTL,
                write_back_ttl: DEFAULT_LOGIC_WRITE_BACK_TTL,
                loader: None,
                bytes_adapter: false,
            },
            miss_loader: None,
            miss_write_back_ttl: DEFAULT_MISS_LOADER_WRITE_BACK_TTL,
            nil_protection: None,
            nil_write_back_ttl: DEFAULT_NIL_CACHE_WRITE_BACK_TTL,
            factory: None,
            decorators: Vec::new(),
            outer_decorators: Vec::new(),
            observe_decorator: None,
            metrics: Arc::new(NoOpMetrics),
            logger: Arc::new(LogFacade),
        }
    }

    /// Coalesce concurrent reads of one key. Enabled by default.
    pub fn with_singleflight(mut self, enable: bool) -> Self {
        self.singleflight = enable;
        self
    }

    /// Encode values with `codec` on their way to the store.
    pub fn with_codec<C>(mut self, codec: C) -> Self
    where
        T: Serialize + DeserializeOwned,
        C: Codec + Clone,
    {
        let logic_codec = codec.clone();
        self.codec = Some(CodecPlan {
            plain: type_adapter(move |next, _| {
                Ok(Arc::new(CodecDecorator::<T, C>::new(next, codec)) as DynCache<T>)
            }),
            logic: type_adapter(move |next, _| {
                Ok(Arc::new(CodecDecorator::<LogicTtlValue<T>, C>::new(next, logic_codec))
                    as DynCache<LogicTtlValue<T>>)
            }),
        });
        self
    }

    /// Append a compression stage to the byte pipeline.
    pub fn with_compression<C: CompressionCodec>(self, codec: C) -> Self {
        self.with_byte_transforms([byte_transform(move |next, _| {
            Ok(Arc::new(CompressionDecorator::new(next, codec)) as DynCache<Vec<u8>>)
        })])
    }

    /// Append byte stages. The first declared stage ends up closest to the
    /// store.
    pub fn with_byte_transforms(mut self, transforms: impl IntoIterator<Item = ByteTransform>) -> Self {
        self.byte_transforms.extend(transforms);
        self
    }

    /// Replace the codec as the adapter between bytes and `T`.
    pub fn with_type_adapter(mut self, adapter: TypeAdapter<T>) -> Self {
        self.type_adapter = Some(adapter);
        self
    }

    pub fn with_logic_expire(mut self, enable: bool) -> Self {
        self.logic.enabled = enable;
        self
    }

    /// Logical lifetime of written values. Enables logic expiry; zero
    /// means values never expire logically.
    pub fn with_logic_ttl(mut self, ttl: Duration) -> Self {
        self.logic.enabled = true;
        self.logic.logic_ttl = ttl;
        self
    }

    /// Physical TTL of a refreshed value. Enables logic expiry.
    pub fn with_logic_write_back_ttl(mut self, ttl: Duration) -> Self {
        self.logic.enabled = true;
        self.logic.write_back_ttl = ttl;
        self
    }

    /// Reload function for logically expired values. Enables logic expiry.
    pub fn with_logic_expire_loader(mut self, loader: LoaderFn<T>) -> Self {
        self.logic.enabled = true;
        self.logic.loader = Some(loader);
        self
    }

    /// Store `Vec<u8>` values under logic expiry without a codec, using the
    /// `[8-byte LE unix nanos][payload]` layout. Enabling it enables logic
    /// expiry.
    pub fn with_logic_expire_bytes_adapter(mut self, enable: bool) -> Self {
        self.logic.bytes_adapter = enable;
        if enable {
            self.logic.enabled = true;
        }
        self
    }

    /// Load missing keys from the source and write them back.
    pub fn with_miss_loader(mut self, loader: LoaderFn<T>) -> Self {
        self.miss_loader = Some(loader);
        self
    }

    /// Has no effect without [`Builder::with_miss_loader`].
    pub fn with_miss_loader_write_back_ttl(mut self, ttl: Duration) -> Self {
        self.miss_write_back_ttl = ttl;
        self
    }

    /// Answer missing keys with a protective default.
    pub fn with_nil_cache(mut self, protection: ProtectionFn<T>) -> Self {
        self.nil_protection = Some(protection);
        self
    }

    pub fn with_nil_cache_write_back_ttl(mut self, ttl: Duration) -> Self {
        self.nil_write_back_ttl = ttl;
        self
    }

    /// Use a custom plan for the innermost cache. Cannot be combined with
    /// codec, compression, type adapter or logic expiry.
    pub fn with_factory(mut self, factory: CacheFactory<T>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Extra decorators placed between singleflight and the observable
    /// layer. The first one is innermost.
    pub fn with_decorators(mut self, decorators: impl IntoIterator<Item = Decorator<T>>) -> Self {
        self.decorators.extend(decorators);
        self
    }

    /// Decorators placed outside the observable layer.
    pub fn with_outer_decorators(
        mut self,
        decorators: impl IntoIterator<Item = Decorator<T>>,
    ) -> Self {
        self.outer_decorators.extend(decorators);
        self
    }

    /// Replace the default observable layer.
    pub fn with_observe_decorator(mut self, decorator: Decorator<T>) -> Self {
        self.observe_decorator = Some(decorator);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Apply a serialized configuration, overwriting the toggles and TTLs
    /// it carries. Negative TTLs are recorded as configuration errors.
    pub fn with_config(mut self, config: &CacheConfig) -> Self {
        self.singleflight = config.singleflight;
        self.logic.enabled = config.logic_expire;

        let fields = [
            ("logic_ttl_ms", config.logic_ttl_ms),
            ("logic_write_back_ttl_ms", config.logic_write_back_ttl_ms),
            ("miss_loader_write_back_ttl_ms", config.miss_loader_write_back_ttl_ms),
            ("nil_cache_write_back_ttl_ms", config.nil_cache_write_back_ttl_ms),
        ];
        for (field, ms) in fields {
            let ttl = match ttl_from_millis(field, ms) {
                Ok(ttl) => ttl,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };
            match field {
                "logic_ttl_ms" => self.logic.logic_ttl = ttl,
                "logic_write_back_ttl_ms" => self.logic.write_back_ttl = ttl,
                "miss_loader_write_back_ttl_ms" => self.miss_write_back_ttl = ttl,
                _ => self.nil_write_back_ttl = ttl,
            }
        }
        self
    }

    fn has_staged_features(&self) -> bool {
        self.logic.enabled
            || self.codec.is_some()
            || self.type_adapter.is_some()
            || !self.byte_transforms.is_empty()
    }

    /// Compile the configured layers into one cache.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig`: every recorded configuration violation
    ///   (empty name, negative configured TTLs, custom factory combined
    ///   with staged features)
    /// - `Error::BuildFailed`: a layer could not be assembled, e.g. a byte
    ///   stage without an adapter for `T`
    pub fn build(mut self) -> Result<DynCache<T>> {
        if self.factory.is_some() && self.has_staged_features() {
            self.errors.push(Error::ConfigError(
                "with_factory cannot be combined with staged features \
                 (codec/logic-expire/compression/type-adapter)"
                    .to_string(),
            ));
        }
        if !self.errors.is_empty() {
            return Err(Error::InvalidConfig(self.errors));
        }

        let Builder {
            name,
            store,
            singleflight,
            codec,
            type_adapter,
            byte_transforms,
            logic,
            miss_loader,
            miss_write_back_ttl,
            nil_protection,
            nil_write_back_ttl,
            factory,
            decorators,
            outer_decorators,
            observe_decorator,
            metrics,
            logger,
            ..
        } = self;

        let failed = |e: Error| Error::BuildFailed {
            cache: name.clone(),
            source: Box::new(e),
        };
        let ob = Observable::new(metrics, logger);
        let store_name = store.name().to_string();

        let staged = StagedPlan {
            store,
            codec,
            type_adapter,
            byte_transforms,
        };
        let mut cache = match factory {
            Some(factory) => factory(Arc::clone(&staged.store), &ob),
            None if logic.enabled => staged.build_logic(logic, &ob),
            None => staged.build_plain(&ob),
        }
        .map_err(failed)?;

        if let Some(load) = miss_loader {
            cache = Arc::new(MissedLoaderDecorator::new(
                cache,
                singleflight_loader(load),
                miss_write_back_ttl,
                ob.clone(),
            ));
        }
        if let Some(protection) = nil_protection {
            cache = Arc::new(NilCacheDecorator::new(
                cache,
                protection,
                nil_write_back_ttl,
                ob.clone(),
            ));
        }
        if singleflight {
            cache = Arc::new(SingleflightDecorator::new(cache));
        }
        for decorate in decorators {
            cache = decorate(cache, &ob).map_err(failed)?;
        }
        cache = match observe_decorator {
            Some(decorate) => decorate(cache, &ob).map_err(failed)?,
            None => Arc::new(ObservableDecorator::new(cache, &name, store_name, ob.clone())),
        };
        for decorate in outer_decorators {
            cache = decorate(cache, &ob).map_err(failed)?;
        }

        debug!("✓ Built cache [{}]", name);
        Ok(cache)
    }
}

/// The staged part of a builder: byte pipeline plus terminal adapter.
struct StagedPlan<T: CacheValue> {
    store: Arc<dyn Store>,
    codec: Option<CodecPlan<T>>,
    type_adapter: Option<TypeAdapter<T>>,
    byte_transforms: Vec<ByteTransform>,
}

impl<T: CacheValue> StagedPlan<T> {
    fn requires_byte_path(&self) -> bool {
        !self.byte_transforms.is_empty() || self.codec.is_some() || self.type_adapter.is_some()
    }

    fn build_byte_cache(
        store: Arc<dyn Store>,
        transforms: Vec<ByteTransform>,
        ob: &Observable,
    ) -> Result<DynCache<Vec<u8>>> {
        let base: DynCache<Vec<u8>> = Arc::new(BaseCache::new(store));
        transforms
            .into_iter()
            .try_fold(base, |current, transform| transform(current, ob))
    }

    fn build_plain(self, ob: &Observable) -> Result<DynCache<T>> {
        if !self.requires_byte_path() {
            return Ok(Arc::new(BaseCache::<T>::new(self.store)));
        }
        let bytes = Self::build_byte_cache(self.store, self.byte_transforms, ob)?;

        if let Some(adapter) = self.type_adapter {
            return adapter(bytes, ob);
        }
        if let Some(codec) = self.codec {
            return (codec.plain)(bytes, ob);
        }
        if is_bytes_type::<T>() {
            return Ok(Arc::new(BytesPassThrough::<T>::new(bytes)?));
        }
        Err(Error::ConfigError(format!(
            "byte-stage enabled but no adapter configured for type {}: \
             configure with_codec or with_type_adapter",
            type_name::<T>()
        )))
    }

    fn build_logic_wire(self, bytes_adapter: bool, ob: &Observable) -> Result<DynCache<LogicTtlValue<T>>> {
        if !self.requires_byte_path() {
            return Ok(Arc::new(BaseCache::<LogicTtlValue<T>>::new(self.store)));
        }
        let bytes = Self::build_byte_cache(self.store, self.byte_transforms, ob)?;

        if let Some(codec) = self.codec {
            return (codec.logic)(bytes, ob);
        }
        if is_bytes_type::<T>() {
            if bytes_adapter {
                return Ok(Arc::new(LogicTtlBytesAdapter::<T>::new(bytes)?));
            }
            return Err(Error::ConfigError(
                "logic TTL bytes adapter supports Vec<u8> values: try \
                 with_logic_expire_bytes_adapter(true) to enable it, or configure \
                 with_codec to adapt LogicTtlValue<T> to bytes"
                    .to_string(),
            ));
        }
        Err(Error::ConfigError(format!(
            "logic-expire byte-stage requires an adapter for {}: configure \
             with_codec to adapt LogicTtlValue<T> to bytes",
            type_name::<T>()
        )))
    }

    fn build_logic(self, logic: LogicFeature<T>, ob: &Observable) -> Result<DynCache<T>> {
        let wire = self.build_logic_wire(logic.bytes_adapter, ob)?;
        Ok(Arc::new(LogicTtlDecorator::new(LogicTtlConfig {
            cache: wire,
            default_logic_ttl: logic.logic_ttl,
            loader: logic.loader.map(singleflight_loader),
            write_back_ttl: logic.write_back_ttl,
            observable: ob.clone(),
        })))
    }
}
