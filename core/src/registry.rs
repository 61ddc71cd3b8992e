//! Per-version API handles, built once and shared.
//!
//! # Design
//! [`ClientFactory`] is the explicit context every tool passes around. It
//! owns:
//! - the settings, loaded on first use and frozen afterwards,
//! - the parameter codec, installed once and handed to every build,
//! - one one-shot cell per API version, so concurrent first callers for the
//!   same version block on a single build instead of racing.
//!
//! Turning a discovery document into callable methods is the job of the
//! [`DiscoveryBuilder`] supplied by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::cache::DiskCache;
use crate::codec::{DefaultCast, JsonParameterCodec, ParameterCodec};
use crate::env::{Env, OsEnv};
use crate::error::{BoxError, ClientError, ConfigError};
use crate::logging;
use crate::settings::Settings;
use crate::transport::{AuthorizedTransport, TlsOptions, Transport, UreqTransport};

/// Version used when the caller does not ask for one.
pub const DEFAULT_API_VERSION: &str = "v1";

/// Name of the API in the discovery service.
pub const API_NAME: &str = "arvados";

/// Cache directory label for discovery responses.
pub const DISCOVERY_CACHE_LABEL: &str = "discovery";

/// Discovery URL template for `host`. `{api}` and `{apiVersion}` are left
/// for the discovery builder to expand.
pub fn discovery_url(host: &str) -> String {
    format!("https://{host}/discovery/v1/apis/{{api}}/{{apiVersion}}/rest")
}

/// Everything the discovery builder needs to construct one handle.
pub struct BuildRequest {
    pub api: &'static str,
    pub version: String,
    pub discovery_url: String,
    pub transport: Arc<dyn Transport>,
    /// Cache backing `transport`; `None` when the cache directory is unavailable.
    pub cache: Option<DiskCache>,
    pub codec: Arc<dyn ParameterCodec>,
    pub validate_certificates: bool,
}

/// Turns a discovery document into an API handle.
pub trait DiscoveryBuilder: Send + Sync {
    type Handle: Send + Sync;

    fn build(&self, request: BuildRequest) -> Result<Self::Handle, BoxError>;
}

type HandleCell<H> = Arc<OnceCell<Arc<H>>>;

/// Builds and caches API handles keyed by version.
pub struct ClientFactory<B: DiscoveryBuilder> {
    builder: B,
    env: Arc<dyn Env>,
    settings: OnceCell<Arc<Settings>>,
    codec: OnceCell<Arc<dyn ParameterCodec>>,
    handles: Mutex<HashMap<String, HandleCell<B::Handle>>>,
}

impl<B: DiscoveryBuilder> ClientFactory<B> {
    /// Factory reading the real process environment.
    pub fn new(builder: B) -> Self {
        Self::with_env(builder, OsEnv)
    }

    pub fn with_env(builder: B, env: impl Env + 'static) -> Self {
        Self {
            builder,
            env: Arc::new(env),
            settings: OnceCell::new(),
            codec: OnceCell::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Factory whose settings are already known; nothing is read from disk.
    pub fn with_settings(builder: B, env: impl Env + 'static, settings: Settings) -> Self {
        logging::init(&settings);
        let factory = Self::with_env(builder, env);
        if factory.settings.set(Arc::new(settings)).is_err() {
            tracing::debug!("settings already present, keeping them");
        }
        factory
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Settings, loading `~/.config/arvados/settings.conf` on first call.
    pub fn settings(&self) -> Result<&Arc<Settings>, ConfigError> {
        self.settings.get_or_try_init(|| {
            let settings = Settings::load_default(self.env.as_ref())?;
            logging::init(&settings);
            Ok(Arc::new(settings))
        })
    }

    /// Install the codec used for every handle built from now on.
    ///
    /// Returns `false`, leaving the current codec in place, if one is already
    /// installed.
    pub fn install_codec(&self, codec: Arc<dyn ParameterCodec>) -> bool {
        let installed = self.codec.set(codec).is_ok();
        if !installed {
            tracing::debug!("parameter codec already installed, keeping it");
        }
        installed
    }

    /// The installed codec; [`JsonParameterCodec`] unless another was
    /// installed first.
    pub fn codec(&self) -> &Arc<dyn ParameterCodec> {
        self.codec
            .get_or_init(|| Arc::new(JsonParameterCodec::new(DefaultCast)))
    }

    /// Handle for `version` (default [`DEFAULT_API_VERSION`]), built on first
    /// request and shared afterwards.
    pub fn get_client(&self, version: Option<&str>) -> Result<Arc<B::Handle>, ClientError> {
        let version = version.unwrap_or_else(|| {
            tracing::info!(
                "Using default API version. Call get_client(Some(\"{DEFAULT_API_VERSION}\")) instead."
            );
            DEFAULT_API_VERSION
        });

        let settings = self.settings()?;

        let cell = Arc::clone(self.handles.lock().entry(version.to_string()).or_default());
        let handle = cell.get_or_try_init(|| self.build(settings, version).map(Arc::new))?;
        Ok(Arc::clone(handle))
    }

    fn build(&self, settings: &Settings, version: &str) -> Result<B::Handle, ClientError> {
        let host = settings.api_host()?;

        let tls = TlsOptions::from_settings(settings);
        let cache = DiskCache::open(self.env.as_ref(), DISCOVERY_CACHE_LABEL);
        let transport = AuthorizedTransport::from_settings(UreqTransport::new(&tls), settings)
            .with_cache(cache.clone());

        let request = BuildRequest {
            api: API_NAME,
            version: version.to_string(),
            discovery_url: discovery_url(host),
            transport: Arc::new(transport),
            cache,
            codec: Arc::clone(self.codec()),
            validate_certificates: tls.validate_certificates,
        };
        tracing::debug!(
            version,
            discovery_url = %request.discovery_url,
            validate_certificates = request.validate_certificates,
            cache = request.cache.is_some(),
            "building API client"
        );

        self.builder
            .build(request)
            .map_err(|source| ClientError::Build {
                version: version.to_string(),
                source,
            })
    }
}
