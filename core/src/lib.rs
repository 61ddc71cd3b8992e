//! Authenticated, discovery-driven API client core for Arvados.
//!
//! # Overview
//! Builds per-version API handles whose method surface comes from a
//! discovery document fetched at runtime. The document parser itself is an
//! external collaborator behind [`DiscoveryBuilder`]; this crate supplies
//! everything around it: settings, the authenticated transport stack, the
//! on-disk discovery cache, parameter encoding, and the handle registry.
//!
//! # Design
//! - `Settings` are loaded once per [`ClientFactory`] from
//!   `~/.config/arvados/settings.conf`, then overlaid with `ARVADOS_*`
//!   environment variables.
//! - HTTP requests and responses are plain data ([`HttpRequest`],
//!   [`HttpResponse`]); anything that can execute them implements
//!   [`Transport`]. [`AuthorizedTransport`] decorates an inner transport with
//!   the bearer header, one stale-connection retry, and the response cache.
//! - The parameter codec is handed to each build explicitly instead of
//!   patching shared state.
//! - Everything reads the process environment through [`Env`], so tests run
//!   against a [`StaticEnv`].

pub mod cache;
pub mod codec;
pub mod env;
pub mod error;
pub mod http;
pub mod logging;
pub mod registry;
pub mod settings;
pub mod transport;

pub use cache::{discovery_cache_dir, DiskCache};
pub use codec::{DefaultCast, JsonParameterCodec, ParameterCodec};
pub use env::{Env, OsEnv, StaticEnv};
pub use error::{ClientError, ConfigError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use registry::{BuildRequest, ClientFactory, DiscoveryBuilder, DEFAULT_API_VERSION};
pub use settings::Settings;
pub use transport::{AuthorizedTransport, TlsOptions, Transport, UreqTransport};
