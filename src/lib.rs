//! Hemmer provider for New Relic.
//!
//! Serves two types over the Hemmer provider protocol:
//!
//! - **`newrelic_entity`** (data source): looks up an entity by exact name,
//!   optionally filtered by type, domain and one tag, and exposes its GUID,
//!   account and application IDs.
//! - **`newrelic_cloud_account`** (resource): links AWS accounts to a New
//!   Relic account. Its ID is the sorted, `:`-joined list of linked account
//!   IDs (`"6:8"`), and updates unlink removed accounts before linking new
//!   ones.
//!
//! All New Relic calls go through the [`client::NewRelicApi`] trait, backed
//! by NerdGraph in production and by [`testing::FakeNewRelic`] in tests.
//!
//! # Handshake Protocol
//!
//! When started via [`serve`], the provider prints one line to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`. Logs go to stderr.
//!
//! # Configuration
//!
//! ```text
//! provider "newrelic" {
//!   api_key    = "NRAK-..."   # or NEW_RELIC_API_KEY
//!   account_id = 123          # or NEW_RELIC_ACCOUNT_ID
//!   region     = "EU"         # or NEW_RELIC_REGION, default US
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use client::{NerdGraphClient, NewRelicApi};
pub use config::{ProviderConfig, Region};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::NewRelicProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_on, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
