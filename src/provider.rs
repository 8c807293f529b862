//! Provider trait and factory registry
//!
//! One provider instance lives for the whole session. It carries its own
//! configuration block (it is a [`StateModel`] like everything else) and
//! hands out factories that build fresh resource and data-source instances
//! per call, typically closures capturing the API client built in
//! `configure`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::context::Context;
use crate::data_source::DataSource;
use crate::error::Result;
use crate::resource::Resource;
use crate::state::StateModel;

/// Builds a fresh resource instance bound to the provider.
pub type ResourceFactory = Box<dyn Fn() -> Box<dyn Resource> + Send + Sync>;

/// Builds a fresh data-source instance bound to the provider.
pub type DataSourceFactory = Box<dyn Fn() -> Box<dyn DataSource> + Send + Sync>;

/// The session-wide provider. `configure` is called at most once per
/// session, `stop` at most once terminally; the engine makes no locking
/// guarantees around provider fields mutated after configure.
#[async_trait]
pub trait Provider: StateModel + Capabilities + Send + Sync {
    /// Called once after the configuration block has been bound into this
    /// instance. Build long-lived clients here.
    async fn configure(&mut self, ctx: Context, orchestrator_version: String) -> Result<()>;

    /// Cooperative shutdown signal. Does not cancel outstanding requests.
    async fn stop(&self, ctx: Context) -> Result<()>;

    /// Resource factories keyed by type name, populated at construction.
    fn resources(&self) -> HashMap<String, ResourceFactory>;

    /// Data-source factories keyed by type name.
    fn data_sources(&self) -> HashMap<String, DataSourceFactory>;
}
