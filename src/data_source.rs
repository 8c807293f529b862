//! Data source trait
//!
//! A data source is read-only: configuration in, state out. Like resources,
//! instances are created per call and dropped when the call returns.

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::context::Context;
use crate::error::Result;
use crate::state::StateModel;

#[async_trait]
pub trait DataSource: StateModel + Capabilities + Send {
    /// Resolve the configured query and populate this instance's fields.
    async fn read(&mut self, ctx: Context) -> Result<()>;
}
