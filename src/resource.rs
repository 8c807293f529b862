//! Resource trait
//!
//! A resource is a managed-lifecycle object: the engine creates one fresh
//! instance per call from the provider's factory, binds wire state into it,
//! runs one lifecycle method, and marshals the instance back. Instances
//! never outlive the call.

use async_trait::async_trait;

use crate::capability::{Capabilities, Updater};
use crate::context::Context;
use crate::error::Result;
use crate::state::StateModel;

/// A managed resource. `read` signals disappearance with
/// [`Error::DoesNotExist`](crate::error::Error::DoesNotExist), which the
/// engine turns into a null state so the orchestrator plans a recreate.
#[async_trait]
pub trait Resource: StateModel + Capabilities + Send {
    /// Refresh this instance from the real object it tracks.
    async fn read(&mut self, ctx: Context) -> Result<()>;

    /// Create the real object; populate computed fields before returning.
    async fn create(&mut self, ctx: Context) -> Result<()>;

    /// Destroy the real object.
    async fn delete(&mut self, ctx: Context) -> Result<()>;

    /// In-place update capability. Without it, every argument change
    /// requires replacing the resource.
    fn updater(&mut self) -> Option<&mut dyn Updater> {
        None
    }
}
