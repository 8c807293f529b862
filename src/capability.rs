//! Optional provider capabilities
//!
//! Defaulting, validation, and in-place update are independent capability
//! traits, not part of the role trait hierarchy. The engine probes for each
//! one per call through the [`Capabilities`] accessors and dispatches
//! dynamically when present.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

/// Seeds an instance before unmarshal so that null or unknown sources
/// preserve a provider-defined baseline for unset optional fields.
pub trait Defaulter {
    fn set_defaults(&mut self);
}

/// Validates an instance after unmarshal.
///
/// Return `Error::Diagnostics` to address the user; any other error is
/// wrapped into a single error diagnostic.
#[async_trait]
pub trait Validator: Send {
    async fn validate(&mut self, ctx: Context) -> Result<()>;
}

/// In-place update. A resource without this capability is replaced on any
/// argument change; the engine probes for it both while planning (replace
/// policy) and while applying (dispatch).
#[async_trait]
pub trait Updater: Send {
    async fn update(&mut self, ctx: Context) -> Result<()>;
}

/// Capability probes shared by provider, resource, and data-source
/// instances. Override an accessor to advertise the capability:
///
/// ```ignore
/// impl Capabilities for ServerResource {
///     fn defaulter(&mut self) -> Option<&mut dyn Defaulter> {
///         Some(self)
///     }
/// }
/// ```
pub trait Capabilities {
    fn defaulter(&mut self) -> Option<&mut dyn Defaulter> {
        None
    }

    fn validator(&mut self) -> Option<&mut dyn Validator> {
        None
    }
}
