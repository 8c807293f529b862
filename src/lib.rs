//! tfsdk: build infrastructure providers that speak the plugin wire
//! protocol.
//!
//! Provider authors write plain records with annotated fields, bind them
//! with [`state_model!`], and implement the lifecycle traits; the engine in
//! [`server`] handles decoding, change detection, unknown-value
//! propagation, and the plan/apply state machine. The RPC transport itself
//! lives outside this crate — the engine consumes decoded request payloads
//! and the [`wire`] module carries the shapes a front-end serializes.

pub mod capability;
pub mod codec;
pub mod context;
pub mod data_source;
pub mod diag;
pub mod dynamic;
pub mod error;
pub mod logging;
pub mod path;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod server;
pub mod state;
pub mod tag;
pub mod value;
pub mod wire;

pub use capability::{Capabilities, Defaulter, Updater, Validator};
pub use context::Context;
pub use data_source::DataSource;
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use dynamic::Dynamic;
pub use error::{Error, Result};
pub use path::{Path, PathStep};
pub use provider::{DataSourceFactory, Provider, ResourceFactory};
pub use resource::Resource;
pub use schema::{Attribute, Block, Schema};
pub use server::Server;
pub use state::{FieldType, StateModel};
pub use value::{Type, Value};
