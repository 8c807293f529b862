//! Protocol engine
//!
//! Hosts one provider and mediates the plan/apply state machine. Request
//! and response types mirror the wire payloads: type names plus raw byte
//! buffers that are decoded against the target's implied block type. The
//! RPC front-end owns transport concerns; everything user-visible flows
//! back as diagnostics on the response body.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::capability::Validator;
use crate::codec;
use crate::context::Context;
use crate::data_source::DataSource;
use crate::diag::{error_or_diagnostics, Diagnostic, Diagnostics};
use crate::error::{Error, Result};
use crate::logging;
use crate::path::Path;
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{Attribute, Block, Schema};
use crate::state;
use crate::value::Value;

/// The engine. Shared by the RPC front-end across request tasks; the
/// provider sits behind a read/write lock, written only while binding its
/// own configuration block.
pub struct Server<P> {
    provider: Arc<RwLock<P>>,
}

pub struct GetSchemaRequest;

pub struct GetSchemaResponse {
    pub provider: Schema,
    pub resource_schemas: HashMap<String, Schema>,
    pub data_source_schemas: HashMap<String, Schema>,
}

pub struct PrepareProviderConfigRequest {
    pub config: Vec<u8>,
}

#[derive(Debug)]
pub struct PrepareProviderConfigResponse {
    pub prepared_config: Vec<u8>,
    pub diagnostics: Diagnostics,
}

pub struct ValidateResourceTypeConfigRequest {
    pub type_name: String,
    pub config: Vec<u8>,
}

#[derive(Debug)]
pub struct ValidateResourceTypeConfigResponse {
    pub diagnostics: Diagnostics,
}

pub struct ValidateDataSourceConfigRequest {
    pub type_name: String,
    pub config: Vec<u8>,
}

#[derive(Debug)]
pub struct ValidateDataSourceConfigResponse {
    pub diagnostics: Diagnostics,
}

pub struct UpgradeResourceStateRequest;

pub struct UpgradeResourceStateResponse;

pub struct ConfigureRequest {
    pub config: Vec<u8>,
    pub orchestrator_version: String,
}

#[derive(Debug)]
pub struct ConfigureResponse {
    pub diagnostics: Diagnostics,
}

pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: Vec<u8>,
}

#[derive(Debug)]
pub struct ReadResourceResponse {
    pub new_state: Vec<u8>,
    pub diagnostics: Diagnostics,
}

pub struct PlanResourceChangeRequest {
    pub type_name: String,
    pub config: Vec<u8>,
    pub prior_state: Vec<u8>,
    pub proposed_new_state: Vec<u8>,
}

#[derive(Debug)]
pub struct PlanResourceChangeResponse {
    pub planned_state: Vec<u8>,
    pub requires_replace: Vec<Path>,
    pub diagnostics: Diagnostics,
}

pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior_state: Vec<u8>,
    pub planned_state: Vec<u8>,
}

#[derive(Debug)]
pub struct ApplyResourceChangeResponse {
    pub new_state: Vec<u8>,
    pub diagnostics: Diagnostics,
}

pub struct ImportResourceStateRequest;

pub struct ImportResourceStateResponse;

pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: Vec<u8>,
}

#[derive(Debug)]
pub struct ReadDataSourceResponse {
    pub state: Vec<u8>,
    pub diagnostics: Diagnostics,
}

/// One detected difference between prior and planned state.
struct Change {
    path: Path,
    attribute: Attribute,
}

/// Walk `to` against `from` and record every top-level attribute whose
/// planned value is not known-equal to the prior value.
fn changes(block: &Block, from: &Value, to: &Value) -> Result<Vec<Change>> {
    let mut out = Vec::new();
    to.walk(&mut |path, to_val| {
        if path.is_empty() {
            // skip root
            return Ok(true);
        }

        let att = block.apply_path(path)?.ok_or_else(|| {
            Error::Path(format!("path not found in schema: {path}"))
        })?;

        let from_val = path.apply(from)?;
        let equal = from_val.equals(to_val);
        if equal.is_known() && equal.is_true() {
            return Ok(false);
        }

        out.push(Change {
            path: path.clone(),
            attribute: att.clone(),
        });
        Ok(false)
    })?;
    Ok(out)
}

/// Run a probed validator, folding its result into the user-visible
/// channel: diagnostics pass through, a plain error becomes a single error
/// diagnostic.
async fn run_validator(validator: &mut dyn Validator, ctx: Context) -> Diagnostics {
    match validator.validate(ctx).await {
        Ok(()) => Diagnostics::default(),
        Err(Error::Diagnostics(diags)) => diags,
        Err(other) => Diagnostics::from(Diagnostic::error(other.to_string(), other.to_string())),
    }
}

impl<P: Provider> Server<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(RwLock::new(provider)),
        }
    }

    async fn resource_instance(&self, type_name: &str) -> Box<dyn Resource> {
        let provider = self.provider.read().await;
        let mut factories = provider.resources();
        // the orchestrator never asks for a type it was not handed in
        // GetSchema, so an unknown name is a programming error
        let factory = factories
            .remove(type_name)
            .unwrap_or_else(|| panic!("resource type not registered: {type_name}"));
        factory()
    }

    async fn data_source_instance(&self, type_name: &str) -> Box<dyn DataSource> {
        let provider = self.provider.read().await;
        let mut factories = provider.data_sources();
        let factory = factories
            .remove(type_name)
            .unwrap_or_else(|| panic!("data source type not registered: {type_name}"));
        factory()
    }

    pub async fn get_schema(
        &self,
        _ctx: Context,
        _req: GetSchemaRequest,
    ) -> Result<GetSchemaResponse> {
        logging::traced("GetSchema", async {
            let provider = self.provider.read().await;
            let provider_schema = provider.schema()?;

            let mut resource_schemas = HashMap::new();
            for (name, factory) in provider.resources() {
                resource_schemas.insert(name, factory().schema()?);
            }

            let mut data_source_schemas = HashMap::new();
            for (name, factory) in provider.data_sources() {
                data_source_schemas.insert(name, factory().schema()?);
            }

            Ok(GetSchemaResponse {
                provider: provider_schema,
                resource_schemas,
                data_source_schemas,
            })
        })
        .await
    }

    pub async fn prepare_provider_config(
        &self,
        ctx: Context,
        req: PrepareProviderConfigRequest,
    ) -> Result<PrepareProviderConfigResponse> {
        logging::traced("PrepareProviderConfig", async {
            let mut provider = self.provider.write().await;
            let block_ty = state::block_type(&*provider)?;
            let config = codec::decode(&req.config, &block_ty)?;

            state::unmarshal_with_defaults(&mut *provider, &config)?;

            let mut diags = Diagnostics::default();
            if let Some(v) = provider.validator() {
                diags = run_validator(v, ctx.clone()).await;
                if diags.is_error() {
                    return Ok(PrepareProviderConfigResponse {
                        prepared_config: Vec::new(),
                        diagnostics: diags,
                    });
                }
            }

            let prepared = provider.marshal_state()?;
            let data = codec::encode(&prepared, &block_ty)
                .map_err(|e| Error::Encode(format!("unable to marshal state for provider block: {e}")))?;

            Ok(PrepareProviderConfigResponse {
                prepared_config: data,
                diagnostics: diags,
            })
        })
        .await
    }

    pub async fn validate_resource_type_config(
        &self,
        ctx: Context,
        req: ValidateResourceTypeConfigRequest,
    ) -> Result<ValidateResourceTypeConfigResponse> {
        logging::traced("ValidateResourceTypeConfig", async {
            let mut r = self.resource_instance(&req.type_name).await;
            let block_ty = state::block_type(r.as_ref())?;
            let config = codec::decode(&req.config, &block_ty)?;

            state::unmarshal_with_defaults(r.as_mut(), &config)?;

            let mut diags = Diagnostics::default();
            if let Some(v) = r.validator() {
                diags = run_validator(v, ctx).await;
            }

            Ok(ValidateResourceTypeConfigResponse { diagnostics: diags })
        })
        .await
    }

    pub async fn validate_data_source_config(
        &self,
        ctx: Context,
        req: ValidateDataSourceConfigRequest,
    ) -> Result<ValidateDataSourceConfigResponse> {
        logging::traced("ValidateDataSourceConfig", async {
            let mut ds = self.data_source_instance(&req.type_name).await;
            let block_ty = state::block_type(ds.as_ref())?;
            let config = codec::decode(&req.config, &block_ty)?;

            state::unmarshal_with_defaults(ds.as_mut(), &config)?;

            let mut diags = Diagnostics::default();
            if let Some(v) = ds.validator() {
                diags = run_validator(v, ctx).await;
            }

            Ok(ValidateDataSourceConfigResponse { diagnostics: diags })
        })
        .await
    }

    pub async fn upgrade_resource_state(
        &self,
        _ctx: Context,
        _req: UpgradeResourceStateRequest,
    ) -> Result<UpgradeResourceStateResponse> {
        panic!("UpgradeResourceState not implemented")
    }

    pub async fn configure(
        &self,
        ctx: Context,
        req: ConfigureRequest,
    ) -> Result<ConfigureResponse> {
        logging::traced("Configure", async {
            let mut provider = self.provider.write().await;
            let block_ty = state::block_type(&*provider)?;
            let config = codec::decode(&req.config, &block_ty)?;

            state::unmarshal_with_defaults(&mut *provider, &config)?;

            let diags =
                error_or_diagnostics(provider.configure(ctx, req.orchestrator_version).await)?;

            Ok(ConfigureResponse { diagnostics: diags })
        })
        .await
    }

    pub async fn read_resource(
        &self,
        ctx: Context,
        req: ReadResourceRequest,
    ) -> Result<ReadResourceResponse> {
        logging::traced("ReadResource", async {
            let mut r = self.resource_instance(&req.type_name).await;
            let block_ty = state::block_type(r.as_ref())?;
            let current = codec::decode(&req.current_state, &block_ty)?;

            state::unmarshal_with_defaults(r.as_mut(), &current)?;

            match r.read(ctx).await {
                Err(Error::DoesNotExist) => {
                    // gone; a null state makes the orchestrator plan a recreate
                    let data = codec::encode(&Value::null(block_ty.clone()), &block_ty)?;
                    return Ok(ReadResourceResponse {
                        new_state: data,
                        diagnostics: Diagnostics::default(),
                    });
                }
                res => {
                    let diags = error_or_diagnostics(res)?;
                    if diags.is_error() {
                        return Ok(ReadResourceResponse {
                            new_state: Vec::new(),
                            diagnostics: diags,
                        });
                    }

                    let new_state = r.marshal_state()?;
                    let data = codec::encode(&new_state, &block_ty).map_err(|e| {
                        Error::Encode(format!("unable to marshal state for resource {}: {e}", req.type_name))
                    })?;

                    Ok(ReadResourceResponse {
                        new_state: data,
                        diagnostics: diags,
                    })
                }
            }
        })
        .await
    }

    pub async fn plan_resource_change(
        &self,
        _ctx: Context,
        req: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse> {
        logging::traced("PlanResourceChange", async {
            let mut r = self.resource_instance(&req.type_name).await;
            let block_ty = state::block_type(r.as_ref())?;

            let prior = codec::decode(&req.prior_state, &block_ty)?;
            let config = codec::decode(&req.config, &block_ty)?;
            let proposed = codec::decode(&req.proposed_new_state, &block_ty)?;

            if proposed.is_null() {
                // short circuit, this is a destroy
                return Ok(PlanResourceChangeResponse {
                    planned_state: req.proposed_new_state,
                    requires_replace: Vec::new(),
                    diagnostics: Diagnostics::default(),
                });
            }

            // round-trip through the record to normalize and pick up
            // author-side defaulting
            state::unmarshal_with_defaults(r.as_mut(), &proposed)?;
            let planned = r.marshal_state()?;

            let schema = r.schema()?;
            let block = &schema.block;

            let planned = planned.transform(&mut |path, v| {
                if path.is_empty() {
                    // skip root
                    return Ok(v);
                }

                let att = block.apply_path(path)?.ok_or_else(|| {
                    Error::Path(format!("path not found in schema: {path}"))
                })?;

                // purely computed values are always decided at apply time
                if att.computed && !att.is_argument() {
                    return Ok(Value::unknown(v.ty().clone()));
                }

                let proposed_val = path.apply(&proposed)?;
                if !proposed_val.is_known() {
                    return Ok(Value::unknown(v.ty().clone()));
                }

                let config_val = path.apply(&config)?;
                if att.computed && config_val.is_null() {
                    // an argument (it passed the short circuit above) the
                    // user left unset, so the provider fills it at apply
                    return Ok(Value::unknown(v.ty().clone()));
                }

                Ok(v)
            })?;

            let argument_changes: Vec<Change> = if prior.is_null() {
                Vec::new()
            } else {
                changes(block, &prior, &planned)?
                    .into_iter()
                    .filter(|c| c.attribute.is_argument())
                    .collect()
            };

            let needs_apply = prior.is_null() || !argument_changes.is_empty();
            if !needs_apply {
                // echo the prior bytes so repeated plans are idempotent
                return Ok(PlanResourceChangeResponse {
                    planned_state: req.prior_state,
                    requires_replace: Vec::new(),
                    diagnostics: Diagnostics::default(),
                });
            }

            let data = codec::encode(&planned, &block_ty).map_err(|e| {
                Error::Encode(format!("unable to marshal state for resource {}: {e}", req.type_name))
            })?;

            let mut requires_replace = Vec::new();
            if !prior.is_null() {
                let has_update = r.updater().is_some();
                for change in argument_changes {
                    if !has_update || change.attribute.force_new {
                        requires_replace.push(change.path);
                    }
                }
            }

            Ok(PlanResourceChangeResponse {
                planned_state: data,
                requires_replace,
                diagnostics: Diagnostics::default(),
            })
        })
        .await
    }

    pub async fn apply_resource_change(
        &self,
        ctx: Context,
        req: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse> {
        logging::traced("ApplyResourceChange", async {
            let mut r = self.resource_instance(&req.type_name).await;
            let block_ty = state::block_type(r.as_ref())?;

            let planned = codec::decode(&req.planned_state, &block_ty)?;
            let prior = codec::decode(&req.prior_state, &block_ty)?;

            if planned.is_null() {
                // a delete: bind prior state, skip validation
                state::unmarshal_with_defaults(r.as_mut(), &prior)?;

                let diags = error_or_diagnostics(r.delete(ctx).await)?;
                if diags.is_error() {
                    return Ok(ApplyResourceChangeResponse {
                        new_state: Vec::new(),
                        diagnostics: diags,
                    });
                }

                return Ok(ApplyResourceChangeResponse {
                    new_state: req.planned_state,
                    diagnostics: diags,
                });
            }

            state::unmarshal_with_defaults(r.as_mut(), &planned)?;

            // re-validate now that planned values are bound
            let mut diags = Diagnostics::default();
            if let Some(v) = r.validator() {
                diags = run_validator(v, ctx.clone()).await;
                if diags.is_error() {
                    return Ok(ApplyResourceChangeResponse {
                        new_state: Vec::new(),
                        diagnostics: diags,
                    });
                }
            }

            let result = if prior.is_null() {
                r.create(ctx).await
            } else {
                match r.updater() {
                    Some(u) => u.update(ctx).await,
                    None => return Err(Error::MissingUpdate(req.type_name.clone())),
                }
            };

            diags.extend(error_or_diagnostics(result)?);
            if diags.is_error() {
                return Ok(ApplyResourceChangeResponse {
                    new_state: Vec::new(),
                    diagnostics: diags,
                });
            }

            let new_state = r.marshal_state()?;
            let data = codec::encode(&new_state, &block_ty).map_err(|e| {
                Error::Encode(format!("unable to marshal state for resource {}: {e}", req.type_name))
            })?;

            Ok(ApplyResourceChangeResponse {
                new_state: data,
                diagnostics: diags,
            })
        })
        .await
    }

    pub async fn import_resource_state(
        &self,
        _ctx: Context,
        _req: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse> {
        panic!("ImportResourceState not implemented")
    }

    pub async fn read_data_source(
        &self,
        ctx: Context,
        req: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse> {
        logging::traced("ReadDataSource", async {
            let mut ds = self.data_source_instance(&req.type_name).await;
            let block_ty = state::block_type(ds.as_ref())?;
            let config = codec::decode(&req.config, &block_ty)?;

            state::unmarshal_with_defaults(ds.as_mut(), &config)?;

            let diags = error_or_diagnostics(ds.read(ctx).await)?;
            if diags.is_error() {
                return Ok(ReadDataSourceResponse {
                    state: Vec::new(),
                    diagnostics: diags,
                });
            }

            let new_state = ds.marshal_state()?;
            let data = codec::encode(&new_state, &block_ty).map_err(|e| {
                Error::Encode(format!("unable to marshal state for data source {}: {e}", req.type_name))
            })?;

            Ok(ReadDataSourceResponse {
                state: data,
                diagnostics: diags,
            })
        })
        .await
    }

    pub async fn stop(&self, ctx: Context) -> Result<()> {
        logging::traced("Stop", async {
            let provider = self.provider.read().await;
            provider.stop(ctx).await
        })
        .await
    }
}
