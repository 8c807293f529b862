//! End-to-end engine scenarios against an in-tree provider

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tfsdk::codec;
use tfsdk::server::{
    ApplyResourceChangeRequest, ConfigureRequest, GetSchemaRequest, PlanResourceChangeRequest,
    PrepareProviderConfigRequest, ReadDataSourceRequest, ReadResourceRequest, Server,
    ValidateResourceTypeConfigRequest,
};
use tfsdk::{
    Capabilities, Context, DataSource, DataSourceFactory, Defaulter, Diagnostic, Diagnostics,
    Error, Path, Provider, Resource, ResourceFactory, Result, StateModel, Type, Updater,
    Validator, Value,
};

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, method: &str) {
        self.0.lock().unwrap().push(method.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// Provider under test: an api_token block with a default and a validator.

#[derive(Default)]
struct TestProvider {
    api_token: Option<String>,
    log: CallLog,
}

tfsdk::state_model! {
    TestProvider {
        api_token: Option<String> => "api_token,optional,sensitive",
    }
}

impl Capabilities for TestProvider {
    fn defaulter(&mut self) -> Option<&mut dyn Defaulter> {
        Some(self)
    }

    fn validator(&mut self) -> Option<&mut dyn Validator> {
        Some(self)
    }
}

impl Defaulter for TestProvider {
    fn set_defaults(&mut self) {
        if self.api_token.is_none() {
            self.api_token = Some("anonymous".to_string());
        }
    }
}

#[async_trait]
impl Validator for TestProvider {
    async fn validate(&mut self, _ctx: Context) -> Result<()> {
        if self.api_token.as_deref() == Some("invalid") {
            return Err(Error::Diagnostics(Diagnostics::from(
                Diagnostic::error("Invalid credentials", "the api_token was rejected")
                    .with_path(Path::attr("api_token")),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for TestProvider {
    async fn configure(&mut self, _ctx: Context, _orchestrator_version: String) -> Result<()> {
        self.log.record("provider.configure");
        Ok(())
    }

    async fn stop(&self, _ctx: Context) -> Result<()> {
        self.log.record("provider.stop");
        Ok(())
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut map: HashMap<String, ResourceFactory> = HashMap::new();

        let log = self.log.clone();
        map.insert(
            "test_server".to_string(),
            Box::new(move || {
                Box::new(ServerResource {
                    log: log.clone(),
                    ..ServerResource::default()
                }) as Box<dyn Resource>
            }),
        );

        let log = self.log.clone();
        map.insert(
            "test_volume".to_string(),
            Box::new(move || {
                Box::new(VolumeResource {
                    log: log.clone(),
                    ..VolumeResource::default()
                }) as Box<dyn Resource>
            }),
        );

        map
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut map: HashMap<String, DataSourceFactory> = HashMap::new();

        let log = self.log.clone();
        map.insert(
            "test_image".to_string(),
            Box::new(move || {
                Box::new(ImageDataSource {
                    log: log.clone(),
                    ..ImageDataSource::default()
                }) as Box<dyn DataSource>
            }),
        );

        map
    }
}

// A server that supports in-place update; kind replaces on change.

#[derive(Default)]
struct ServerResource {
    name: String,
    kind: String,
    id: Option<String>,
    log: CallLog,
}

tfsdk::state_model! {
    ServerResource {
        name: String => "name,required",
        kind: String => "kind,required,forcenew",
        id: Option<String> => "id,computed",
    }
}

impl Capabilities for ServerResource {
    fn validator(&mut self) -> Option<&mut dyn Validator> {
        Some(self)
    }
}

#[async_trait]
impl Validator for ServerResource {
    async fn validate(&mut self, _ctx: Context) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Diagnostics(Diagnostics::from(
                Diagnostic::error("name must not be empty", "").with_path(Path::attr("name")),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for ServerResource {
    async fn read(&mut self, _ctx: Context) -> Result<()> {
        if self.id.as_deref() == Some("missing") {
            return Err(Error::DoesNotExist);
        }
        self.log.record("server.read");
        Ok(())
    }

    async fn create(&mut self, _ctx: Context) -> Result<()> {
        self.log.record("server.create");
        self.id = Some("srv-001".to_string());
        Ok(())
    }

    async fn delete(&mut self, _ctx: Context) -> Result<()> {
        self.log.record("server.delete");
        Ok(())
    }

    fn updater(&mut self) -> Option<&mut dyn Updater> {
        Some(self)
    }
}

#[async_trait]
impl Updater for ServerResource {
    async fn update(&mut self, _ctx: Context) -> Result<()> {
        self.log.record("server.update");
        // computed fields were planned unknown; the update fills them back
        self.id = Some("srv-001".to_string());
        Ok(())
    }
}

// A volume with no update capability: any argument change replaces it.

#[derive(Default)]
struct VolumeResource {
    name: String,
    size: Option<i64>,
    id: Option<String>,
    log: CallLog,
}

tfsdk::state_model! {
    VolumeResource {
        name: String => "name,required",
        size: Option<i64> => "size,optional",
        id: Option<String> => "id,computed",
    }
}

impl Capabilities for VolumeResource {}

#[async_trait]
impl Resource for VolumeResource {
    async fn read(&mut self, _ctx: Context) -> Result<()> {
        self.log.record("volume.read");
        Ok(())
    }

    async fn create(&mut self, _ctx: Context) -> Result<()> {
        self.log.record("volume.create");
        self.id = Some("vol-001".to_string());
        Ok(())
    }

    async fn delete(&mut self, _ctx: Context) -> Result<()> {
        self.log.record("volume.delete");
        Ok(())
    }
}

#[derive(Default)]
struct ImageDataSource {
    name: String,
    id: Option<String>,
    log: CallLog,
}

tfsdk::state_model! {
    ImageDataSource {
        name: String => "name,required",
        id: Option<String> => "id,computed",
    }
}

impl Capabilities for ImageDataSource {}

#[async_trait]
impl DataSource for ImageDataSource {
    async fn read(&mut self, _ctx: Context) -> Result<()> {
        self.log.record("image.read");
        self.id = Some(format!("img-{}", self.name));
        Ok(())
    }
}

// helpers

fn engine() -> (Server<TestProvider>, CallLog) {
    let provider = TestProvider::default();
    let log = provider.log.clone();
    (Server::new(provider), log)
}

fn block_type_of<T: StateModel>(record: &T) -> Type {
    record.schema().unwrap().block.implied_type()
}

fn encode_record<T: StateModel>(record: &T) -> Vec<u8> {
    let ty = block_type_of(record);
    codec::encode(&record.marshal_state().unwrap(), &ty).unwrap()
}

fn server_bytes(name: &str, kind: &str, id: Option<&str>) -> Vec<u8> {
    encode_record(&ServerResource {
        name: name.to_string(),
        kind: kind.to_string(),
        id: id.map(str::to_string),
        log: CallLog::default(),
    })
}

fn decode_server(bytes: &[u8]) -> Value {
    codec::decode(bytes, &block_type_of(&ServerResource::default())).unwrap()
}

#[tokio::test]
async fn get_schema_lists_every_registered_type() {
    let (server, _log) = engine();
    let resp = server
        .get_schema(Context::new(), GetSchemaRequest)
        .await
        .unwrap();

    assert!(resp.provider.block.lookup("api_token").is_some());
    assert!(resp.resource_schemas.contains_key("test_server"));
    assert!(resp.resource_schemas.contains_key("test_volume"));
    assert!(resp.data_source_schemas.contains_key("test_image"));

    let kind = resp.resource_schemas["test_server"]
        .block
        .lookup("kind")
        .unwrap();
    assert!(kind.force_new);
}

#[tokio::test]
async fn create_plans_unknown_computed_then_applies() {
    let (server, log) = engine();

    // prior is null; config and proposed carry a null computed id
    let config = server_bytes("x", "std", None);
    let plan = server
        .plan_resource_change(
            Context::new(),
            PlanResourceChangeRequest {
                type_name: "test_server".to_string(),
                config: config.clone(),
                prior_state: Vec::new(),
                proposed_new_state: config.clone(),
            },
        )
        .await
        .unwrap();

    assert!(plan.requires_replace.is_empty());
    let planned = decode_server(&plan.planned_state);
    assert_eq!(planned.get_attr("name").unwrap().as_str(), Some("x"));
    assert!(planned.get_attr("id").unwrap().is_unknown());

    let apply = server
        .apply_resource_change(
            Context::new(),
            ApplyResourceChangeRequest {
                type_name: "test_server".to_string(),
                prior_state: Vec::new(),
                planned_state: plan.planned_state,
            },
        )
        .await
        .unwrap();

    assert!(!apply.diagnostics.is_error());
    let new_state = decode_server(&apply.new_state);
    assert_eq!(new_state.get_attr("id").unwrap().as_str(), Some("srv-001"));
    assert_eq!(new_state.get_attr("name").unwrap().as_str(), Some("x"));
    assert!(log.calls().contains(&"server.create".to_string()));
}

#[tokio::test]
async fn replan_of_settled_state_is_idempotent() {
    let (server, _log) = engine();

    let prior = server_bytes("x", "std", Some("srv-001"));
    // the orchestrator proposes config merged with prior computed values
    let plan = server
        .plan_resource_change(
            Context::new(),
            PlanResourceChangeRequest {
                type_name: "test_server".to_string(),
                config: server_bytes("x", "std", None),
                prior_state: prior.clone(),
                proposed_new_state: prior.clone(),
            },
        )
        .await
        .unwrap();

    assert_eq!(plan.planned_state, prior);
    assert!(plan.requires_replace.is_empty());
}

#[tokio::test]
async fn force_new_change_requires_replace() {
    let (server, _log) = engine();

    let plan = server
        .plan_resource_change(
            Context::new(),
            PlanResourceChangeRequest {
                type_name: "test_server".to_string(),
                config: server_bytes("x", "b", None),
                prior_state: server_bytes("x", "a", Some("srv-001")),
                proposed_new_state: server_bytes("x", "b", Some("srv-001")),
            },
        )
        .await
        .unwrap();

    assert_eq!(plan.requires_replace, vec![Path::attr("kind")]);

    // the computed id is re-planned unknown even though prior knew it
    let planned = decode_server(&plan.planned_state);
    assert!(planned.get_attr("id").unwrap().is_unknown());
}

#[tokio::test]
async fn updatable_change_applies_in_place() {
    let (server, log) = engine();

    let plan = server
        .plan_resource_change(
            Context::new(),
            PlanResourceChangeRequest {
                type_name: "test_server".to_string(),
                config: server_bytes("y", "std", None),
                prior_state: server_bytes("x", "std", Some("srv-001")),
                proposed_new_state: server_bytes("y", "std", Some("srv-001")),
            },
        )
        .await
        .unwrap();

    assert!(plan.requires_replace.is_empty());

    let apply = server
        .apply_resource_change(
            Context::new(),
            ApplyResourceChangeRequest {
                type_name: "test_server".to_string(),
                prior_state: server_bytes("x", "std", Some("srv-001")),
                planned_state: plan.planned_state,
            },
        )
        .await
        .unwrap();

    assert!(log.calls().contains(&"server.update".to_string()));
    assert!(!log.calls().contains(&"server.create".to_string()));

    let new_state = decode_server(&apply.new_state);
    assert_eq!(new_state.get_attr("name").unwrap().as_str(), Some("y"));
    assert_eq!(new_state.get_attr("id").unwrap().as_str(), Some("srv-001"));
}

#[tokio::test]
async fn resource_without_update_replaces_on_any_argument_change() {
    let (server, _log) = engine();

    let prior = encode_record(&VolumeResource {
        name: "data".to_string(),
        size: Some(10),
        id: Some("vol-001".to_string()),
        log: CallLog::default(),
    });
    let next = VolumeResource {
        name: "data2".to_string(),
        size: Some(20),
        id: Some("vol-001".to_string()),
        log: CallLog::default(),
    };

    let plan = server
        .plan_resource_change(
            Context::new(),
            PlanResourceChangeRequest {
                type_name: "test_volume".to_string(),
                config: encode_record(&next),
                prior_state: prior,
                proposed_new_state: encode_record(&next),
            },
        )
        .await
        .unwrap();

    assert!(plan.requires_replace.contains(&Path::attr("name")));
    assert!(plan.requires_replace.contains(&Path::attr("size")));
}

#[tokio::test]
async fn missing_update_capability_is_a_transport_error() {
    let (server, _log) = engine();

    let err = server
        .apply_resource_change(
            Context::new(),
            ApplyResourceChangeRequest {
                type_name: "test_volume".to_string(),
                prior_state: encode_record(&VolumeResource {
                    name: "data".to_string(),
                    ..VolumeResource::default()
                }),
                planned_state: encode_record(&VolumeResource {
                    name: "data2".to_string(),
                    ..VolumeResource::default()
                }),
            },
        )
        .await;

    assert!(matches!(err, Err(Error::MissingUpdate(_))));
}

#[tokio::test]
async fn destroy_plan_short_circuits() {
    let (server, _log) = engine();

    let plan = server
        .plan_resource_change(
            Context::new(),
            PlanResourceChangeRequest {
                type_name: "test_server".to_string(),
                config: Vec::new(),
                prior_state: server_bytes("x", "std", Some("srv-001")),
                proposed_new_state: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert!(plan.planned_state.is_empty());
    assert!(plan.requires_replace.is_empty());
}

#[tokio::test]
async fn null_planned_state_deletes() {
    let (server, log) = engine();

    let apply = server
        .apply_resource_change(
            Context::new(),
            ApplyResourceChangeRequest {
                type_name: "test_server".to_string(),
                prior_state: server_bytes("x", "std", Some("srv-001")),
                planned_state: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert!(log.calls().contains(&"server.delete".to_string()));
    assert!(apply.new_state.is_empty());
    assert!(!apply.diagnostics.is_error());
}

#[tokio::test]
async fn vanished_resource_reads_back_null_state() {
    let (server, _log) = engine();

    let resp = server
        .read_resource(
            Context::new(),
            ReadResourceRequest {
                type_name: "test_server".to_string(),
                current_state: server_bytes("x", "std", Some("missing")),
            },
        )
        .await
        .unwrap();

    assert!(!resp.diagnostics.is_error());
    assert!(decode_server(&resp.new_state).is_null());
}

#[tokio::test]
async fn read_returns_refreshed_state() {
    let (server, log) = engine();

    let resp = server
        .read_resource(
            Context::new(),
            ReadResourceRequest {
                type_name: "test_server".to_string(),
                current_state: server_bytes("x", "std", Some("srv-001")),
            },
        )
        .await
        .unwrap();

    assert!(log.calls().contains(&"server.read".to_string()));
    let state = decode_server(&resp.new_state);
    assert_eq!(state.get_attr("id").unwrap().as_str(), Some("srv-001"));
}

#[tokio::test]
async fn prepare_provider_config_rejects_bad_credentials() {
    let (server, _log) = engine();

    let config = encode_record(&TestProvider {
        api_token: Some("invalid".to_string()),
        log: CallLog::default(),
    });
    let resp = server
        .prepare_provider_config(Context::new(), PrepareProviderConfigRequest { config })
        .await
        .unwrap();

    assert!(resp.diagnostics.is_error());
    assert!(resp.prepared_config.is_empty());
    assert_eq!(resp.diagnostics.0[0].summary, "Invalid credentials");
}

#[tokio::test]
async fn prepare_provider_config_returns_defaulted_block() {
    let (server, _log) = engine();

    // a wholly null provider block still gets defaults seeded
    let resp = server
        .prepare_provider_config(
            Context::new(),
            PrepareProviderConfigRequest { config: Vec::new() },
        )
        .await
        .unwrap();

    assert!(!resp.diagnostics.is_error());
    let prepared = codec::decode(
        &resp.prepared_config,
        &block_type_of(&TestProvider::default()),
    )
    .unwrap();
    assert_eq!(
        prepared.get_attr("api_token").unwrap().as_str(),
        Some("anonymous")
    );
}

#[tokio::test]
async fn validate_resource_type_config_runs_the_validator() {
    let (server, _log) = engine();

    let resp = server
        .validate_resource_type_config(
            Context::new(),
            ValidateResourceTypeConfigRequest {
                type_name: "test_server".to_string(),
                config: server_bytes("", "std", None),
            },
        )
        .await
        .unwrap();

    assert!(resp.diagnostics.is_error());
    assert_eq!(
        resp.diagnostics.0[0].path,
        Some(Path::attr("name"))
    );
}

#[tokio::test]
async fn configure_binds_config_then_calls_the_provider() {
    let (server, log) = engine();

    let config = encode_record(&TestProvider {
        api_token: Some("t0ken".to_string()),
        log: CallLog::default(),
    });
    let resp = server
        .configure(
            Context::new(),
            ConfigureRequest {
                config,
                orchestrator_version: "1.5.0".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(!resp.diagnostics.is_error());
    assert!(log.calls().contains(&"provider.configure".to_string()));
}

#[tokio::test]
async fn data_source_read_returns_state() {
    let (server, log) = engine();

    let resp = server
        .read_data_source(
            Context::new(),
            ReadDataSourceRequest {
                type_name: "test_image".to_string(),
                config: encode_record(&ImageDataSource {
                    name: "ubuntu".to_string(),
                    ..ImageDataSource::default()
                }),
            },
        )
        .await
        .unwrap();

    assert!(log.calls().contains(&"image.read".to_string()));
    let state = codec::decode(
        &resp.state,
        &block_type_of(&ImageDataSource::default()),
    )
    .unwrap();
    assert_eq!(state.get_attr("id").unwrap().as_str(), Some("img-ubuntu"));
}

#[tokio::test]
async fn stop_forwards_to_the_provider() {
    let (server, log) = engine();

    server.stop(Context::new()).await.unwrap();
    assert!(log.calls().contains(&"provider.stop".to_string()));
}
