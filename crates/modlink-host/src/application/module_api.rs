//! The host ↔ module operation contract.
//!
//! [`ModuleOp`] names every call the host can make on a module.  The module
//! side implements [`ModuleApi`] and binds it with [`module_handlers`]; the
//! host side wraps any [`RequestSender`] in a [`ModuleClient`] to get one
//! typed method per operation.
//!
//! ```text
//! ModuleClient::init(..) ─► RequestSender ─► channel ─► dispatcher ─► ModuleApi::init
//!        ▲                                                                  │
//!        └──────────────── Result<InitResponse, ChannelError> ◄────────────┘
//! ```
//!
//! Field definitions leave the module through [`serialize_is_visible_fn`], so a
//! `ModuleApi` implementation can return fields with executable predicates.

use std::sync::Arc;

use async_trait::async_trait;
use modlink_core::{
    serialize_is_visible_fn, ConfigField, DispatchError, EventHandlers, Operation,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::ChannelError;

// ── Operation contract ────────────────────────────────────────────────────────

/// Calls the host makes on a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleOp {
    Init,
    Destroy,
    UpdateConfig,
    GetConfigFields,
    ExecuteAction,
    UpdateFeedbacks,
}

impl Operation for ModuleOp {
    const ALL: &'static [Self] = &[
        ModuleOp::Init,
        ModuleOp::Destroy,
        ModuleOp::UpdateConfig,
        ModuleOp::GetConfigFields,
        ModuleOp::ExecuteAction,
        ModuleOp::UpdateFeedbacks,
    ];

    fn name(self) -> &'static str {
        match self {
            ModuleOp::Init => "init",
            ModuleOp::Destroy => "destroy",
            ModuleOp::UpdateConfig => "updateConfig",
            ModuleOp::GetConfigFields => "getConfigFields",
            ModuleOp::ExecuteAction => "executeAction",
            ModuleOp::UpdateFeedbacks => "updateFeedbacks",
        }
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// Payload of operations that take no arguments.  Encodes as `{}` so it
/// passes the dispatcher's object check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub label: String,
    pub is_first_init: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    pub has_http_handler: bool,
    /// Config the module wants persisted in place of the one it was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_config: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfigRequest {
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetConfigFieldsResponse {
    pub fields: Vec<ConfigField>,
}

/// One configured action on a button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInstance {
    pub id: String,
    pub action_id: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteActionRequest {
    pub action: ActionInstance,
    /// Surface that triggered the action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
}

/// One configured feedback whose value the host wants recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInstance {
    pub id: String,
    pub feedback_id: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateFeedbacksRequest {
    pub feedbacks: Vec<FeedbackInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackValue {
    pub id: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateFeedbacksResponse {
    pub values: Vec<FeedbackValue>,
}

// ── Module side ───────────────────────────────────────────────────────────────

/// What a module implements.  Errors are reported to the host as the
/// handler failure text (`{:#}`, so `anyhow` context chains survive).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleApi: Send + Sync + 'static {
    async fn init(&self, request: InitRequest) -> anyhow::Result<InitResponse>;

    async fn destroy(&self) -> anyhow::Result<()>;

    async fn update_config(&self, config: Map<String, Value>) -> anyhow::Result<()>;

    /// Field definitions; executable predicates are allowed here.
    async fn get_config_fields(&self) -> anyhow::Result<Vec<ConfigField>>;

    async fn execute_action(&self, request: ExecuteActionRequest) -> anyhow::Result<()>;

    async fn update_feedbacks(
        &self,
        request: UpdateFeedbacksRequest,
    ) -> anyhow::Result<UpdateFeedbacksResponse>;
}

/// Builds the complete handler table for `module`.
///
/// # Errors
///
/// Returns [`DispatchError`] only if the table is incomplete, which would
/// mean a `ModuleOp` variant was added without a binding here.
pub fn module_handlers<M>(module: Arc<M>) -> Result<EventHandlers<ModuleOp>, DispatchError>
where
    M: ModuleApi + ?Sized,
{
    let init = Arc::clone(&module);
    let destroy = Arc::clone(&module);
    let update_config = Arc::clone(&module);
    let get_config_fields = Arc::clone(&module);
    let execute_action = Arc::clone(&module);
    let update_feedbacks = module;

    EventHandlers::builder()
        .on(ModuleOp::Init, move |request: InitRequest| {
            let module = Arc::clone(&init);
            async move { module.init(request).await }
        })
        .on(ModuleOp::Destroy, move |_: EmptyRequest| {
            let module = Arc::clone(&destroy);
            async move { module.destroy().await }
        })
        .on(ModuleOp::UpdateConfig, move |request: UpdateConfigRequest| {
            let module = Arc::clone(&update_config);
            async move { module.update_config(request.config).await }
        })
        .on(ModuleOp::GetConfigFields, move |_: EmptyRequest| {
            let module = Arc::clone(&get_config_fields);
            async move {
                let fields = module.get_config_fields().await?;
                debug!(count = fields.len(), "serializing config fields");
                Ok::<_, anyhow::Error>(GetConfigFieldsResponse {
                    fields: serialize_is_visible_fn(fields),
                })
            }
        })
        .on(ModuleOp::ExecuteAction, move |request: ExecuteActionRequest| {
            let module = Arc::clone(&execute_action);
            async move { module.execute_action(request).await }
        })
        .on(ModuleOp::UpdateFeedbacks, move |request: UpdateFeedbacksRequest| {
            let module = Arc::clone(&update_feedbacks);
            async move { module.update_feedbacks(request).await }
        })
        .build()
}

// ── Host side ─────────────────────────────────────────────────────────────────

/// Sends one request and waits for its reply.
///
/// Implemented by the in-memory channel; test doubles record calls.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn request(&self, event: &'static str, payload: Value) -> Result<Value, ChannelError>;
}

#[async_trait]
impl<S: RequestSender + ?Sized> RequestSender for Arc<S> {
    async fn request(&self, event: &'static str, payload: Value) -> Result<Value, ChannelError> {
        (**self).request(event, payload).await
    }
}

/// Typed host-side handle on one module.
#[derive(Debug, Clone)]
pub struct ModuleClient<S> {
    sender: S,
}

impl<S: RequestSender> ModuleClient<S> {
    pub fn new(sender: S) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub async fn init(&self, request: &InitRequest) -> Result<InitResponse, ChannelError> {
        self.call(ModuleOp::Init, request).await
    }

    pub async fn destroy(&self) -> Result<(), ChannelError> {
        self.call(ModuleOp::Destroy, &EmptyRequest {}).await
    }

    pub async fn update_config(&self, config: Map<String, Value>) -> Result<(), ChannelError> {
        self.call(ModuleOp::UpdateConfig, &UpdateConfigRequest { config })
            .await
    }

    /// Fetches the module's fields in wire form (`isVisibleFn` text only).
    pub async fn get_config_fields(&self) -> Result<Vec<ConfigField>, ChannelError> {
        let response: GetConfigFieldsResponse =
            self.call(ModuleOp::GetConfigFields, &EmptyRequest {}).await?;
        Ok(response.fields)
    }

    pub async fn execute_action(&self, request: &ExecuteActionRequest) -> Result<(), ChannelError> {
        self.call(ModuleOp::ExecuteAction, request).await
    }

    pub async fn update_feedbacks(
        &self,
        request: &UpdateFeedbacksRequest,
    ) -> Result<UpdateFeedbacksResponse, ChannelError> {
        self.call(ModuleOp::UpdateFeedbacks, request).await
    }

    async fn call<Req, Res>(&self, op: ModuleOp, request: &Req) -> Result<Res, ChannelError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let result = self.sender.request(op.name(), payload).await?;
        Ok(serde_json::from_value(result)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use modlink_core::{FieldKind, IsVisible, Predicate};
    use serde_json::json;
    use std::sync::Mutex;

    fn fields_with_predicate() -> Vec<ConfigField> {
        vec![ConfigField::new("port", "Port", FieldKind::Checkbox { default: false })
            .with_is_visible(Predicate::parse("(o) => o.advanced").unwrap())]
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in ModuleOp::ALL {
            assert_eq!(ModuleOp::from_name(op.name()), Some(*op));
        }
        assert_eq!(ModuleOp::from_name("getConfigFields"), Some(ModuleOp::GetConfigFields));
        assert_eq!(ModuleOp::from_name("nope"), None);
    }

    #[test]
    fn test_empty_request_encodes_as_object() {
        assert_eq!(serde_json::to_value(EmptyRequest {}).unwrap(), json!({}));
    }

    #[test]
    fn test_execute_action_wire_shape() {
        let request = ExecuteActionRequest {
            action: ActionInstance {
                id: "a1".to_string(),
                action_id: "send".to_string(),
                options: Map::new(),
            },
            surface_id: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"action": {"id": "a1", "actionId": "send", "options": {}}})
        );
    }

    #[tokio::test]
    async fn test_handlers_bind_every_operation() {
        let handlers = module_handlers(Arc::new(MockModuleApi::new())).unwrap();

        assert_eq!(handlers.len(), ModuleOp::ALL.len());
    }

    #[tokio::test]
    async fn test_get_config_fields_handler_serializes_predicates() {
        // Arrange
        let mut module = MockModuleApi::new();
        module
            .expect_get_config_fields()
            .times(1)
            .returning(|| Ok(fields_with_predicate()));
        let handlers = module_handlers(Arc::new(module)).unwrap();

        // Act
        let result = handlers
            .invoke(ModuleOp::GetConfigFields, json!({}))
            .await
            .unwrap();

        // Assert
        assert_eq!(
            result["fields"][0]["isVisibleFn"],
            json!("(o) => o.advanced")
        );
        assert!(result["fields"][0].get("isVisible").is_none());
    }

    #[tokio::test]
    async fn test_module_error_chain_becomes_failure_text() {
        let mut module = MockModuleApi::new();
        module.expect_execute_action().returning(|request| {
            Err(anyhow::anyhow!("unknown action id {}", request.action.action_id))
                .context("executing action")
        });
        let handlers = module_handlers(Arc::new(module)).unwrap();

        let failure = handlers
            .invoke(
                ModuleOp::ExecuteAction,
                json!({"action": {"id": "a1", "actionId": "warp"}}),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.message(), "executing action: unknown action id warp");
    }

    // ── Host side ─────────────────────────────────────────────────────────────

    /// Records requests and answers from a fixed script.
    struct ScriptedSender {
        requests: Mutex<Vec<(&'static str, Value)>>,
        reply: Mutex<Option<Result<Value, ChannelError>>>,
    }

    impl ScriptedSender {
        fn replying(reply: Result<Value, ChannelError>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                reply: Mutex::new(Some(reply)),
            }
        }
    }

    #[async_trait]
    impl RequestSender for ScriptedSender {
        async fn request(&self, event: &'static str, payload: Value) -> Result<Value, ChannelError> {
            self.requests.lock().unwrap().push((event, payload));
            self.reply.lock().unwrap().take().unwrap_or(Err(ChannelError::Closed))
        }
    }

    #[tokio::test]
    async fn test_client_init_sends_named_request() {
        // Arrange
        let sender = ScriptedSender::replying(Ok(json!({"hasHttpHandler": true})));
        let client = ModuleClient::new(sender);
        let request = InitRequest {
            label: "demo".to_string(),
            is_first_init: true,
            config: Map::new(),
        };

        // Act
        let response = client.init(&request).await.unwrap();

        // Assert
        assert!(response.has_http_handler);
        let requests = client.sender().requests.lock().unwrap();
        assert_eq!(requests[0].0, "init");
        assert_eq!(
            requests[0].1,
            json!({"label": "demo", "isFirstInit": true, "config": {}})
        );
    }

    #[tokio::test]
    async fn test_client_destroy_sends_empty_object_and_accepts_null() {
        let client = ModuleClient::new(ScriptedSender::replying(Ok(Value::Null)));

        client.destroy().await.unwrap();

        let requests = client.sender().requests.lock().unwrap();
        assert_eq!(requests[0], ("destroy", json!({})));
    }

    #[tokio::test]
    async fn test_client_fields_arrive_without_executable_predicates() {
        let wire = json!({"fields": [
            {"id": "port", "label": "Port", "type": "checkbox", "default": false,
             "isVisibleFn": "(o) => o.advanced"}
        ]});
        let client = ModuleClient::new(ScriptedSender::replying(Ok(wire)));

        let fields = client.get_config_fields().await.unwrap();

        assert_eq!(fields[0].is_visible, IsVisible::Absent);
        assert_eq!(fields[0].is_visible_fn.as_deref(), Some("(o) => o.advanced"));
    }

    #[tokio::test]
    async fn test_client_reports_malformed_result() {
        let client = ModuleClient::new(ScriptedSender::replying(Ok(json!("not an object"))));

        let err = client.update_feedbacks(&UpdateFeedbacksRequest::default()).await;

        assert!(matches!(err, Err(ChannelError::Json(_))));
    }

    #[tokio::test]
    async fn test_client_passes_transport_errors_through() {
        let client = ModuleClient::new(ScriptedSender::replying(Err(ChannelError::Closed)));

        let err = client.update_config(Map::new()).await;

        assert!(matches!(err, Err(ChannelError::Closed)));
    }
}
