//! A small in-process module used by the loopback binary and the tests.
//!
//! It keeps its configuration in memory, declares a handful of fields (two of
//! them with visibility predicates), runs three actions and reports two
//! feedbacks.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context};
use async_trait::async_trait;
use modlink_core::{ConfigField, DropdownChoice, Expr, FieldKind, Predicate};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::application::module_api::{
    ExecuteActionRequest, FeedbackValue, InitRequest, InitResponse, ModuleApi,
    UpdateFeedbacksRequest, UpdateFeedbacksResponse,
};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: i64 = 9000;

#[derive(Debug, Default)]
struct DemoState {
    label: Option<String>,
    config: Map<String, Value>,
    counter: u64,
    destroyed: bool,
}

/// In-memory module implementing every [`ModuleApi`] operation.
#[derive(Debug, Default)]
pub struct DemoModule {
    state: Mutex<DemoState>,
}

impl DemoModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `count` actions.
    pub fn counter(&self) -> u64 {
        self.state().counter
    }

    pub fn config(&self) -> Map<String, Value> {
        self.state().config.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    fn state(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fields() -> anyhow::Result<Vec<ConfigField>> {
        let advanced = Predicate::new("options", Expr::option("advanced").strict_eq(true))
            .context("building port visibility rule")?;
        let protocol_visible =
            Predicate::parse("(options) => options.advanced && options.port >= 1024")
                .context("building protocol visibility rule")?;

        Ok(vec![
            ConfigField::new(
                "info",
                "Information",
                FieldKind::StaticText {
                    value: "Connects to a demo device.".to_string(),
                },
            )
            .with_width(12),
            ConfigField::new(
                "host",
                "Target host",
                FieldKind::Textinput {
                    default: DEFAULT_HOST.to_string(),
                    regex: Some(r"^[\w.-]+$".to_string()),
                },
            )
            .with_width(8),
            ConfigField::new("advanced", "Advanced settings", FieldKind::Checkbox { default: false }),
            ConfigField::new(
                "port",
                "Target port",
                FieldKind::Number {
                    default: DEFAULT_PORT as f64,
                    min: 1.0,
                    max: 65535.0,
                    step: Some(1.0),
                },
            )
            .with_is_visible(advanced),
            ConfigField::new(
                "protocol",
                "Protocol",
                FieldKind::Dropdown {
                    default: json!("tcp"),
                    choices: vec![
                        DropdownChoice {
                            id: json!("tcp"),
                            label: "TCP".to_string(),
                        },
                        DropdownChoice {
                            id: json!("udp"),
                            label: "UDP".to_string(),
                        },
                    ],
                },
            )
            .with_tooltip("Unprivileged ports only")
            .with_is_visible(protocol_visible),
        ])
    }
}

#[async_trait]
impl ModuleApi for DemoModule {
    async fn init(&self, request: InitRequest) -> anyhow::Result<InitResponse> {
        info!(label = %request.label, first = request.is_first_init, "demo module initialising");

        let mut config = request.config;
        let mut upgraded = false;
        if !config.contains_key("host") {
            config.insert("host".to_string(), json!(DEFAULT_HOST));
            upgraded = true;
        }
        if !config.contains_key("port") {
            config.insert("port".to_string(), json!(DEFAULT_PORT));
            upgraded = true;
        }

        let mut state = self.state();
        state.label = Some(request.label);
        state.config = config.clone();
        state.destroyed = false;

        Ok(InitResponse {
            has_http_handler: false,
            new_config: upgraded.then_some(config),
        })
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        let mut state = self.state();
        info!(label = ?state.label, "demo module destroyed");
        state.destroyed = true;
        Ok(())
    }

    async fn update_config(&self, config: Map<String, Value>) -> anyhow::Result<()> {
        if let Some(port) = config.get("port") {
            let valid = port.as_i64().is_some_and(|p| (1..=65535).contains(&p));
            if !valid {
                bail!("port must be an integer between 1 and 65535, got {port}");
            }
        }
        self.state().config = config;
        Ok(())
    }

    async fn get_config_fields(&self) -> anyhow::Result<Vec<ConfigField>> {
        Self::fields()
    }

    async fn execute_action(&self, request: ExecuteActionRequest) -> anyhow::Result<()> {
        let action = request.action;
        match action.action_id.as_str() {
            "log" => {
                let message = action
                    .options
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("(no message)");
                info!(action = %action.id, surface = ?request.surface_id, "{message}");
                Ok(())
            }
            "count" => {
                self.state().counter += 1;
                Ok(())
            }
            "fail" => bail!("action {} requested a failure", action.id),
            other => bail!("unknown action \"{other}\""),
        }
    }

    async fn update_feedbacks(
        &self,
        request: UpdateFeedbacksRequest,
    ) -> anyhow::Result<UpdateFeedbacksResponse> {
        let state = self.state();
        let values = request
            .feedbacks
            .into_iter()
            .map(|feedback| {
                let value = match feedback.feedback_id.as_str() {
                    "counter" => json!(state.counter),
                    "config_value" => feedback
                        .options
                        .get("key")
                        .and_then(Value::as_str)
                        .and_then(|key| state.config.get(key))
                        .cloned()
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                FeedbackValue {
                    id: feedback.id,
                    value,
                }
            })
            .collect();
        Ok(UpdateFeedbacksResponse { values })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
