//! Sequential HTTP function executor.
//!
//! Executing a call never raises: transport failures, non-2xx statuses and
//! application-level rejections all come back as a `FunctionOutcome` with
//! `success: false`. Unknown names are a local failure with no network
//! traffic.

use crate::registry::{route, HttpMethod};
use async_trait::async_trait;
use booking_agent_config::BackendSettings;
use booking_agent_core::{FunctionCall, FunctionOutcome};
use serde_json::Value;
use std::time::Duration;

/// Backend clock reading used to ground relative-date extraction.
#[derive(Debug, Clone)]
pub struct CurrentDateTime {
    /// "YYYY-MM-DDTHH:MM:SS".
    pub datetime: String,
    /// True when the backend was unreachable and the local clock was used.
    pub degraded: bool,
}

/// Execution seam between the agent and the domain backend.
#[async_trait]
pub trait FunctionRunner: Send + Sync {
    async fn execute(&self, call: &FunctionCall) -> FunctionOutcome;

    /// Sequential execution in the order given. Order matters: validations
    /// run before availability and duplicate checks.
    async fn execute_all(&self, calls: &[FunctionCall]) -> Vec<FunctionOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.execute(call).await);
        }
        outcomes
    }

    async fn current_datetime(&self) -> CurrentDateTime;
}

pub struct HttpFunctionExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFunctionExecutor {
    pub fn new(settings: &BackendSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, call: &FunctionCall) -> Result<reqwest::Url, String> {
        let spec = route(call.name);
        let mut url = reqwest::Url::parse(&format!("{}{}", self.base_url, spec.path))
            .map_err(|e| format!("invalid backend URL: {}", e))?;

        if let Some(arg_key) = spec.path_arg {
            let value = call
                .str_arg(arg_key)
                .ok_or_else(|| format!("{} requires argument '{}'", call.name, arg_key))?;
            url.path_segments_mut()
                .map_err(|_| "backend URL cannot carry path segments".to_string())?
                .push(value);
        }
        Ok(url)
    }
}

#[async_trait]
impl FunctionRunner for HttpFunctionExecutor {
    async fn execute(&self, call: &FunctionCall) -> FunctionOutcome {
        let spec = route(call.name);
        let url = match self.build_url(call) {
            Ok(url) => url,
            Err(message) => {
                tracing::warn!(function = %call.name, %message, "local call failure");
                return FunctionOutcome::failure(message);
            }
        };

        tracing::debug!(function = %call.name, url = %url, "executing backend call");
        metrics::counter!("backend_function_calls_total", "function" => call.name.as_str())
            .increment(1);

        let request = match spec.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url).json(&call.arguments),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(function = %call.name, error = %err, "backend unreachable");
                return FunctionOutcome::failure(format!("backend unreachable: {}", err));
            }
        };

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .get("errorMessage")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("backend returned {}", status));
            tracing::warn!(function = %call.name, status = %status, "backend rejected call");
            return FunctionOutcome::failure(message);
        }

        outcome_from_body(body)
    }

    async fn current_datetime(&self) -> CurrentDateTime {
        let url = format!("{}/api/system/current-datetime", self.base_url);
        let fetched = async {
            let body: Value = self.client.get(&url).send().await.ok()?.json().await.ok()?;
            body.get("datetime")
                .or_else(|| body.get("data").and_then(|d| d.get("datetime")))
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        .await;

        match fetched {
            Some(datetime) => CurrentDateTime {
                datetime,
                degraded: false,
            },
            None => {
                tracing::warn!("current-datetime endpoint unavailable, using local clock");
                CurrentDateTime {
                    datetime: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
                    degraded: true,
                }
            }
        }
    }
}

/// Normalize a 2xx backend body into the outcome envelope.
///
/// The backend performs its own application-level validation: a 200 with
/// `success: false` (at either level) is a rejection, not a transport
/// error. The payload is `data` when present, otherwise the whole body.
fn outcome_from_body(body: Value) -> FunctionOutcome {
    let top_level_success = body.get("success").and_then(Value::as_bool) != Some(false);
    let nested_success = body
        .get("data")
        .and_then(|d| d.get("success"))
        .and_then(Value::as_bool)
        != Some(false);
    let error = body
        .get("errorMessage")
        .and_then(Value::as_str)
        .map(str::to_string);
    let data = body.get("data").cloned().unwrap_or(body);

    FunctionOutcome {
        success: top_level_success && nested_success,
        data,
        error,
    }
}
