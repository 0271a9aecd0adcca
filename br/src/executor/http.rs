//! HTTP executor implementation
//!
//! Default concrete capability for the CLI: POSTs the task payload to the
//! current endpoint URL and maps the response onto the three-way outcome.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::domain::Task;

use super::{Executor, Outcome};

/// Check if an HTTP status code signals endpoint exhaustion
fn is_rate_limit_status(status: u16) -> bool {
    matches!(status, 429 | 529)
}

/// Executor that drives a plain HTTP endpoint
pub struct HttpExecutor {
    http: Client,
}

impl HttpExecutor {
    /// Create an executor from configuration
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, task: &Task, endpoint: &str) -> Outcome {
        debug!(task_id = %task.id, endpoint, "HTTP execute");

        let body = serde_json::json!({
            "id": task.id,
            "payload": task.payload,
        });

        let response = match self.http.post(endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Transport error");
                return Outcome::Failure {
                    reason: format!("transport error: {}", e),
                };
            }
        };

        let status = response.status().as_u16();

        if is_rate_limit_status(status) {
            debug!(task_id = %task.id, status, "Endpoint rate limited");
            return Outcome::RateLimited;
        }

        if !(200..300).contains(&status) {
            return Outcome::Failure {
                reason: format!("HTTP {}", status),
            };
        }

        match response.text().await {
            Ok(text) => Outcome::Success { text },
            Err(e) => Outcome::Failure {
                reason: format!("failed to read response body: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_statuses() {
        assert!(is_rate_limit_status(429));
        assert!(is_rate_limit_status(529));
        assert!(!is_rate_limit_status(500));
        assert!(!is_rate_limit_status(200));
    }

    #[test]
    fn test_from_config() {
        let executor = HttpExecutor::from_config(&ExecutorConfig::default());
        assert!(executor.is_ok());
    }
}
