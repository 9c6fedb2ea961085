use anyhow::{bail, Result};
use reqwest::{multipart, Client};
use serde_json::Value;
use std::time::{Duration, Instant};
use tender_core::types::AiStatus;
use tracing::{error, info, warn};

const SUPPORTED_FORMATS: &[&str] = &[".txt", ".doc", ".docx", ".pdf", ".xlsx", ".xls", ".html"];
const POLL_TIMEOUT: Duration = Duration::from_secs(600);
const POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AiClassifierConfig {
    pub base_url: String,
    pub api_token: String,
}

pub struct AiClassifier {
    client: Client,
    config: AiClassifierConfig,
}

impl AiClassifier {
    pub fn new(config: AiClassifierConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// `file_name` drives the format check; case-insensitive suffix match
    /// against the formats the AI service accepts.
    pub fn is_supported_format(file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        SUPPORTED_FORMATS.iter().any(|fmt| lower.ends_with(fmt))
    }

    /// Submits `bytes` under `file_name` and returns the AI service's
    /// task_id. The caller must record a PENDING ai_checks row against this
    /// task_id before polling, so a poll failure still counts as an attempt.
    pub async fn submit(&self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        if !Self::is_supported_format(file_name) {
            bail!("unsupported document format: {file_name}");
        }

        let task_id = self.send_to_ai_parse(bytes, file_name).await?;
        info!("Submitted {} to AI, task_id={}", file_name, task_id);
        Ok(task_id)
    }

    /// Polls `/task_status/{task_id}` every 10s until a terminal status or
    /// the 600s wall-clock budget is exhausted. An `Err` here is itself a
    /// terminal outcome for the attempt (the caller records it as `Failed`).
    pub async fn poll(&self, task_id: &str) -> Result<(AiStatus, Option<Value>)> {
        self.poll_task(task_id).await
    }

    async fn send_to_ai_parse(&self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .part("files", part)
            .text("details", "");

        let resp = self
            .client
            .post(format!("{}/parse", self.config.base_url))
            .bearer_auth(&self.config.api_token)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !(status.is_success() || status.as_u16() == 202) {
            let body = resp.text().await.unwrap_or_default();
            bail!("AI parse request failed with {}: {}", status, body);
        }

        let data: Value = resp.json().await?;
        match data.get("task_id").and_then(Value::as_str) {
            Some(id) => Ok(id.to_string()),
            None => bail!("AI response missing task_id: {}", data),
        }
    }

    /// `IN PROGRESS` (literal space, matching the upstream AI service) keeps
    /// polling; SUCCESS, REJECTED, and ERROR are terminal. Exceeding 600s
    /// yields `TIMEOUT` without a final request.
    async fn poll_task(&self, task_id: &str) -> Result<(AiStatus, Option<Value>)> {
        let deadline = Instant::now() + POLL_TIMEOUT;

        loop {
            let url = format!("{}/task_status/{}", self.config.base_url, task_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.config.api_token)
                .send()
                .await?;

            if resp.status().as_u16() != 200 {
                error!("Polling {} returned {}", task_id, resp.status());
                bail!("polling {} returned {}", task_id, resp.status());
            }

            let task_data: Value = resp.json().await?;
            let status_str = task_data.get("status").and_then(Value::as_str).unwrap_or("");

            match status_str {
                "SUCCESS" => return Ok((AiStatus::Success, task_data.get("result").cloned())),
                "REJECTED" => return Ok((AiStatus::Rejected, task_data.get("result").cloned())),
                "ERROR" => return Ok((AiStatus::Error, task_data.get("result").cloned())),
                "IN PROGRESS" => info!("Task {} still in progress", task_id),
                other => warn!("Task {} reported unexpected status {}", task_id, other),
            }

            if Instant::now() >= deadline {
                error!("Task {} polling timed out", task_id);
                return Ok((AiStatus::Timeout, None));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// `result.parameters[*].accepted_for_recommendation` — true if any
/// parameter in the result carries the flag.
pub fn is_accepted(result: Option<&Value>) -> bool {
    let Some(result) = result else {
        return false;
    };
    let Some(parameters) = result.get("parameters").and_then(Value::as_array) else {
        return false;
    };
    parameters.iter().any(|p| {
        p.get("accepted_for_recommendation")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_format_matches_case_insensitively() {
        assert!(AiClassifier::is_supported_format("NOTICE.PDF"));
        assert!(AiClassifier::is_supported_format("terms.docx"));
        assert!(!AiClassifier::is_supported_format("archive.zip"));
    }

    #[test]
    fn accepted_requires_true_flag_in_any_parameter() {
        let result = serde_json::json!({
            "parameters": [
                {"name": "budget", "accepted_for_recommendation": false},
                {"name": "scope", "accepted_for_recommendation": true}
            ]
        });
        assert!(is_accepted(Some(&result)));
    }

    #[test]
    fn accepted_is_false_without_parameters() {
        let result = serde_json::json!({"summary": "no parameters here"});
        assert!(!is_accepted(Some(&result)));
        assert!(!is_accepted(None));
    }
}
