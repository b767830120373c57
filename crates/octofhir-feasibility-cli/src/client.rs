use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use octofhir_core::{ExecutorError, FhirSearchExecutor, Population, Query};
use serde_json::Value;
use url::Url;

use crate::config::FhirServerConfig;

/// Runs searches against a FHIR REST API, following `next` links until the
/// result set is exhausted.
///
/// Only the patient a resource belongs to is needed, so every search asks for
/// `_elements=subject`. Patient ids come from `Patient.id` or from a
/// `subject.reference` of the form `Patient/{id}`.
pub struct RestSearchExecutor {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
    timeout: Duration,
    bearer_token: Option<String>,
}

impl RestSearchExecutor {
    pub fn new(config: &FhirServerConfig) -> Result<Self> {
        Url::parse(&config.base_url).context("Invalid FHIR base URL")?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            timeout,
            bearer_token: config.bearer_token.clone(),
        })
    }

    fn search_url(&self, query: &Query) -> Result<Url, ExecutorError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, query.resource_type()))
            .map_err(|e| ExecutorError::backend(format!("invalid search URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query.params().iter() {
                pairs.append_pair(name, value);
            }
            pairs.append_pair("_elements", "subject");
            pairs.append_pair("_count", &self.page_size.to_string());
        }
        Ok(url)
    }

    async fn fetch_page(&self, url: Url) -> Result<Value, ExecutorError> {
        let mut req = self
            .http
            .get(url)
            .header("Accept", "application/fhir+json");
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(ExecutorError::backend(format!(
                "HTTP {status}: {}",
                outcome_message(&body)
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| ExecutorError::invalid_response(format!("response is not JSON: {e}")))
    }

    fn transport_error(&self, err: reqwest::Error) -> ExecutorError {
        if err.is_timeout() {
            ExecutorError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            ExecutorError::backend(format!("request failed: {err}"))
        }
    }
}

#[async_trait]
impl FhirSearchExecutor for RestSearchExecutor {
    async fn execute(&self, query: &Query) -> Result<Population, ExecutorError> {
        let mut next = Some(self.search_url(query)?);
        let mut visited = HashSet::new();
        let mut ids = Vec::new();

        while let Some(url) = next.take() {
            if !visited.insert(url.to_string()) {
                return Err(ExecutorError::invalid_response(format!(
                    "next link loops back to {url}"
                )));
            }
            let bundle = self.fetch_page(url).await?;
            collect_patient_ids(&bundle, &mut ids)?;
            next = next_link(&bundle)?;
        }

        tracing::debug!(
            query = %query,
            pages = visited.len(),
            resources = ids.len(),
            "Fetched search results"
        );
        Ok(Population::of(ids)?)
    }
}

fn collect_patient_ids(bundle: &Value, ids: &mut Vec<String>) -> Result<(), ExecutorError> {
    if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return Err(ExecutorError::invalid_response("expected a Bundle"));
    }
    let Some(entries) = bundle.get("entry").and_then(Value::as_array) else {
        return Ok(());
    };

    for resource in entries.iter().filter_map(|entry| entry.get("resource")) {
        match patient_id(resource) {
            Some(id) => ids.push(id.to_string()),
            None => {
                let resource_type = resource
                    .get("resourceType")
                    .and_then(Value::as_str)
                    .unwrap_or("-");
                tracing::debug!(resource_type, "Skipping search entry without a patient");
            }
        }
    }
    Ok(())
}

fn patient_id(resource: &Value) -> Option<&str> {
    match resource.get("resourceType")?.as_str()? {
        "Patient" => resource.get("id")?.as_str(),
        _ => resource
            .get("subject")?
            .get("reference")?
            .as_str()?
            .split_once("Patient/")
            .and_then(|(_, rest)| rest.split('/').next())
            .filter(|id| !id.is_empty()),
    }
}

fn next_link(bundle: &Value) -> Result<Option<Url>, ExecutorError> {
    let next = bundle
        .get("link")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str);

    next.map(|url| {
        Url::parse(url)
            .map_err(|e| ExecutorError::invalid_response(format!("invalid next link '{url}': {e}")))
    })
    .transpose()
}

/// Diagnostics of an OperationOutcome body, or the raw body.
fn outcome_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body)
        && json.get("resourceType").and_then(|v| v.as_str()) == Some("OperationOutcome")
        && let Some(issues) = json.get("issue").and_then(|v| v.as_array())
    {
        let msgs: Vec<&str> = issues
            .iter()
            .filter_map(|i| i.get("diagnostics").and_then(|d| d.as_str()))
            .collect();
        if !msgs.is_empty() {
            return msgs.join("; ");
        }
    }
    body.to_string()
}
