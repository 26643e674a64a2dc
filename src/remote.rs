//! Remote forms-platform boundary.
//!
//! Three synchronous operations: create a form from its definition, resolve
//! the platform-generated identifier for a named form, and submit a record
//! batch. Retry and timeout mechanics belong to the transport, not to the
//! orchestrator; the HTTP client here only shapes the requests. The
//! orchestrator is generic over `RemoteClient` so tests drive it with an
//! in-memory fake.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::formgen::FormDefinition;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub trait RemoteClient {
    /// Creates a form from its definition, table name, and generated API name.
    fn create_form(&self, definition: &FormDefinition, api_name: &str) -> Result<()>;

    /// Resolves the platform-generated identifier for a named form. `None`
    /// means the platform has not issued one.
    fn resolve_form_id(&self, api_name: &str) -> Result<Option<String>>;

    /// Submits the full record set for one form in a single batch.
    fn submit_records(&self, form_id: &str, records: &[Map<String, Value>])
    -> Result<SubmitOutcome>;
}

pub struct HttpRemoteClient {
    base_url: String,
    client: reqwest::blocking::Client,
    api_token: Option<String>,
}

impl HttpRemoteClient {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Building HTTP client")?;
        Ok(HttpRemoteClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            api_token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::blocking::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[derive(Debug, Deserialize)]
struct FormIdResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    succeeded: usize,
    #[serde(default)]
    failed: usize,
}

impl RemoteClient for HttpRemoteClient {
    fn create_form(&self, definition: &FormDefinition, api_name: &str) -> Result<()> {
        let body = serde_json::json!({
            "apiName": api_name,
            "tableName": definition.properties.table_name,
            "definition": definition,
        });
        let response = self
            .request(reqwest::Method::POST, "/api/forms")
            .json(&body)
            .send()
            .with_context(|| format!("Creating form '{}'", definition.properties.id))?;
        if !response.status().is_success() {
            bail!(
                "Form creation for '{}' rejected: {} {}",
                definition.properties.id,
                response.status(),
                response.text().unwrap_or_default()
            );
        }
        Ok(())
    }

    fn resolve_form_id(&self, api_name: &str) -> Result<Option<String>> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/forms/{api_name}"))
            .send()
            .with_context(|| format!("Resolving identifier for '{api_name}'"))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!(
                "Identifier lookup for '{api_name}' failed: {}",
                response.status()
            );
        }
        let parsed: FormIdResponse = response
            .json()
            .with_context(|| format!("Parsing identifier response for '{api_name}'"))?;
        Ok(parsed.id)
    }

    fn submit_records(
        &self,
        form_id: &str,
        records: &[Map<String, Value>],
    ) -> Result<SubmitOutcome> {
        let body = serde_json::json!({ "records": records });
        let response = self
            .request(reqwest::Method::POST, &format!("/api/forms/{form_id}/records"))
            .json(&body)
            .send()
            .with_context(|| format!("Submitting records to form '{form_id}'"))?;
        if !response.status().is_success() {
            bail!(
                "Record batch for '{form_id}' rejected: {} {}",
                response.status(),
                response.text().unwrap_or_default()
            );
        }
        let parsed: SubmitResponse = response
            .json()
            .with_context(|| format!("Parsing submit response for '{form_id}'"))?;
        Ok(SubmitOutcome {
            attempted: records.len(),
            succeeded: parsed.succeeded,
            failed: parsed.failed,
        })
    }
}
