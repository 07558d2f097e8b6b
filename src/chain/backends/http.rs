//! HTTP prediction backend — adapter for remote model providers.
//!
//! Speaks a minimal JSON contract: POST the document and the requested
//! field names, get predicted fields back. The engine treats every remote
//! provider identically through this adapter; provider-specific prompt or
//! model handling lives on the other side of the endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::{BackendError, PredictionBackend};
use crate::models::{FieldAlternative, FieldType, PredictedField, PredictionRequest};

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    text: &'a str,
    document_type_hint: Option<&'a str>,
    requested_fields: &'a [String],
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    fields: Vec<WireField>,
}

#[derive(Debug, Deserialize)]
struct WireField {
    name: String,
    field_type: FieldType,
    value: String,
    confidence: f32,
    #[serde(default)]
    alternatives: Vec<WireAlternative>,
}

#[derive(Debug, Deserialize)]
struct WireAlternative {
    value: String,
    confidence: f32,
}

/// Remote model API client with a per-call timeout.
pub struct HttpBackend {
    name: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpBackend {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PredictionBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, request: &PredictionRequest) -> Result<Vec<PredictedField>, BackendError> {
        let body = WireRequest {
            text: &request.document_text,
            document_type_hint: request.document_type_hint.as_deref(),
            requested_fields: &request.requested_fields,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout
                } else if e.is_connect() {
                    BackendError::Unavailable(e.to_string())
                } else {
                    BackendError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(BackendError::RateLimited);
        }
        if status.is_server_error() {
            return Err(BackendError::Unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(BackendError::Http(format!("HTTP {status}")));
        }

        let parsed: WireResponse = response
            .json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        // Stamp provenance with this backend's configured name, whatever
        // the remote side claims.
        let fields = parsed
            .fields
            .into_iter()
            .map(|f| PredictedField {
                name: f.name,
                field_type: f.field_type,
                value: f.value,
                confidence: f.confidence.clamp(0.0, 1.0),
                source_backend: self.name.clone(),
                alternatives: f
                    .alternatives
                    .into_iter()
                    .map(|a| FieldAlternative {
                        value: a.value,
                        confidence: a.confidence.clamp(0.0, 1.0),
                    })
                    .collect(),
            })
            .collect();

        Ok(fields)
    }
}
