//! HTTP/JSON oracle backend.
//!
//! Talks to the oracle service's REST surface:
//! - `POST /api/consult`
//! - `GET  /api/audit/chain`
//! - `GET  /api/verify/{hash}`
//! - `POST /api/verify_reference_hash`

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use audit_chain::Reference;

use super::traits::*;
use crate::wire::{ChainEnvelope, RawRecord, ReferenceCheckRequest, ReferenceCheckResponse, RemoteVerification};

/// HTTP backend for the oracle service.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a backend around an existing client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }
}

fn network(err: reqwest::Error) -> BackendError {
    BackendError::NetworkError(err.to_string())
}

#[async_trait]
impl OracleBackend for HttpBackend {
    fn id(&self) -> &str {
        &self.base_url
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.url("/health"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn consult(&self, request: &ConsultRequest) -> Result<RawRecord, BackendError> {
        debug!(session_id = %request.session_id, "Consulting oracle");
        let response = self
            .client
            .post(self.url("/api/consult"))
            .json(request)
            .send()
            .await
            .map_err(network)?;
        Self::decode(response).await
    }

    async fn fetch_chain(&self) -> Result<ChainEnvelope, BackendError> {
        let response = self
            .client
            .get(self.url("/api/audit/chain"))
            .send()
            .await
            .map_err(network)?;
        let envelope: ChainEnvelope = Self::decode(response).await?;

        // Some deployments report query failures inside a 200
        if let (Some(error), true) = (&envelope.error, envelope.records.is_empty()) {
            return Err(BackendError::RequestFailed(error.clone()));
        }
        Ok(envelope)
    }

    async fn verify_hash(&self, hash: &str) -> Result<RemoteVerification, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("/api/verify/{hash}")))
            .send()
            .await
            .map_err(network)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(RemoteVerification {
                verified: false,
                error: Some("Hash not found".to_string()),
                ..Default::default()
            });
        }
        Self::decode(response).await
    }

    async fn verify_reference_hash(
        &self,
        ref_hash: &str,
        references: &[Reference],
    ) -> Result<bool, BackendError> {
        let body = ReferenceCheckRequest {
            hash: ref_hash.to_string(),
            references: references.to_vec(),
        };
        let response = self
            .client
            .post(self.url("/api/verify_reference_hash"))
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        let check: ReferenceCheckResponse = Self::decode(response).await?;
        Ok(check.ok)
    }
}
