// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the external analysis engine.
//!
//! Implements [`AnalysisEngine`] against a single JSON endpoint: the
//! request carries the query text plus local file paths (the engine
//! shares the filesystem with this service), the response is an
//! [`EngineOutcome`]. Wall-clock limits are enforced by the caller, so
//! this client places no timeout of its own on the request.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use tally_config::model::EngineConfig;
use tally_core::types::{AnalysisRequest, EngineOutcome};
use tally_core::{AnalysisEngine, TallyError};

/// Analysis engine reached over HTTP.
#[derive(Debug)]
pub struct HttpEngine {
    client: reqwest::Client,
    url: String,
}

impl HttpEngine {
    /// Creates a client from the `[engine]` configuration section.
    pub fn new(config: &EngineConfig) -> Result<Self, TallyError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| TallyError::Config("engine.url is required".into()))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = config.auth_token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TallyError::Config(format!("invalid engine auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TallyError::Engine {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl AnalysisEngine for HttpEngine {
    async fn analyze(&self, request: AnalysisRequest) -> Result<EngineOutcome, TallyError> {
        debug!(
            files = request.attachment_paths.len(),
            "submitting analysis request"
        );

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TallyError::Engine {
                message: format!("engine request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "engine returned an error status");
            return Err(TallyError::Engine {
                message: format!("engine returned {status}: {body}"),
                source: None,
            });
        }

        let outcome: EngineOutcome = response.json().await.map_err(|e| TallyError::Engine {
            message: format!("malformed engine response: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(
            success = outcome.success,
            has_report = outcome.report_path.is_some(),
            "engine outcome received"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server_uri: &str, token: Option<&str>) -> EngineConfig {
        EngineConfig {
            url: Some(format!("{server_uri}/analyze")),
            auth_token: token.map(str::to_string),
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            query_text: "summarize sales".to_string(),
            attachment_paths: vec![PathBuf::from("/data/users/u1/data/sales.csv")],
            output_dir: PathBuf::from("/data/users/u1/output"),
            extra: None,
        }
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let err = HttpEngine::new(&EngineConfig::default()).unwrap_err();
        assert!(matches!(err, TallyError::Config(_)));
    }

    #[tokio::test]
    async fn successful_analysis_parses_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_partial_json(serde_json::json!({
                "query_text": "summarize sales",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "report_path": "/data/users/u1/output/report.md",
                "chart_paths": ["/data/users/u1/output/chart.png"],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = HttpEngine::new(&config(&server.uri(), None)).unwrap();
        let outcome = engine.analyze(request()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.report_path.as_deref(),
            Some(std::path::Path::new("/data/users/u1/output/report.md"))
        );
        assert_eq!(outcome.chart_paths.len(), 1);
    }

    #[tokio::test]
    async fn failed_analysis_is_ok_with_success_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error_message": "column 'revenue' not found",
            })))
            .mount(&server)
            .await;

        let engine = HttpEngine::new(&config(&server.uri(), None)).unwrap();
        let outcome = engine.analyze(request()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("column 'revenue' not found")
        );
    }

    #[tokio::test]
    async fn auth_token_becomes_bearer_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(header("authorization", "Bearer engine-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let engine = HttpEngine::new(&config(&server.uri(), Some("engine-key"))).unwrap();
        engine.analyze(request()).await.unwrap();
    }

    #[tokio::test]
    async fn http_error_status_is_an_engine_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let engine = HttpEngine::new(&config(&server.uri(), None)).unwrap();
        let err = engine.analyze(request()).await.unwrap_err();
        let rendered = format!("{err}");
        assert!(rendered.contains("500"));
    }

    #[tokio::test]
    async fn malformed_response_is_an_engine_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let engine = HttpEngine::new(&config(&server.uri(), None)).unwrap();
        let err = engine.analyze(request()).await.unwrap_err();
        assert!(format!("{err}").contains("malformed"));
    }
}
