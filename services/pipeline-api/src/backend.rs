//! Seam to the remote compute backend.
//!
//! The backend evaluates composites, band math and renders; this service only
//! decides what to ask for and keeps references to what it produced.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use geo_common::{ErrorKind, RegionGeometry};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use vis_normalizer::VisualizationSpec;

use crate::presets::{CloudMask, Rescale};

/// Opaque reference to an object living on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendObject {
    pub id: String,

    /// Bands of the object, when the backend reports them.
    #[serde(default)]
    pub band_names: Vec<String>,
}

/// Per-pixel reduction over the filtered time range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    #[default]
    Median,
    Mean,
    /// Most recent valid pixel wins.
    Mosaic,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRequest {
    pub dataset: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub geometry: RegionGeometry,
    pub reducer: Reducer,
    /// Bands to keep; empty keeps all.
    pub bands: Vec<String>,
    pub cloud_mask: Option<CloudMask>,
    /// Skip scenes with more cloud cover than this.
    pub max_cloud_percent: Option<f64>,
    pub rescale: Option<Rescale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMathRequest {
    pub source: BackendObject,
    /// Expression over variable names, e.g. `(NIR - RED) / (NIR + RED)`.
    pub expression: String,
    /// Variable name to source band.
    pub bindings: BTreeMap<String, String>,
    pub output_band: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub source: BackendObject,
    pub geometry: Option<RegionGeometry>,
    pub vis: VisualizationSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    /// Tile or image URL served by the backend.
    pub url: String,
}

/// Errors reported by the compute backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Compute backend unavailable: {0}")]
    Unavailable(String),

    #[error("Compute backend request timed out")]
    Timeout,

    #[error("Compute backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid compute backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
            BackendError::Timeout => ErrorKind::UpstreamTimeout,
            BackendError::Rejected { status, .. } if (400..500).contains(status) => {
                ErrorKind::MalformedInput
            }
            BackendError::Rejected { .. } => ErrorKind::UpstreamUnavailable,
            BackendError::InvalidResponse(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_decode() {
            BackendError::InvalidResponse(err.to_string())
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}

/// Operations the compute backend offers.
#[async_trait]
pub trait ComputeBackend: Send + Sync + 'static {
    /// Filter a collection by date and region and reduce it to one image.
    async fn composite(&self, request: CompositeRequest) -> Result<BackendObject, BackendError>;

    /// Evaluate a band-math expression over an existing object.
    async fn band_math(&self, request: BandMathRequest) -> Result<BackendObject, BackendError>;

    /// Render an object with display parameters.
    async fn render(&self, request: RenderRequest) -> Result<RenderOutput, BackendError>;
}

/// JSON-over-HTTP client for the compute backend.
///
/// Each operation is a `POST {base_url}/v1/{operation}`.
pub struct HttpComputeBackend {
    client: Client,
    base_url: String,
}

impl HttpComputeBackend {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, body), fields(base_url = %self.base_url))]
    async fn call<Req, Resp>(&self, operation: &'static str, body: &Req) -> Result<Resp, BackendError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/v1/{}", self.base_url, operation);
        debug!(url = %url, "Calling compute backend");

        let start = Instant::now();
        let result = self.client.post(&url).json(body).send().await;
        metrics::histogram!("backend_call_duration_seconds", "operation" => operation)
            .record(start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            metrics::counter!("backend_call_errors_total", "operation" => operation).increment(1);
            BackendError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::counter!("backend_call_errors_total", "operation" => operation).increment(1);
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ComputeBackend for HttpComputeBackend {
    async fn composite(&self, request: CompositeRequest) -> Result<BackendObject, BackendError> {
        self.call("composite", &request).await
    }

    async fn band_math(&self, request: BandMathRequest) -> Result<BackendObject, BackendError> {
        self.call("band_math", &request).await
    }

    async fn render(&self, request: RenderRequest) -> Result<RenderOutput, BackendError> {
        self.call("render", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BackendError::Timeout.kind(), ErrorKind::UpstreamTimeout);
        assert!(BackendError::Unavailable("refused".into()).kind().is_retryable());

        let rejected = BackendError::Rejected {
            status: 422,
            message: "unknown band".into(),
        };
        assert_eq!(rejected.kind(), ErrorKind::MalformedInput);

        let failed = BackendError::Rejected {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(failed.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpComputeBackend::new("http://backend:8090/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://backend:8090");
    }

    #[test]
    fn test_object_without_bands() {
        let object: BackendObject = serde_json::from_str(r#"{"id": "obj-1"}"#).unwrap();
        assert!(object.band_names.is_empty());
    }
}
