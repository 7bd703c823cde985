//! Transport contract and the reqwest-backed implementation

use crate::errors::TransportError;
use crate::options::TransportOptions;
use crate::types::{ResponseBody, TransportRequest, TransportResponse};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, trace};
use url::Url;

/// Sends one request and reports status, latency and body
///
/// Implementations must be shareable across every virtual user of a run.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Transport backed by a single pooled reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(host: &str, options: TransportOptions) -> Result<Self, TransportError> {
        let base_url = Url::parse(host).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", host, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                host
            )));
        }

        debug!(
            host = %base_url,
            timeout_secs = options.timeout.as_secs(),
            pool = options.max_idle_per_host,
            "Creating HTTP transport"
        );

        let client = options.build_client()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path against the host, keeping any base path prefix
    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        };
        Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", joined, e)))
    }

    fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_str(name)
                .map_err(|_| TransportError::InvalidHeaderName(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeaderValue(name.clone()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        let headers = Self::header_map(&request.headers)?;

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();

        let mut response_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        let bytes = response.bytes().await?;
        let latency = start.elapsed();

        trace!(
            method = %request.method,
            path = %request.path,
            status,
            latency_ms = latency.as_millis() as u64,
            "Response received"
        );

        Ok(TransportResponse {
            status,
            latency,
            headers: response_headers,
            body: ResponseBody::from_bytes(&bytes),
        })
    }
}
