use super::{CacheError, Request, Response};
use crate::config::OfflineConfig;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::Duration;

/// The network, as far as the offline cache is concerned
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| CacheError::Network(format!("Invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CacheError::Network(format!("{} {}: {}", request.method, request.url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::Network(format!("Failed to read body of {}: {}", request.url, e)))?
            .to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

pub fn create_transport(config: &OfflineConfig) -> Result<Arc<dyn Transport>, CacheError> {
    let transport = HttpTransport::new(Duration::from_secs(config.fetch_timeout_secs))?;
    Ok(Arc::new(transport))
}
