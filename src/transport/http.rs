//! REST transport over reqwest

use crate::config::HttpConfig;
use crate::core::record::RecordId;
use crate::error::{Error, Result};
use crate::transport::{sub_resource_path, Transport};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Transport talking JSON to a REST server
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a client from the HTTP section of the configuration
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(response.url().to_string()));
        }
        if !status.is_success() {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("{status} from {url}: {body}")));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_collection(&self, resource: &str) -> Result<Vec<Value>> {
        self.get_json(resource).await
    }

    async fn fetch_sub_resource(
        &self,
        parent: &str,
        parent_id: RecordId,
        child: &str,
    ) -> Result<Vec<Value>> {
        self.get_json(&sub_resource_path(parent, parent_id, child))
            .await
    }

    async fn create_record(&self, resource: &str, payload: Value) -> Result<Value> {
        let url = self.url(resource);
        debug!(%url, "POST");
        let response = self.client.post(&url).json(&payload).send().await?;
        Self::read_json(response).await
    }

    async fn delete_record(&self, resource: &str, id: RecordId) -> Result<Value> {
        let url = self.url(&format!("{resource}/{id}"));
        debug!(%url, "DELETE");
        let response = self.client.delete(&url).send().await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        Self::read_json(response).await
    }
}
