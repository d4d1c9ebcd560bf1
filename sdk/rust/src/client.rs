use std::collections::BTreeMap;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A config unit as exchanged with the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUnit {
    pub name: String,
    pub value: Value,
    /// Descriptive fields (cn_name, value_type, options, ...) passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ConfigUnit {
    pub fn new(name: &str, value: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatacenterConfig {
    pub configs: BTreeMap<String, ConfigUnit>,
}

pub struct MirrorClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MirrorClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }

    /// Collection URL, or the URL of one unit with its name percent-encoded.
    fn config_url(&self, name: Option<&str>) -> Result<Url, Box<dyn std::error::Error>> {
        let mut url = Url::parse(&format!("{}/v2/configs/datacenter", self.base_url))?;
        if let Some(name) = name {
            url.path_segments_mut()
                .map_err(|_| format!("{} cannot be a base URL", self.base_url))?
                .push(name);
        }
        Ok(url)
    }

    /// Fetch every unit.
    pub async fn get_all(&self) -> Result<DatacenterConfig, Box<dyn std::error::Error>> {
        let resp = self.authed(self.client.get(self.config_url(None)?)).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Fetch one unit; `None` when absent.
    pub async fn get(&self, name: &str) -> Result<Option<ConfigUnit>, Box<dyn std::error::Error>> {
        let resp = self.authed(self.client.get(self.config_url(Some(name))?)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(resp).await?.json().await?))
    }

    /// Create or replace a unit, returning the store revision of the write.
    pub async fn put(&self, unit: &ConfigUnit) -> Result<i64, Box<dyn std::error::Error>> {
        let resp = self
            .authed(self.client.put(self.config_url(Some(&unit.name))?))
            .json(unit)
            .send()
            .await?;
        let body: Value = check(resp).await?.json().await?;
        body["revision"]
            .as_i64()
            .ok_or_else(|| "response carried no revision".into())
    }

    /// Write many units in one request.
    pub async fn put_all(
        &self,
        config: &DatacenterConfig,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let resp = self
            .authed(self.client.put(self.config_url(None)?))
            .json(config)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Delete a unit, returning whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, Box<dyn std::error::Error>> {
        let resp = self.authed(self.client.delete(self.config_url(Some(name))?)).send().await?;
        let body: Value = check(resp).await?.json().await?;
        Ok(body["deleted"].as_bool().unwrap_or(false))
    }

    /// Raw health check: status code and sync state body.
    pub async fn health(&self) -> Result<(u16, Value), reqwest::Error> {
        let resp = self.client.get(format!("{}/health", self.base_url)).send().await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    /// Send an arbitrary request without credentials.
    pub async fn unauthenticated_get(&self, path: &str) -> Result<Response, reqwest::Error> {
        self.client.get(format!("{}{}", self.base_url, path)).send().await
    }
}

async fn check(resp: Response) -> Result<Response, Box<dyn std::error::Error>> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(format!("Admin API returned error status {}: {}", status, text).into())
}
