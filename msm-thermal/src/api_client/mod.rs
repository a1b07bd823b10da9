//! HTTP client for the thermal daemon API.

pub mod types;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::thermal::ThermalConfig;
use types::{ConfigPatchRequest, ConfigValue, ControllerStatus, SetValueRequest};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7786";

pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("request failed with {status}: {body}");
        }
        response.json().await.context("malformed response body")
    }

    pub async fn get_status(&self) -> Result<ControllerStatus> {
        let response = self.http.get(self.url("/status")).send().await?;
        Self::decode(response).await
    }

    pub async fn get_config(&self) -> Result<ThermalConfig> {
        let response = self.http.get(self.url("/config")).send().await?;
        Self::decode(response).await
    }

    pub async fn get_value(&self, key: &str) -> Result<ConfigValue> {
        let response = self
            .http
            .get(self.url(&format!("/config/{key}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn set_value(&self, key: &str, value: i64) -> Result<ConfigValue> {
        let response = self
            .http
            .put(self.url(&format!("/config/{key}")))
            .json(&SetValueRequest { value })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn patch_config(&self, patch: &ConfigPatchRequest) -> Result<ThermalConfig> {
        let response = self
            .http
            .patch(self.url("/config"))
            .json(patch)
            .send()
            .await?;
        Self::decode(response).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
