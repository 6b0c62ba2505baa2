//! HTTP baseline store
//!
//! Routes, relative to the configured base URL:
//!
//! | Method | Path                                 | Body                 |
//! |--------|--------------------------------------|----------------------|
//! | PUT    | `blobs/{hash}`                       | artifact bytes       |
//! | GET    | `blobs/{hash}`                       |                      |
//! | PUT    | `suites/{suite}/versions/{version}`  | `Baseline` JSON      |
//! | GET    | `suites/{suite}/versions/{version}`  |                      |
//! | GET    | `suites/{suite}/versions`            |                      |
//! | GET    | `suites/{suite}/latest`              |                      |
//!
//! Every request carries the API key as a bearer token.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use driftwatch_core::{Baseline, CaseResult, RemoteConfig, Version};

use super::{BaselineStore, StoreResult, blob_hashes, is_sha256_hex};
use crate::error::StoreError;

/// Baseline store served over HTTP
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct LatestResponse {
    version: Version,
}

impl RemoteStore {
    /// Store for the endpoint in `config`, which must carry an API key
    pub fn new(config: &RemoteConfig) -> StoreResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StoreError::AuthFailure {
                message: format!("no API key configured for {}", config.url),
            })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        suite: &str,
        version: &str,
    ) -> StoreResult<Response> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::AuthFailure {
                    message: format!("{} {}", status, body.trim()),
                })
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                suite: suite.to_string(),
                version: version.to_string(),
            }),
            StatusCode::CONFLICT => Err(StoreError::VersionConflict {
                suite: suite.to_string(),
                version: version.to_string(),
            }),
            _ => match response.error_for_status() {
                Err(err) => Err(StoreError::Transport(err)),
                Ok(response) => Ok(response),
            },
        }
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> StoreResult<T> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| StoreError::Corrupt {
            location: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn put_blob(&self, hash: &str, data: &[u8], suite: &str, version: &str) -> StoreResult<()> {
        let request = self.client.put(self.url(&format!("blobs/{}", hash))).body(data.to_vec());
        match self.send(request, suite, version).await {
            // The server already holds these bytes.
            Ok(_) | Err(StoreError::VersionConflict { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl BaselineStore for RemoteStore {
    async fn put(&self, baseline: &Baseline) -> StoreResult<()> {
        let suite = baseline.suite.as_str();
        let version = baseline.version.as_str();

        for result in &baseline.results {
            for (hash, data) in &result.artifacts {
                self.put_blob(hash, data, suite, version).await?;
            }
        }

        let request = self
            .client
            .put(self.url(&format!("suites/{}/versions/{}", suite, version)))
            .json(baseline);
        self.send(request, suite, version).await?;

        tracing::info!(url = %self.base_url, suite, version, "Uploaded baseline");
        Ok(())
    }

    async fn get(&self, suite: &str, version: &Version) -> StoreResult<Baseline> {
        let url = self.url(&format!("suites/{}/versions/{}", suite, version));
        let response = self
            .send(self.client.get(&url), suite, version.as_str())
            .await?;
        Self::decode(&url, response).await
    }

    async fn latest_version(&self, suite: &str) -> StoreResult<Version> {
        let url = self.url(&format!("suites/{}/latest", suite));
        let response = self.send(self.client.get(&url), suite, "latest").await?;
        let latest: LatestResponse = Self::decode(&url, response).await?;
        Ok(latest.version)
    }

    async fn versions(&self, suite: &str) -> StoreResult<Vec<Version>> {
        let url = self.url(&format!("suites/{}/versions", suite));
        let response = match self.send(self.client.get(&url), suite, "*").await {
            Ok(response) => response,
            Err(StoreError::NotFound { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut versions: Vec<Version> = Self::decode(&url, response).await?;
        versions.sort();
        Ok(versions)
    }

    async fn load_artifacts(&self, result: &mut CaseResult) -> StoreResult<()> {
        let hashes: Vec<String> = blob_hashes(result).map(str::to_string).collect();
        for hash in hashes {
            if result.artifacts.contains_key(&hash) || !is_sha256_hex(&hash) {
                continue;
            }
            let url = self.url(&format!("blobs/{}", hash));
            let response = match self
                .send(self.client.get(&url), &result.testcase_id, &hash)
                .await
            {
                Ok(response) => response,
                Err(StoreError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            };
            let data = response.bytes().await?.to_vec();
            if driftwatch_core::value::sha256_hex(&data) != hash {
                return Err(StoreError::Corrupt {
                    location: url,
                    message: "blob content does not match its hash".to_string(),
                });
            }
            result.artifacts.insert(hash, data);
        }
        Ok(())
    }
}
