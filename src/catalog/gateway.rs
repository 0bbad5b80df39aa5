use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::remote::{RemoteAsset, RemoteLibrary, SignIn};

/// [`RemoteLibrary`] over the photo gateway's JSON API.
pub struct HttpLibrary {
    base: String,
    client: Client,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
    #[serde(default)]
    second_factor_required: bool,
}

#[derive(Debug, Deserialize)]
struct SecondFactorResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetList {
    assets: Vec<RemoteAsset>,
}

impl HttpLibrary {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("epaper-photo-frame/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base: endpoint.trim_end_matches('/').to_string(),
            client,
            token: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    /// `{base}/assets/{id}/original` with `id` encoded as one path segment.
    fn original_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base)
            .with_context(|| format!("invalid gateway endpoint {}", self.base))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("gateway endpoint {} cannot hold a path", self.base))?
            .pop_if_empty()
            .extend(["assets", id, "original"]);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl RemoteLibrary for HttpLibrary {
    fn resume_session(&mut self, token: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url("session"))
            .bearer_auth(token)
            .send()
            .context("session check failed")?;
        match response.status() {
            status if status.is_success() => {
                self.token = Some(token.to_string());
                Ok(true)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => anyhow::bail!("session check returned {status}"),
        }
    }

    fn sign_in(&mut self, account: &str, password: &str) -> Result<SignIn> {
        let session: SessionResponse = self
            .client
            .post(self.url("session"))
            .json(&json!({ "account": account, "password": password }))
            .send()
            .context("sign-in request failed")?
            .error_for_status()
            .context("sign-in rejected")?
            .json()
            .context("malformed sign-in response")?;
        self.token = Some(session.token);
        Ok(if session.second_factor_required {
            SignIn::SecondFactorRequired
        } else {
            SignIn::Complete
        })
    }

    fn validate_second_factor(&mut self, code: &str) -> Result<bool> {
        let response = self
            .authorized(self.client.post(self.url("session/second-factor")))
            .json(&json!({ "code": code }))
            .send()
            .context("second-factor request failed")?;
        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(false);
        }
        let body: SecondFactorResponse = response
            .error_for_status()
            .context("second-factor check rejected")?
            .json()
            .context("malformed second-factor response")?;
        if let Some(token) = body.token {
            self.token = Some(token);
        }
        Ok(true)
    }

    fn session_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn list_assets(&mut self) -> Result<Vec<RemoteAsset>> {
        let list: AssetList = self
            .authorized(self.client.get(self.url("assets")))
            .send()
            .context("asset listing failed")?
            .error_for_status()
            .context("asset listing rejected")?
            .json()
            .context("malformed asset listing")?;
        debug!(count = list.assets.len(), "gateway listed assets");
        Ok(list.assets)
    }

    fn download_original(&mut self, asset: &RemoteAsset) -> Result<Box<dyn Read + Send>> {
        let url = self.original_url(&asset.id)?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .with_context(|| format!("download of {} failed", asset.id))?
            .error_for_status()
            .with_context(|| format!("download of {} rejected", asset.id))?;
        Ok(Box::new(response))
    }
}
