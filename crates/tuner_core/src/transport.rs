use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use shared::{
    domain::ParameterValue,
    protocol::{
        ArtifactKind, SliderUpdate, SnapshotBody, CACHE_BUSTER_PARAM, SLIDER_PATH,
        SUBMIT_COLOUR_PATH,
    },
};
use url::Url;

use crate::{cache_buster::CacheBuster, error::SessionError};

/// The server that owns the authoritative parameter snapshot.
///
/// Every method maps to one request/response exchange. Non-success statuses
/// are reported as errors; callers decide whether they are fatal.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<SnapshotBody>;
    async fn write_parameter(&self, key: &str, value: ParameterValue) -> Result<()>;
    async fn fetch_artifact(&self, kind: ArtifactKind, token: u64) -> Result<Vec<u8>>;
    async fn commit(&self, name: &str) -> Result<()>;
}

pub struct HttpRemoteAuthority {
    http: Client,
    server_url: String,
    cache_buster: Arc<CacheBuster>,
}

impl HttpRemoteAuthority {
    pub fn new(server_url: &str, timeout: Option<Duration>) -> Result<Self, SessionError> {
        let parsed = Url::parse(server_url).map_err(|source| SessionError::InvalidServerUrl {
            url: server_url.to_string(),
            source,
        })?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self::with_client(
            builder.build()?,
            parsed.as_str(),
            Arc::new(CacheBuster::new()),
        ))
    }

    pub fn with_client(
        http: Client,
        server_url: impl Into<String>,
        cache_buster: Arc<CacheBuster>,
    ) -> Self {
        let server_url: String = server_url.into();
        Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            cache_buster,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemoteAuthority {
    async fn fetch_snapshot(&self) -> Result<SnapshotBody> {
        let token = self.cache_buster.next();
        let snapshot = self
            .http
            .get(self.endpoint(SLIDER_PATH))
            .query(&[(CACHE_BUSTER_PARAM, token)])
            .send()
            .await
            .context("failed to request parameter snapshot")?
            .error_for_status()
            .context("parameter snapshot rejected")?
            .json::<SnapshotBody>()
            .await
            .context("malformed parameter snapshot")?;
        Ok(snapshot)
    }

    async fn write_parameter(&self, key: &str, value: ParameterValue) -> Result<()> {
        self.http
            .post(self.endpoint(SLIDER_PATH))
            .json(&SliderUpdate {
                slider_name: key.to_string(),
                slider_value: value,
            })
            .send()
            .await
            .with_context(|| format!("failed to send {key}={value}"))?
            .error_for_status()
            .with_context(|| format!("update {key}={value} rejected"))?;
        Ok(())
    }

    async fn fetch_artifact(&self, kind: ArtifactKind, token: u64) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .get(self.endpoint(kind.path()))
            .query(&[(CACHE_BUSTER_PARAM, token)])
            .send()
            .await
            .with_context(|| format!("failed to request {} image", kind.file_stem()))?
            .error_for_status()
            .with_context(|| format!("{} image request rejected", kind.file_stem()))?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn commit(&self, name: &str) -> Result<()> {
        self.http
            .post(self.endpoint(SUBMIT_COLOUR_PATH))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(name.to_string())
            .send()
            .await
            .context("failed to submit configuration")?
            .error_for_status()
            .context("configuration submit rejected")?;
        Ok(())
    }
}
