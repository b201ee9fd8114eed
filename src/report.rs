use crate::config::Config;
use crate::snapshot::SystemSnapshot;
use reqwest::{header, Client, StatusCode, Url};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid report url {url}: {reason}")]
    Url { url: String, reason: String },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to send report: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status code: {0}")]
    Status(StatusCode),
}

/// Posts whole snapshots to the collector endpoint. No retries: an unsent
/// snapshot only survives in the local store.
pub struct Reporter {
    client: Client,
    url: Url,
    token: String,
}

impl Reporter {
    pub fn new(cfg: &Config) -> Result<Self, ReportError> {
        let url = Url::parse(&cfg.url).map_err(|e| ReportError::Url {
            url: cfg.url.clone(),
            reason: e.to_string(),
        })?;
        let mut builder = Client::builder()
            .user_agent(concat!("hostpulse/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(cfg.insecure_skip_verify);
        if let Some(timeout) = cfg.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ReportError::Client)?;

        Ok(Self {
            client,
            url,
            token: cfg.token.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    pub async fn send(&self, snapshot: &SystemSnapshot) -> Result<(), ReportError> {
        let resp = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, "application/json")
            .json(snapshot)
            .send()
            .await
            .map_err(ReportError::Transport)?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ReportError::Status(status));
        }
        info!(url = %self.url, "report sent");
        Ok(())
    }
}
