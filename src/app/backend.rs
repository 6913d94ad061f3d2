//! HTTP client for the crawl service.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::error::{Result, WatchError};
use super::model::PollResponse;

/// Number of URLs and links already received, sent back as `url_since` and
/// `link_since`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaCursor {
    pub url_since: usize,
    pub link_since: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Start { url: String },
    Pause,
    Resume,
    Stop,
}

impl ControlAction {
    pub fn label(&self) -> &'static str {
        match self {
            ControlAction::Start { .. } => "start",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Stop => "stop",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            ControlAction::Start { .. } => "api/start_crawl",
            ControlAction::Pause => "api/pause_crawl",
            ControlAction::Resume => "api/resume_crawl",
            ControlAction::Stop => "api/stop_crawl",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ControlReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// What the poller and the UI need from the crawl service.
pub trait CrawlBackend: Send + Sync + 'static {
    /// `None` asks for the full snapshot.
    fn fetch_update(
        &self,
        since: Option<DeltaCursor>,
    ) -> impl Future<Output = Result<PollResponse>> + Send;

    fn control(&self, action: ControlAction) -> impl Future<Output = Result<ControlReply>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("crawlwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn status_url(&self, since: Option<DeltaCursor>) -> Result<Url> {
        let mut url = self.base.join("api/crawl_status")?;
        if let Some(cursor) = since {
            url.query_pairs_mut()
                .append_pair("url_since", &cursor.url_since.to_string())
                .append_pair("link_since", &cursor.link_since.to_string());
        }
        Ok(url)
    }
}

impl CrawlBackend for HttpBackend {
    async fn fetch_update(&self, since: Option<DeltaCursor>) -> Result<PollResponse> {
        let url = self.status_url(since)?;
        let res = self.client.get(url.clone()).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(WatchError::BackendStatus {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            });
        }
        let body = res.bytes().await?;
        debug!(bytes = body.len(), since = ?since, "fetched crawl status");
        Ok(PollResponse::from_slice(&body)?)
    }

    async fn control(&self, action: ControlAction) -> Result<ControlReply> {
        let url = self.base.join(action.path())?;
        let request = match &action {
            ControlAction::Start { url: target } => {
                self.client.post(url.clone()).json(&json!({ "url": target }))
            }
            _ => self.client.post(url.clone()),
        };
        let res = request.send().await?;
        let status = res.status();
        let body = res.bytes().await?;
        let reply = serde_json::from_slice::<ControlReply>(&body).unwrap_or_default();
        if !status.is_success() || !reply.success {
            let message = if reply.message.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                reply.message
            };
            return Err(WatchError::Rejected {
                action: action.label().to_string(),
                message,
            });
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_url_carries_delta_offsets() {
        let backend = HttpBackend::new("http://localhost:5000", Duration::from_secs(5)).unwrap();
        assert_eq!(
            backend.status_url(None).unwrap().as_str(),
            "http://localhost:5000/api/crawl_status"
        );
        let url = backend
            .status_url(Some(DeltaCursor {
                url_since: 120,
                link_since: 4031,
            }))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/crawl_status?url_since=120&link_since=4031"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let backend =
            HttpBackend::new("https://tools.example.com/crawler", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base().as_str(), "https://tools.example.com/crawler/");
        assert_eq!(
            backend.status_url(None).unwrap().as_str(),
            "https://tools.example.com/crawler/api/crawl_status"
        );
    }

    #[test]
    fn invalid_base_is_an_error() {
        assert!(matches!(
            HttpBackend::new("not a url", Duration::from_secs(1)),
            Err(WatchError::BaseUrl(_))
        ));
    }

    #[test]
    fn control_reply_defaults() {
        let reply: ControlReply = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(reply.success);
        assert!(reply.message.is_empty());
        assert_eq!(ControlAction::Pause.label(), "pause");
        assert_eq!(
            ControlAction::Start {
                url: "https://example.com".into()
            }
            .path(),
            "api/start_crawl"
        );
    }
}
