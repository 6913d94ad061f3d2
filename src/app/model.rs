//! Record types shared by the store, the filters and the tables.
//!
//! Everything the backend sends passes through these structs. Fields are
//! explicit and default when absent or `null`; malformed elements inside a
//! collection are dropped one by one instead of failing the whole response.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    #[default]
    #[serde(other)]
    Idle,
}

impl RunStatus {
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    #[default]
    #[serde(other)]
    Info,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Error, Severity::Warning, Severity::Info];

    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsFlags {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub gtag: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub ga4_id: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub google_analytics: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub gtm_id: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub facebook_pixel: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub hotjar: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub mixpanel: bool,
}

impl AnalyticsFlags {
    pub fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.gtag || self.ga4_id {
            out.push("GA4");
        }
        if self.google_analytics {
            out.push("GA");
        }
        if self.gtm_id {
            out.push("GTM");
        }
        if self.facebook_pixel {
            out.push("FB");
        }
        if self.hotjar {
            out.push("HJ");
        }
        if self.mixpanel {
            out.push("MP");
        }
        out
    }
}

/// One crawled URL. `url` is the unique key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub url: String,
    /// `None` for failed or timed out fetches (backend sends 0, null or text).
    #[serde(default, deserialize_with = "lenient_status")]
    pub status_code: Option<u16>,
    #[serde(default, deserialize_with = "nullable")]
    pub content_type: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub size: u64,
    #[serde(default, deserialize_with = "lenient_float")]
    pub response_time: f64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub depth: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub meta_description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub h1: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub h2: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub h3: Vec<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub word_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub canonical_url: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub internal_links: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub external_links: u64,
    /// Number of JSON-LD blocks; the backend sends the blocks themselves.
    #[serde(default, deserialize_with = "lenient_count")]
    pub json_ld: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub images: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub analytics: AnalyticsFlags,
    /// Lowercased host without `www.`, filled at ingestion.
    #[serde(skip)]
    pub host: Option<String>,
}

impl Resource {
    /// Normalizes the key and caches the comparison host. Returns `false`
    /// when the URL is not an absolute http(s) URL.
    pub fn prepare(&mut self) -> bool {
        let Some(url) = normalize_url(&self.url) else {
            return false;
        };
        self.host = host_key(&url);
        self.url = url;
        true
    }
}

/// Directed edge keyed by `(source_url, target_url)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source_url: String,
    pub target_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub anchor_text: String,
    /// Backend's own classification; only used while the base host is unknown.
    #[serde(default, deserialize_with = "lenient")]
    pub is_internal: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub target_domain: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub target_status: Option<u16>,
    #[serde(default, deserialize_with = "nullable")]
    pub placement: String,
    #[serde(skip)]
    pub target_host: Option<String>,
}

impl Link {
    pub fn prepare(&mut self) -> bool {
        let (Some(source), Some(target)) = (
            normalize_url(&self.source_url),
            normalize_url(&self.target_url),
        ) else {
            return false;
        };
        self.target_host = host_key(&target);
        if self.target_domain.trim().is_empty() {
            self.target_domain = Url::parse(&target)
                .ok()
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
                .unwrap_or_default();
        }
        self.source_url = source;
        self.target_url = target;
        true
    }

    pub fn key(&self) -> (String, String) {
        (self.source_url.clone(), self.target_url.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "nullable")]
    pub category: String,
    #[serde(default, deserialize_with = "nullable")]
    pub issue: String,
    #[serde(default, deserialize_with = "nullable")]
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSpeedResult {
    pub url: String,
    #[serde(default, alias = "performance_score", deserialize_with = "lenient")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub strategy: Option<String>,
}

/// Stats block as sent on the wire. Absent values keep the previous ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsPayload {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub discovered: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub crawled: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub depth: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(
        default,
        rename = "baseUrl",
        alias = "base_url",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_vec",
        skip_serializing_if = "Option::is_none"
    )]
    pub pagespeed_results: Option<Vec<PageSpeedResult>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStats {
    pub discovered: u64,
    pub crawled: u64,
    pub depth: u64,
    pub speed: f64,
    pub base_url: Option<String>,
    pub pagespeed: BTreeMap<String, PageSpeedResult>,
}

impl CrawlStats {
    pub fn absorb(&mut self, payload: StatsPayload) {
        if let Some(discovered) = payload.discovered {
            self.discovered = discovered;
        }
        if let Some(crawled) = payload.crawled {
            self.crawled = crawled;
        }
        if let Some(depth) = payload.depth {
            self.depth = depth;
        }
        if let Some(speed) = payload.speed {
            self.speed = speed;
        }
        if let Some(base_url) = payload.base_url.filter(|url| !url.trim().is_empty()) {
            self.base_url = Some(base_url);
        }
        if let Some(results) = payload.pagespeed_results {
            for result in results {
                self.pagespeed.insert(result.url.clone(), result);
            }
        }
    }

    pub fn to_payload(&self) -> StatsPayload {
        StatsPayload {
            discovered: Some(self.discovered),
            crawled: Some(self.crawled),
            depth: Some(self.depth),
            speed: Some(self.speed),
            base_url: self.base_url.clone(),
            pagespeed_results: if self.pagespeed.is_empty() {
                None
            } else {
                Some(self.pagespeed.values().cloned().collect())
            },
        }
    }
}

/// One status response, full or incremental.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub is_running_pagespeed: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub progress: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub paused: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub stats: Option<StatsPayload>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub urls: Vec<Resource>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub links: Vec<Link>,
    /// `None` when the key is missing: the current issue list stays.
    #[serde(default, deserialize_with = "lenient_opt_vec")]
    pub issues: Option<Vec<Issue>>,
}

impl PollResponse {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Absolute http(s) URL with the fragment dropped.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut url = Url::parse(trimmed).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// Host used for internal/external comparison: lowercase, no leading `www.`.
pub fn host_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    })
}

pub(crate) fn coerce_items<T: DeserializeOwned>(items: Vec<Value>, kind: &str) -> Vec<T> {
    let total = items.len();
    let out = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<T>(item).ok())
        .collect::<Vec<_>>();
    if out.len() != total {
        debug!(kind, dropped = total - out.len(), "dropped malformed records");
    }
    out
}

fn nullable<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.and_then(|value| match value {
        Value::String(ref text) => serde_json::from_value(value.clone())
            .ok()
            .or_else(|| serde_json::from_str(text.trim()).ok()),
        other => serde_json::from_value(other).ok(),
    }))
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn status_from_value(value: &Value) -> Option<u16> {
    let code = number_of(value)?;
    if code.fract() != 0.0 || !(100.0..=999.0).contains(&code) {
        return None;
    }
    Some(code as u16)
}

fn lenient_status<'de, D>(de: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.as_ref().and_then(status_from_value))
}

fn lenient_count<'de, D>(de: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(Value::Array(items)) => items.len() as u64,
        Some(Value::Object(map)) => map.len() as u64,
        Some(other) => number_of(&other)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n as u64)
            .unwrap_or(0),
        None => 0,
    })
}

fn lenient_float<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value
        .as_ref()
        .and_then(number_of)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0))
}

fn lenient_flag<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(Value::Bool(flag)) => flag,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Null) | None => false,
    })
}

fn lenient_strings<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        Some(Value::String(text)) if !text.is_empty() => vec![text],
        _ => Vec::new(),
    })
}

fn lenient_vec<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(lenient_opt_vec(de)?.unwrap_or_default())
}

fn lenient_opt_vec<'de, D, T>(de: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(coerce_items(items, std::any::type_name::<T>())),
        _ => None,
    })
}
