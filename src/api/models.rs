use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::watchlist::{Frequency, Library, WatchedSeries};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub source_url: String,
    #[serde(default)]
    pub site: String,
    #[serde(default, deserialize_with = "placeholder_as_none")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "placeholder_as_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "placeholder_as_none")]
    pub description: Option<String>,
}

/// Scrapers fill unknown fields with "N/A"
fn placeholder_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("n/a")))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SitesResponse {
    #[serde(default)]
    pub sites: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UrlRequest<'a> {
    pub url: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TitleResponse {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadRequest {
    pub source_urls: Vec<String>,
    pub library: Library,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_folder_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub use_flaresolverr: bool,
    pub frequency: Frequency,
}

/// Handle for a task the backend queued
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub series_folder_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddSourceRequest<'a> {
    pub series_folder_name: &'a str,
    pub new_source_url: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemoveSeriesRequest<'a> {
    pub series_folder_name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemoveSourceRequest<'a> {
    pub series_folder_name: &'a str,
    pub source_url_to_remove: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshImageRequest {
    pub series_folder_name: String,
    pub source_url: String,
    pub library: Library,
    pub use_flaresolverr: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshMetadataRequest {
    pub series_folder_name: String,
    pub series_urls: Vec<String>,
    pub library: Library,
    pub use_flaresolverr: bool,
}

impl RefreshImageRequest {
    /// Cover refresh scrapes the first source only
    pub fn for_series(series: &WatchedSeries) -> Option<Self> {
        Some(Self {
            series_folder_name: series.series_folder_name.clone(),
            source_url: series.primary_url()?.to_string(),
            library: series.library,
            use_flaresolverr: series.use_flaresolverr,
        })
    }
}

impl RefreshMetadataRequest {
    pub fn for_series(series: &WatchedSeries) -> Self {
        Self {
            series_folder_name: series.series_folder_name.clone(),
            series_urls: series.series_urls.clone(),
            library: series.library,
            use_flaresolverr: series.use_flaresolverr,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkAddRequest {
    pub urls: Vec<String>,
    pub library: Library,
    pub frequency: Frequency,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusMessage {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WatchedResponse {
    #[serde(default)]
    pub watched_urls: Vec<WatchedSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub active_jobs: Vec<String>,
    #[serde(default)]
    pub scheduled_jobs: Vec<String>,
}

impl JobStatus {
    pub fn is_idle(&self) -> bool {
        self.active_jobs.is_empty() && self.scheduled_jobs.is_empty()
    }
}

/// Next planned run of each frequency pool. `None` means the pool never ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleStatus {
    pub next_runs: HashMap<Frequency, Option<NaiveDateTime>>,
}

impl ScheduleStatus {
    pub(crate) fn from_raw(raw: HashMap<String, Option<String>>) -> Self {
        let next_runs = raw
            .into_iter()
            .filter_map(|(pool, when)| {
                let frequency = pool.parse::<Frequency>().ok()?;
                let when = when.and_then(|w| w.parse::<NaiveDateTime>().ok());
                Some((frequency, when))
            })
            .collect();
        Self { next_runs }
    }

    pub fn next_run(&self, frequency: Frequency) -> Option<NaiveDateTime> {
        self.next_runs.get(&frequency).copied().flatten()
    }
}

/// The `metadata` block of the `series.json` the backend writes per series
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SeriesMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub year: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total_issues: u32,
    #[serde(default)]
    pub description_text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeriesJson {
    #[serde(default)]
    pub metadata: SeriesMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}
