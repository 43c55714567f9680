pub mod models;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

pub use models::{
    BulkAddRequest, DownloadRequest, JobStatus, JobTicket, RefreshImageRequest,
    RefreshMetadataRequest, ScheduleStatus, SearchResult, SeriesMetadata,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::watchlist::{Library, WatchedSeries};
use models::{
    AddSourceRequest, ErrorBody, RemoveSeriesRequest, RemoveSourceRequest, SearchResponse,
    SeriesJson, SitesResponse, StatusMessage, TitleResponse, UrlRequest, WatchedResponse,
};

const MIN_SEARCH_TERM: usize = 3;

/// Client for the download backend's REST API
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("mangawatch/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.backend_url(),
            Duration::from_secs(config.backend.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// Search every configured site, or only `site` when given
    pub async fn search(&self, term: &str, site: Option<&str>, limit: u32) -> Result<Vec<SearchResult>> {
        let term = term.trim();
        if term.chars().count() < MIN_SEARCH_TERM {
            return Err(Error::SearchTermTooShort);
        }

        let mut query = vec![
            ("term", term.to_string()),
            ("limit", limit.clamp(1, 50).to_string()),
        ];
        if let Some(site) = site {
            query.push(("site", site.to_string()));
        }

        debug!(term = %term, ?site, "Searching backend");
        let response: SearchResponse = self
            .send_json(self.client.get(self.url("/api/search")).query(&query))
            .await?;
        Ok(response.results)
    }

    pub async fn sites(&self) -> Result<Vec<String>> {
        let response: SitesResponse = self.send_json(self.client.get(self.url("/api/sites"))).await?;
        Ok(response.sites)
    }

    /// Ask the backend to scrape the series title behind a source URL
    pub async fn title_from_url(&self, url: &str) -> Result<String> {
        let response: TitleResponse = self
            .send_json(
                self.client
                    .post(self.url("/api/get_title_from_url"))
                    .json(&UrlRequest { url }),
            )
            .await?;
        Ok(response.title)
    }

    pub async fn download(&self, request: &DownloadRequest) -> Result<JobTicket> {
        debug!(urls = request.source_urls.len(), folder = ?request.series_folder_name, "Queueing download");
        self.send_json(self.client.post(self.url("/api/download")).json(request))
            .await
    }

    pub async fn add_source(&self, series_folder_name: &str, new_source_url: &str) -> Result<String> {
        let response: StatusMessage = self
            .send_json(
                self.client
                    .post(self.url("/api/add_source_to_series"))
                    .json(&AddSourceRequest {
                        series_folder_name,
                        new_source_url,
                    }),
            )
            .await?;
        Ok(response.message)
    }

    pub async fn watched(&self) -> Result<Vec<WatchedSeries>> {
        let response: WatchedResponse = self
            .send_json(self.client.get(self.url("/api/watched_urls")))
            .await?;
        Ok(response.watched_urls)
    }

    pub async fn remove_series(&self, series_folder_name: &str) -> Result<String> {
        let response: StatusMessage = self
            .send_json(
                self.client
                    .delete(self.url("/api/watched_urls"))
                    .json(&RemoveSeriesRequest { series_folder_name }),
            )
            .await?;
        Ok(response.message)
    }

    /// Removing the last source stops the backend watching the series
    pub async fn remove_source(&self, series_folder_name: &str, source_url: &str) -> Result<String> {
        let response: StatusMessage = self
            .send_json(
                self.client
                    .post(self.url("/api/remove_source_from_series"))
                    .json(&RemoveSourceRequest {
                        series_folder_name,
                        source_url_to_remove: source_url,
                    }),
            )
            .await?;
        Ok(response.message)
    }

    pub async fn refresh_image(&self, request: &RefreshImageRequest) -> Result<JobTicket> {
        self.send_json(self.client.post(self.url("/api/refresh_image")).json(request))
            .await
    }

    pub async fn refresh_metadata(&self, request: &RefreshMetadataRequest) -> Result<JobTicket> {
        self.send_json(self.client.post(self.url("/api/refresh_metadata")).json(request))
            .await
    }

    /// Metadata the backend stored next to the downloaded chapters
    pub async fn series_metadata(&self, series_folder_name: &str, library: Library) -> Result<SeriesMetadata> {
        let path = format!(
            "/api/series_metadata/{}",
            urlencoding::encode(series_folder_name)
        );
        let response: SeriesJson = self
            .send_json(
                self.client
                    .get(self.url(&path))
                    .query(&[("library", library.as_str())]),
            )
            .await?;
        Ok(response.metadata)
    }

    pub async fn job_status(&self) -> Result<JobStatus> {
        self.send_json(self.client.get(self.url("/api/job_status")))
            .await
    }

    pub async fn schedule_status(&self) -> Result<ScheduleStatus> {
        let raw: HashMap<String, Option<String>> = self
            .send_json(self.client.get(self.url("/api/schedule_status")))
            .await?;
        Ok(ScheduleStatus::from_raw(raw))
    }

    pub async fn bulk_add(&self, request: &BulkAddRequest) -> Result<String> {
        if request.urls.is_empty() {
            return Err(Error::EmptyImport);
        }

        let response: StatusMessage = self
            .send_json(self.client.post(self.url("/api/bulk_add")).json(request))
            .await?;
        Ok(response.message)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Backend {
        status: status.as_u16(),
        detail: error_detail(&body).unwrap_or_else(|| status.to_string()),
    })
}

/// Pull the message out of a `{"detail": ...}` error body
fn error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchlist::Frequency;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one HTTP request with `status` and `body`, handing back the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (BackendClient, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];

            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });

        let client = BackendClient::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
        (client, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"Series not found."}"#).as_deref(),
            Some("Series not found.")
        );
        assert!(error_detail("<html>oops</html>").is_none());
        assert!(error_detail(r#"{"detail":[{"loc":["term"]}]}"#).unwrap().contains("term"));
    }

    #[tokio::test]
    async fn test_search_rejects_short_term_without_request() {
        let client = BackendClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = client.search(" op ", None, 10).await.unwrap_err();
        assert!(matches!(err, Error::SearchTermTooShort));
    }

    #[tokio::test]
    async fn test_search_sends_query_and_parses_results() {
        let (client, server) = serve_once(
            "200 OK",
            r#"{"results":[{"title":"Blame!","cover_url":null,"source_url":"https://md.example/t/1","site":"MangaDex"}]}"#,
        )
        .await;

        let results = client.search("blame", Some("MangaDex"), 99).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Blame!");
        assert_eq!(results[0].cover_url, None);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/search?"));
        assert!(request.contains("term=blame"));
        assert!(request.contains("limit=50"));
        assert!(request.contains("site=MangaDex"));
    }

    #[tokio::test]
    async fn test_download_posts_json_body() {
        let (client, server) = serve_once(
            "200 OK",
            r#"{"job_id":"abc123","status":"Discovery process initiated.","series_folder_name":"Gantz"}"#,
        )
        .await;

        let req = DownloadRequest {
            source_urls: vec!["https://site.example/gantz".into()],
            library: Library::Manga,
            series_folder_name: Some("Gantz".into()),
            title: None,
            use_flaresolverr: true,
            frequency: Frequency::Daily,
        };
        let ticket = client.download(&req).await.unwrap();
        assert_eq!(ticket.job_id, "abc123");
        assert_eq!(ticket.series_folder_name.as_deref(), Some("Gantz"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/download "));
        assert!(request.contains(r#""series_folder_name":"Gantz""#));
        assert!(!request.contains(r#""title""#));
    }

    #[tokio::test]
    async fn test_backend_error_carries_detail() {
        let (client, server) = serve_once(
            "404 Not Found",
            r#"{"detail":"Series not found in watched list."}"#,
        )
        .await;

        let err = client.remove_series("Nope").await.unwrap_err();
        match err {
            Error::Backend { status, detail } => {
                assert_eq!(status, 404);
                assert_eq!(detail, "Series not found in watched list.");
            }
            other => panic!("unexpected error: {other}"),
        }

        let request = server.await.unwrap();
        assert!(request.starts_with("DELETE /api/watched_urls "));
    }

    #[tokio::test]
    async fn test_watched_list() {
        let (client, _server) = serve_once(
            "200 OK",
            r#"{"watched_urls":[{"series_folder_name":"Akira","series_urls":["https://x.example/akira"],"library":"comics","use_flaresolverr":true,"frequency":"weekly","display_site_name":"X","missing_chapters_count":2,"missing_chapters_list":["Ch 1","Ch 2"]}]}"#,
        )
        .await;

        let watched = client.watched().await.unwrap();
        assert_eq!(watched.len(), 1);
        assert_eq!(watched[0].library, Library::Comics);
        assert_eq!(watched[0].frequency, Frequency::Weekly);
        assert_eq!(watched[0].missing_chapters_list.len(), 2);
    }

    #[tokio::test]
    async fn test_series_metadata_encodes_folder() {
        let (client, server) = serve_once(
            "200 OK",
            r#"{"version":"1.0.2","metadata":{"type":"comicSeries","name":"Oyasumi Punpun","publisher":"Shogakukan","year":2007,"total_issues":147,"status":"Ended"}}"#,
        )
        .await;

        let meta = client
            .series_metadata("Oyasumi Punpun", Library::Manga)
            .await
            .unwrap();
        assert_eq!(meta.name, "Oyasumi Punpun");
        assert_eq!(meta.total_issues, 147);
        assert!(meta.description_text.is_empty());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/series_metadata/Oyasumi%20Punpun?library=manga "));
    }

    #[tokio::test]
    async fn test_job_and_schedule_status() {
        let (client, _server) = serve_once(
            "200 OK",
            r#"{"active_jobs":["Downloading: Ch 5"],"scheduled_jobs":[]}"#,
        )
        .await;
        let jobs = client.job_status().await.unwrap();
        assert_eq!(jobs.active_jobs, vec!["Downloading: Ch 5".to_string()]);
        assert!(!jobs.is_idle());

        let (client, _server) = serve_once(
            "200 OK",
            r#"{"hourly":null,"half_daily":null,"daily":"2026-10-18T03:00:00","weekly":null}"#,
        )
        .await;
        let schedule = client.schedule_status().await.unwrap();
        assert!(schedule.next_run(Frequency::Daily).is_some());
        assert!(schedule.next_run(Frequency::Hourly).is_none());
    }

    #[tokio::test]
    async fn test_bulk_add_rejects_empty_list() {
        let client = BackendClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let req = BulkAddRequest {
            urls: Vec::new(),
            library: Library::Manga,
            frequency: Frequency::Daily,
        };
        assert!(matches!(client.bulk_add(&req).await, Err(Error::EmptyImport)));
    }
}
