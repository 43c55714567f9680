use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::models::DownloadRequest;
use crate::error::Error;
use crate::matcher;

/// Backend library a series is downloaded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    Comics,
    Artbooks,
    #[default]
    Manga,
}

impl Library {
    pub fn as_str(&self) -> &'static str {
        match self {
            Library::Comics => "comics",
            Library::Artbooks => "artbooks",
            Library::Manga => "manga",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Library::Comics => Library::Artbooks,
            Library::Artbooks => Library::Manga,
            Library::Manga => Library::Comics,
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Library {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "comics" => Ok(Library::Comics),
            "artbooks" => Ok(Library::Artbooks),
            "manga" => Ok(Library::Manga),
            other => Err(Error::InvalidLibrary(other.to_string())),
        }
    }
}

/// Update-check pool a series belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    HalfDaily,
    #[default]
    Daily,
    Weekly,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Hourly,
        Frequency::HalfDaily,
        Frequency::Daily,
        Frequency::Weekly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::HalfDaily => "half_daily",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }

    pub fn as_display(&self) -> &'static str {
        match self {
            Frequency::Hourly => "Hourly",
            Frequency::HalfDaily => "Twice a day",
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
        }
    }

    pub fn interval(&self) -> Duration {
        const HOUR: u64 = 60 * 60;
        match self {
            Frequency::Hourly => Duration::from_secs(HOUR),
            Frequency::HalfDaily => Duration::from_secs(12 * HOUR),
            Frequency::Daily => Duration::from_secs(24 * HOUR),
            Frequency::Weekly => Duration::from_secs(7 * 24 * HOUR),
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Frequency::Hourly => Frequency::HalfDaily,
            Frequency::HalfDaily => Frequency::Daily,
            Frequency::Daily => Frequency::Weekly,
            Frequency::Weekly => Frequency::Hourly,
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| Error::InvalidFrequency(s.to_string()))
    }
}

/// A series the backend keeps checking for new chapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedSeries {
    pub series_folder_name: String,
    #[serde(default)]
    pub series_urls: Vec<String>,
    #[serde(default)]
    pub library: Library,
    #[serde(default = "default_true")]
    pub use_flaresolverr: bool,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub display_site_name: String,
    #[serde(default)]
    pub missing_chapters_count: u32,
    #[serde(default)]
    pub missing_chapters_list: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl WatchedSeries {
    pub fn primary_url(&self) -> Option<&str> {
        self.series_urls.first().map(String::as_str)
    }

    pub fn source_count(&self) -> usize {
        self.series_urls.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_chapters_count == 0
    }
}

/// What adding a title to the watch list should do
#[derive(Debug, Clone, PartialEq)]
pub enum AddPlan<'a> {
    /// The backend already has a folder with exactly this name
    Merge(&'a WatchedSeries),
    /// A series with a similar name exists; the user has to pick
    Ambiguous(&'a WatchedSeries),
    Create,
}

/// Strip characters that are unsafe in a folder name, the same way the
/// backend derives `series_folder_name` from a title.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn find_by_folder<'a>(series: &'a [WatchedSeries], folder: &str) -> Option<&'a WatchedSeries> {
    series.iter().find(|s| s.series_folder_name == folder)
}

pub fn total_missing(series: &[WatchedSeries]) -> u32 {
    series.iter().map(|s| s.missing_chapters_count).sum()
}

/// Decide whether `title` extends an existing series or starts a new one.
pub fn plan_add<'a>(title: &str, existing: &'a [WatchedSeries], threshold: usize) -> AddPlan<'a> {
    if let Some(hit) = find_by_folder(existing, &sanitize_filename(title)) {
        return AddPlan::Merge(hit);
    }

    match matcher::find_similar(title, existing, threshold) {
        Some(similar) => AddPlan::Ambiguous(similar),
        None => AddPlan::Create,
    }
}

impl AsRef<str> for WatchedSeries {
    fn as_ref(&self) -> &str {
        &self.series_folder_name
    }
}

impl DownloadRequest {
    /// Add `urls` to an existing series, keeping its library and pool
    pub fn merge_into(existing: &WatchedSeries, urls: Vec<String>) -> Self {
        Self {
            source_urls: urls,
            library: existing.library,
            series_folder_name: Some(existing.series_folder_name.clone()),
            title: None,
            use_flaresolverr: existing.use_flaresolverr,
            frequency: existing.frequency,
        }
    }

    pub fn create_new(
        title: Option<String>,
        urls: Vec<String>,
        library: Library,
        frequency: Frequency,
        use_flaresolverr: bool,
    ) -> Self {
        Self {
            source_urls: urls,
            library,
            series_folder_name: None,
            title: title.filter(|t| !t.trim().is_empty()),
            use_flaresolverr,
            frequency,
        }
    }

    /// Re-run discovery and download over every source of a series
    pub fn redownload(series: &WatchedSeries) -> Self {
        Self::merge_into(series, series.series_urls.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(folder: &str) -> WatchedSeries {
        WatchedSeries {
            series_folder_name: folder.to_string(),
            series_urls: vec![format!("https://example.org/{}", folder)],
            library: Library::Manga,
            use_flaresolverr: false,
            frequency: Frequency::Weekly,
            display_site_name: "Example".to_string(),
            missing_chapters_count: 0,
            missing_chapters_list: Vec::new(),
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Kaguya-sama: Love Is War!"), "Kaguya-sama Love Is War");
        assert_eq!(sanitize_filename("  Dr. STONE  "), "Dr. STONE");
        assert_eq!(sanitize_filename("Spy×Family"), "SpyFamily");
        assert_eq!(sanitize_filename("???"), "");
    }

    #[test]
    fn test_plan_exact_folder_merges() {
        let existing = vec![series("Solo Leveling"), series("One Piece")];
        assert_eq!(
            plan_add("One Piece!", &existing, 3),
            AddPlan::Merge(&existing[1])
        );
    }

    #[test]
    fn test_plan_similar_is_ambiguous() {
        let existing = vec![series("Solo Leveling"), series("one-piece")];
        assert_eq!(
            plan_add("One Piece", &existing, 3),
            AddPlan::Ambiguous(&existing[1])
        );
    }

    #[test]
    fn test_plan_unrelated_creates() {
        let existing = vec![series("Solo Leveling")];
        assert_eq!(plan_add("Blue Lock", &existing, 3), AddPlan::Create);
        assert_eq!(plan_add("Blue Lock", &[], 3), AddPlan::Create);
    }

    #[test]
    fn test_plan_respects_threshold() {
        let existing = vec![series("Berserk")];
        assert_eq!(plan_add("Berserker", &existing, 1), AddPlan::Create);
        assert_eq!(plan_add("Berserker", &existing, 2), AddPlan::Ambiguous(&existing[0]));
    }

    #[test]
    fn test_merge_request_keeps_series_settings() {
        let existing = series("Vagabond");
        let req = DownloadRequest::merge_into(&existing, vec!["https://b.example/v".into()]);
        assert_eq!(req.series_folder_name.as_deref(), Some("Vagabond"));
        assert_eq!(req.frequency, Frequency::Weekly);
        assert!(!req.use_flaresolverr);
        assert!(req.title.is_none());
    }

    #[test]
    fn test_create_request_drops_blank_title() {
        let req = DownloadRequest::create_new(
            Some("  ".into()),
            vec!["https://a.example/x".into()],
            Library::Comics,
            Frequency::Hourly,
            true,
        );
        assert!(req.title.is_none());
        assert!(req.series_folder_name.is_none());
        assert_eq!(req.library, Library::Comics);
    }

    #[test]
    fn test_redownload_uses_all_sources() {
        let mut s = series("Monster");
        s.series_urls.push("https://other.example/monster".into());
        let req = DownloadRequest::redownload(&s);
        assert_eq!(req.source_urls, s.series_urls);
    }

    #[test]
    fn test_frequency_wire_names() {
        assert_eq!("half_daily".parse::<Frequency>().unwrap(), Frequency::HalfDaily);
        assert!("monthly".parse::<Frequency>().is_err());
        assert_eq!(
            serde_json::to_string(&Frequency::HalfDaily).unwrap(),
            "\"half_daily\""
        );
        assert_eq!(Frequency::Weekly.interval().as_secs(), 604_800);
    }

    #[test]
    fn test_library_parse_and_cycle() {
        assert_eq!(" Artbooks ".parse::<Library>().unwrap(), Library::Artbooks);
        assert!(matches!("novels".parse::<Library>(), Err(Error::InvalidLibrary(_))));
        assert_eq!(Library::Manga.next(), Library::Comics);
    }

    #[test]
    fn test_watched_series_defaults_for_old_entries() {
        let json = r#"{"series_folder_name":"Akira","series_urls":["https://x.example/akira"],"library":"comics"}"#;
        let s: WatchedSeries = serde_json::from_str(json).unwrap();
        assert_eq!(s.frequency, Frequency::Daily);
        assert!(s.use_flaresolverr);
        assert!(s.is_complete());
        assert_eq!(s.primary_url(), Some("https://x.example/akira"));
    }

    #[test]
    fn test_total_missing() {
        let mut a = series("A");
        a.missing_chapters_count = 2;
        let mut b = series("B");
        b.missing_chapters_count = 5;
        assert_eq!(total_missing(&[a, b]), 7);
    }
}
