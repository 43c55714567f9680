use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};

static SOURCE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").unwrap());

/// Collect source URLs from CSV data.
///
/// Any cell in any column counts, so exports with a header row or extra
/// title/notes columns import as-is. Duplicates keep their first position.
pub fn parse_urls<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        for cell in record.iter() {
            let cell = cell.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'');
            if !SOURCE_URL.is_match(cell) {
                continue;
            }
            if seen.insert(cell.to_string()) {
                urls.push(cell.to_string());
            } else {
                debug!(url = %cell, "Skipping duplicate URL");
            }
        }
    }

    if urls.is_empty() {
        return Err(Error::EmptyImport);
    }
    Ok(urls)
}

pub fn load_csv(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let urls = parse_urls(file)?;
    info!(path = %path.display(), count = urls.len(), "Loaded URLs for bulk import");
    Ok(urls)
}

/// Expand a leading `~` so pasted paths behave like they do in a shell
pub fn expand_home(input: &str) -> std::path::PathBuf {
    let input = input.trim();
    if input == "~" || input.starts_with("~/") || input.starts_with("~\\") {
        if let Some(dirs) = directories::BaseDirs::new() {
            let home = dirs.home_dir().to_path_buf();
            if input == "~" {
                return home;
            }
            return home.join(&input[2..]);
        }
    }
    std::path::PathBuf::from(input)
}
