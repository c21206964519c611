//! Recipe extraction from saved codex pages
//!
//! Parses recipe pages downloaded from the Alchemy Factory codex (one HTML
//! file per recipe, named after its slug) into catalog records.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::models::{ItemAmount, Recipe, UNKNOWN_DEVICE};

/// Base URL recipe pages were saved from
pub const CODEX_BASE_URL: &str = "https://alchemy-factory-codex.com/";

/// A page that could not be turned into a recipe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedPage {
    pub url: String,
    pub slug: String,
    pub name: String,
    pub parse_error: bool,
    pub reason: String,
}

/// One catalog record per page; failures stay in the catalog flagged with `parse_error`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PageRecord {
    Parsed(Recipe),
    Failed(FailedPage),
}

impl PageRecord {
    pub fn failed(slug: &str, name: &str, reason: impl Into<String>) -> Self {
        PageRecord::Failed(FailedPage {
            url: format!("{}recipe/{}/", CODEX_BASE_URL, slug),
            slug: slug.to_string(),
            name: name.to_string(),
            parse_error: true,
            reason: reason.into(),
        })
    }

    pub fn recipe(&self) -> Option<&Recipe> {
        match self {
            PageRecord::Parsed(recipe) => Some(recipe),
            PageRecord::Failed(_) => None,
        }
    }
}

/// Compiled patterns, built once per extraction run
pub struct PageParser {
    title: Regex,
    hidden: Regex,
    tag: Regex,
    header: Regex,
    crafting_time: Regex,
    device: Regex,
    io_entry: Regex,
    whitespace: Regex,
}

impl PageParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title: Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>")?,
            hidden: Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<!--.*?-->")?,
            tag: Regex::new(r"(?s)<[^>]+>")?,
            header: Regex::new(r"(?is)<h[23][^>]*>(.*?)</h[23]>")?,
            crafting_time: Regex::new(r"(?i)Crafting Time\s+(\d+)\s*s")?,
            device: Regex::new(r"(?i)\nDevice\n\s*([^\n]+)")?,
            // Pattern: 2 × iron ore (
            io_entry: Regex::new(r"(\d+(?:\.\d+)?)\s*×\s*([a-z0-9 '\-]+)\s*\(")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Parse one page. `slug` comes from the file name.
    pub fn parse(&self, html: &str, slug: &str) -> PageRecord {
        let name = self
            .title
            .captures(html)
            .map(|cap| self.text(&cap[1], " "))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| slug.to_string());

        let failed = |reason: &str| PageRecord::failed(slug, &name, reason);

        let text = self.text(html, "\n");

        let Some(crafting_s) = self
            .crafting_time
            .captures(&text)
            .and_then(|cap| cap[1].parse::<f64>().ok())
        else {
            return failed("no crafting time");
        };

        let device = self
            .device
            .captures(&text)
            .map(|cap| cap[1].trim().to_lowercase())
            .filter(|device| !device.is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());

        let inputs = self.io_section(html, "inputs");
        let outputs = self.io_section(html, "outputs");
        if outputs.is_empty() {
            return failed("no outputs");
        }

        PageRecord::Parsed(Recipe {
            name: name.clone(),
            slug: slug.to_string(),
            device,
            crafting_s,
            inputs,
            outputs,
            url: Some(format!("{}recipe/{}/", CODEX_BASE_URL, slug)),
        })
    }

    /// Entries under the first h2/h3 whose text contains `title`, up to the next h2/h3
    fn io_section(&self, html: &str, title: &str) -> Vec<ItemAmount> {
        let headers: Vec<_> = self.header.captures_iter(html).collect();

        let Some(pos) = headers.iter().position(|cap| {
            self.text(&cap[1], " ").to_lowercase().contains(title)
        }) else {
            return Vec::new();
        };

        let start = headers[pos].get(0).map_or(0, |m| m.end());
        let end = headers
            .get(pos + 1)
            .and_then(|cap| cap.get(0))
            .map_or(html.len(), |m| m.start());
        let body = self.text(&html[start..end], " ").to_lowercase();

        let mut entries: Vec<ItemAmount> = Vec::new();
        for cap in self.io_entry.captures_iter(&body) {
            let Ok(amount) = cap[1].parse::<f64>() else {
                continue;
            };
            let item = cap[2].trim().to_string();
            if !entries.iter().any(|e| e.item == item && e.amount == amount) {
                entries.push(ItemAmount { item, amount });
            }
        }
        entries
    }

    /// Visible text with tags replaced by `sep`, one trimmed chunk per tag boundary
    fn text(&self, html: &str, sep: &str) -> String {
        let visible = self.hidden.replace_all(html, "");
        let stripped = self.tag.replace_all(&visible, "\u{0}");
        let decoded = decode_entities(&stripped);

        let chunks: Vec<String> = decoded
            .split('\u{0}')
            .map(|chunk| self.whitespace.replace_all(chunk.trim(), " ").into_owned())
            .filter(|chunk| !chunk.is_empty())
            .collect();
        chunks.join(sep)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&times;", "×")
        .replace("&#215;", "×")
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Find all saved recipe pages (*.html / *.htm), sorted by path
pub fn find_recipe_pages(pages_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages = Vec::new();

    for entry in WalkDir::new(pages_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
        {
            pages.push(path.to_path_buf());
        }
    }

    pages.sort();
    Ok(pages)
}

/// Parse every page under `pages_dir` into catalog records
pub fn extract_catalog(pages_dir: &Path) -> Result<(Vec<PageRecord>, ExtractStats)> {
    let mut stats = ExtractStats::default();
    let parser = PageParser::new()?;

    info!(dir = %pages_dir.display(), "scanning for recipe pages");
    let pages = find_recipe_pages(pages_dir)?;
    info!(pages = pages.len(), "found recipe pages");

    let mut records = Vec::new();
    for path in &pages {
        stats.pages += 1;

        let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "skipping page with unusable file name");
            stats.errors += 1;
            continue;
        };

        let html = match fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
        {
            Ok(html) => html,
            Err(e) => {
                warn!("{:#}", e);
                stats.errors += 1;
                records.push(PageRecord::failed(slug, slug, format!("{:#}", e)));
                continue;
            }
        };

        let record = parser.parse(&html, slug);
        match &record {
            PageRecord::Parsed(recipe) => {
                stats.recipes += 1;
                stats.inputs += recipe.inputs.len();
                stats.outputs += recipe.outputs.len();
                debug!(
                    slug,
                    device = %recipe.device,
                    inputs = recipe.inputs.len(),
                    outputs = recipe.outputs.len(),
                    "parsed recipe"
                );
            }
            PageRecord::Failed(page) => {
                stats.failed += 1;
                warn!(slug, reason = %page.reason, "page has no usable recipe");
            }
        }
        records.push(record);
    }

    Ok((records, stats))
}

#[derive(Debug, Default, PartialEq)]
pub struct ExtractStats {
    pub pages: usize,
    pub recipes: usize,
    pub inputs: usize,
    pub outputs: usize,
    pub failed: usize,
    pub errors: usize,
}

impl std::fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Extracted {} recipes from {} pages ({} inputs, {} outputs). Failed: {}, Errors: {}",
            self.recipes, self.pages, self.inputs, self.outputs, self.failed, self.errors
        )
    }
}
