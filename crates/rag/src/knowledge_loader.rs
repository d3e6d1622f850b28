//! Knowledge Base Loader
//!
//! Reads the knowledge document from a local file or an http(s) URL and
//! reduces it to plain text for splitting. JSON is flattened into
//! `key: value` lines (one paragraph per top-level array element), HTML is
//! reduced to its visible text, anything else is used as-is.

use scraper::{Html, Node};
use std::path::PathBuf;
use std::time::Duration;

use crate::RagError;

/// Where the knowledge document lives
#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeSource {
    Path(PathBuf),
    Url(String),
}

impl KnowledgeSource {
    /// Classify a configured source string
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            KnowledgeSource::Url(raw_github_url(source))
        } else {
            KnowledgeSource::Path(PathBuf::from(source))
        }
    }

    /// Display form for logs and chunk metadata
    pub fn label(&self) -> String {
        match self {
            KnowledgeSource::Path(path) => path.display().to_string(),
            KnowledgeSource::Url(url) => url.clone(),
        }
    }
}

/// Rewrite GitHub `blob` page URLs to the raw file
fn raw_github_url(url: &str) -> String {
    match url.strip_prefix("https://github.com/") {
        Some(rest) if rest.contains("/blob/") => format!(
            "https://raw.githubusercontent.com/{}",
            rest.replacen("/blob/", "/", 1)
        ),
        _ => url.to_string(),
    }
}

/// Knowledge loader
pub struct KnowledgeLoader {
    http: reqwest::Client,
}

impl KnowledgeLoader {
    pub fn new() -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { http })
    }

    /// Load the source and return its plain text
    pub async fn load_text(&self, source: &KnowledgeSource) -> Result<String, RagError> {
        let raw = match source {
            KnowledgeSource::Path(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                RagError::Load(format!("Failed to read {}: {}", path.display(), e))
            })?,
            KnowledgeSource::Url(url) => self.fetch(url).await?,
        };

        let text = to_plain_text(&raw);

        tracing::info!(
            source = %source.label(),
            bytes = raw.len(),
            chars = text.chars().count(),
            "Loaded knowledge source"
        );

        Ok(text)
    }

    async fn fetch(&self, url: &str) -> Result<String, RagError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::Load(format!(
                "HTTP {} fetching {}",
                response.status(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| RagError::Connection(e.to_string()))
    }
}

/// Detect the format and reduce to plain text
pub fn to_plain_text(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
            return flatten_json(&value);
        }
    }
    if trimmed.starts_with('<') {
        return html_to_text(raw);
    }
    raw.to_string()
}

/// Flatten JSON into readable lines
pub fn flatten_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                let mut lines = Vec::new();
                flatten_into(item, None, &mut lines);
                lines.join("\n")
            })
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => {
            let mut lines = Vec::new();
            flatten_into(value, None, &mut lines);
            lines.join("\n")
        },
    }
}

fn flatten_into(value: &serde_json::Value, key: Option<&str>, out: &mut Vec<String>) {
    use serde_json::Value;

    let scalar = match value {
        Value::Null => return,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            for item in items {
                flatten_into(item, key, out);
            }
            return;
        },
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(v, Some(k), out);
            }
            return;
        },
    };

    if scalar.is_empty() {
        return;
    }
    match key {
        Some(k) => out.push(format!("{}: {}", k, scalar)),
        None => out.push(scalar),
    }
}

/// Visible text of an HTML document, one line per text run
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "head"))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        let line = text.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    lines.join("\n")
}
