//! Web search fetcher.
//!
//! Issues a search request through the optional relay, keeps at most the
//! configured number of results, and serializes them together with a fixed
//! advisory note telling the model to follow up with webpage retrieval.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::ToolboxConfig;
use crate::error::ToolError;
use crate::utils::url::relay_url;

const SEARCH_NOTE: &str = "Search results provide only an overview and do not offer sufficiently \
                           detailed information. Please continue by using the Search Website tool \
                           and search websites to find relevant information about the topic.";

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

/// Run one search and format the results as pretty-printed JSON text.
pub async fn web_search(
    client: &reqwest::Client,
    config: &ToolboxConfig,
    query: &str,
) -> Result<String, ToolError> {
    let target = format!(
        "{}?query={}&limit={}",
        config.search_base_url,
        urlencoding::encode(query),
        config.search_result_limit
    );
    let url = relay_url(config.relay_base_url.as_deref(), &target);

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ToolError::Request(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ToolError::Status(response.status()));
    }

    let entries: Vec<SearchEntry> = response
        .json()
        .await
        .map_err(|e| ToolError::Parse(e.to_string()))?;

    Ok(format_results(&entries, config.search_result_limit))
}

fn format_results(entries: &[SearchEntry], limit: usize) -> String {
    let mut combined = Map::new();
    combined.insert("Note".to_string(), Value::String(SEARCH_NOTE.to_string()));

    for (index, entry) in entries.iter().take(limit).enumerate() {
        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String(entry.title.clone()));
        fields.insert("result".to_string(), Value::String(entry.snippet.clone()));
        fields.insert("url".to_string(), Value::String(entry.link.clone()));
        combined.insert(format!("result_{}", index + 1), Value::Object(fields));
    }

    // Map keys serialize in sorted order, which puts the note first and the
    // numbered results after it.
    serde_json::to_string_pretty(&Value::Object(combined))
        .unwrap_or_else(|_| SEARCH_NOTE.to_string())
}
