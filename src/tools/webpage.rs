//! Webpage content fetcher.
//!
//! Retrieves a page through the optional relay, races the whole request
//! against a fixed timeout, and reduces the HTML body to readable text:
//! script/style subtrees and comments are dropped, remaining tags stripped,
//! common entities decoded, and long whitespace runs collapsed.

use std::time::Duration;

use super::ToolboxConfig;
use crate::error::ToolError;
use crate::utils::url::relay_url;

/// Fetch a page and return its visible text.
pub async fn fetch_webpage_text(
    client: &reqwest::Client,
    config: &ToolboxConfig,
    url: &str,
) -> Result<String, ToolError> {
    let target = relay_url(config.relay_base_url.as_deref(), url);
    let timeout = Duration::from_millis(config.webpage_timeout_ms);

    let fetch = async {
        let response = client
            .get(&target)
            .send()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Status(response.status()));
        }

        response
            .text()
            .await
            .map_err(|e| ToolError::Request(e.to_string()))
    };

    // The timer covers the full request including body download; an elapsed
    // timer always fails, never yields a partial body.
    let html = match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result?,
        Err(_) => return Err(ToolError::Timeout(timeout.as_secs())),
    };

    Ok(html_to_text(&html))
}

/// Reduce an HTML document to its visible text content.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = strip_element(html, "script");
    let without_styles = strip_element(&without_scripts, "style");
    let without_comments = strip_comments(&without_styles);
    let stripped = strip_tags(&without_comments);
    let decoded = decode_entities(&stripped);
    let collapsed = collapse_whitespace_runs(&decoded);
    collapse_newline_runs(&collapsed).trim().to_string()
}

/// Remove `<name ...> ... </name>` subtrees, case-insensitively. The tag
/// name must end at a boundary so `<scriptx>` is not mistaken for `<script>`.
fn strip_element(html: &str, name: &str) -> String {
    let open = format!("<{name}");
    let close = format!("</{name}");
    let lower = html.to_ascii_lowercase();

    let tag_boundary = |index: usize| match lower.as_bytes().get(index) {
        Some(b) => b.is_ascii_whitespace() || *b == b'>' || *b == b'/',
        None => false,
    };

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        if !tag_boundary(start + open.len()) {
            // A longer tag name that merely starts with ours; keep it.
            out.push_str(&html[pos..start + open.len()]);
            pos = start + open.len();
            continue;
        }
        out.push_str(&html[pos..start]);

        let mut search = start;
        let after_close = loop {
            match lower[search..].find(&close) {
                Some(rel) => {
                    let close_start = search + rel;
                    if tag_boundary(close_start + close.len()) {
                        break lower[close_start..]
                            .find('>')
                            .map(|gt| close_start + gt + 1);
                    }
                    search = close_start + close.len();
                }
                None => break None,
            }
        };
        match after_close {
            Some(end) => pos = end,
            None => {
                // Unterminated element: drop the rest of the document.
                return out;
            }
        }
    }
    out.push_str(&html[pos..]);
    out
}

fn strip_comments(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start) = html[pos..].find("<!--") {
        let start = pos + start;
        out.push_str(&html[pos..start]);
        match html[start..].find("-->") {
            Some(rel) => pos = start + rel + 3,
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// Remove any residual tag-like `<...>` substrings.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let semi = match candidate.find(';') {
            // Entities are short; anything longer is treated as literal text.
            Some(semi) if semi <= 8 => semi,
            _ => {
                out.push('&');
                rest = &candidate[1..];
                continue;
            }
        };

        let entity = &candidate[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Collapse runs of 6+ whitespace characters down to two spaces.
fn collapse_whitespace_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            run.push(ch);
        } else {
            flush_run(&mut out, &run, "  ");
            run.clear();
            out.push(ch);
        }
    }
    flush_run(&mut out, &run, "  ");
    out
}

/// Collapse runs of 6+ line breaks down to two.
fn collapse_newline_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            run.push(ch);
        } else {
            flush_newline_run(&mut out, &run);
            run.clear();
            out.push(ch);
        }
    }
    flush_newline_run(&mut out, &run);
    out
}

fn flush_run(out: &mut String, run: &str, replacement: &str) {
    if run.chars().count() >= 6 {
        out.push_str(replacement);
    } else {
        out.push_str(run);
    }
}

fn flush_newline_run(out: &mut String, run: &str) {
    if run.matches('\n').count() >= 6 {
        out.push_str("\n\n");
    } else {
        out.push_str(run);
    }
}
