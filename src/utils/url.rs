//! URL utilities for consistent URL handling
//!
//! This module provides utilities for normalizing URLs when constructing API
//! endpoints, and for routing outbound fetches through an optional relay
//! (a pass-through proxy prefix used to sidestep cross-origin restrictions).

/// Normalize a base URL by removing trailing slashes
///
/// This ensures consistent URL construction when appending endpoints,
/// preventing double slashes in the final URLs.
///
/// # Examples
///
/// ```
/// use palaver::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use palaver::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "chat/stream"),
///     "https://api.example.com/v1/chat/stream"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Prefix a target URL with a relay base, when one is configured.
///
/// The relay is a plain pass-through prefix: the target URL is appended
/// verbatim, matching proxies of the `https://relay.example/https://target`
/// family. With no relay configured the target is returned unchanged.
pub fn relay_url(relay_base: Option<&str>, target: &str) -> String {
    match relay_base {
        Some(relay) if !relay.is_empty() => format!("{}{}", relay, target),
        _ => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/v1///"),
            "https://api.example.com/v1"
        );
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("https://api.example.com/v1", "chat/stream"),
            "https://api.example.com/v1/chat/stream"
        );
        assert_eq!(
            construct_api_url("https://api.example.com/v1/", "/chat/stream"),
            "https://api.example.com/v1/chat/stream"
        );
        assert_eq!(
            construct_api_url("https://api.example.com/v1///", "models"),
            "https://api.example.com/v1/models"
        );
    }

    #[test]
    fn test_relay_url() {
        assert_eq!(
            relay_url(Some("https://relay.example.com/"), "https://target.example/page"),
            "https://relay.example.com/https://target.example/page"
        );
        assert_eq!(
            relay_url(None, "https://target.example/page"),
            "https://target.example/page"
        );
        assert_eq!(
            relay_url(Some(""), "https://target.example/page"),
            "https://target.example/page"
        );
    }
}
