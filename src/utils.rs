//! Utility functions for the records service
//!
//! - Service name sanitization (registry keys, archive file names)
//! - Time-of-day trigger computation (see [`time`])

use regex::Regex;
use std::sync::OnceLock;

pub mod time;

fn unsafe_name_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("static regex is valid"))
}

/// Sanitize a service display name into a registry key.
///
/// Surrounding whitespace is trimmed and every character outside
/// `[A-Za-z0-9_.-]` becomes `_`, so `"cpu monitor"` maps to `"cpu_monitor"`.
/// The function is idempotent.
pub fn sanitize_name(name: &str) -> String {
    unsafe_name_chars()
        .replace_all(name.trim(), "_")
        .into_owned()
}

/// Normalize a URL by ensuring it has a proper scheme (http:// or https://)
pub fn normalize_url_scheme(url: &str) -> String {
    let trimmed_url = url.trim_end_matches('/');

    if trimmed_url.starts_with("http://") || trimmed_url.starts_with("https://") {
        trimmed_url.to_string()
    } else {
        format!("http://{}", trimmed_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_spaces() {
        assert_eq!(sanitize_name("a b"), "a_b");
        assert_eq!(sanitize_name("cpu monitor"), "cpu_monitor");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for name in ["a b", "  weather / texas ", "rtsc_monitor", "spp-monitor.v2", "héllo wörld", ""] {
            let once = sanitize_name(name);
            assert_eq!(sanitize_name(&once), once, "not idempotent for {:?}", name);
        }
    }

    #[test]
    fn test_sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_name("spp-monitor.v2_x"), "spp-monitor.v2_x");
        assert_eq!(sanitize_name("  padded  "), "padded");
    }

    #[test]
    fn test_normalize_url_scheme() {
        assert_eq!(normalize_url_scheme("127.0.0.1:4080/"), "http://127.0.0.1:4080");
        assert_eq!(normalize_url_scheme("https://zinc.local"), "https://zinc.local");
    }
}
