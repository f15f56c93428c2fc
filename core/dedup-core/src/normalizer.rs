//! URL canonicalization and host match-pattern construction.
//!
//! Two canonical forms live here. [`normalize_url`] only feeds match-pattern
//! construction (which host-level query to send to the host), while
//! [`get_matching_url`] produces the configurable form compared between tabs.
//! Everything in this module is a pure function of its inputs.

use serde::Serialize;
use url::Url;

use crate::patterns::{glob_to_regex, RE_HTTPS_URL, RE_HTTP_PREFIX, RE_VALID_URL};

const WWW_PREFIX: &str = "www.";

/// URL comparison knobs, copied out of the options snapshot.
///
/// `ignore_path_part`, `ignore_search_part` and `ignore_hash_part` are not
/// combined: the first one set (in that order) wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlMatching {
    pub ignore_hash_part: bool,
    pub ignore_search_part: bool,
    pub ignore_path_part: bool,
    pub force_https: bool,
    pub ignore_3w: bool,
    pub case_insensitive: bool,
}

pub fn is_valid_url(url: &str) -> bool {
    RE_VALID_URL.is_match(url)
}

pub fn is_browser_url(url: &str) -> bool {
    url.starts_with("about:") || url.starts_with("chrome://")
}

/// Internal pages that never report a url change when they finish loading.
pub fn is_chrome_url(url: &str) -> bool {
    url.starts_with("chrome://") || url.starts_with("view-source:chrome-search")
}

pub fn is_https_url(url: &str) -> bool {
    RE_HTTPS_URL.is_match(url)
}

/// Canonical form used for match-pattern construction.
///
/// Lower-cases everything, drops leading `www.` host labels and trailing
/// slashes. The scheme is kept. Non web URLs pass through unchanged.
pub fn normalize_url(url: &str) -> String {
    if !is_valid_url(url) {
        return url.to_string();
    }
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return url.to_string();
    };

    let host = strip_www(&host.to_ascii_lowercase()).to_string();
    let mut normalized = format!("{}://{}{}", parsed.scheme(), host, port_suffix(&parsed));
    normalized.push_str(parsed.path());
    if let Some(query) = parsed.query() {
        normalized.push('?');
        normalized.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        normalized.push('#');
        normalized.push_str(fragment);
    }

    normalized.to_lowercase().trim_end_matches('/').to_string()
}

/// Host match pattern(s) covering every tab that could duplicate `url`.
pub fn build_match_pattern(url: &str) -> MatchPattern {
    if is_valid_url(url) {
        let normalized = normalize_url(url);
        let Some((host, port)) = Url::parse(&normalized)
            .ok()
            .and_then(|parsed| Some((parsed.host_str()?.to_string(), port_suffix(&parsed))))
        else {
            return MatchPattern::Single(url.to_string());
        };

        let mut hosts = vec![host.clone()];
        // Second-level domains are commonly served from both forms.
        if host.matches('.').count() == 1 {
            hosts.push(format!("{}{}", WWW_PREFIX, host));
        }
        let mut patterns: Vec<String> = hosts
            .into_iter()
            .map(|variant| format!("*://{}{}/*", variant, port))
            .collect();
        return if patterns.len() == 1 {
            MatchPattern::Single(patterns.remove(0))
        } else {
            MatchPattern::Multiple(patterns)
        };
    }
    if is_browser_url(url) {
        return MatchPattern::Single(format!("{}*", url));
    }
    MatchPattern::Single(url.to_string())
}

/// Key compared between tabs for URL-based duplicate detection.
pub fn get_matching_url(url: &str, matching: &UrlMatching) -> String {
    if !is_valid_url(url) {
        return url.to_string();
    }

    let mut matching_url = if matching.ignore_path_part {
        Url::parse(url)
            .map(|parsed| parsed.origin().ascii_serialization())
            .unwrap_or_else(|_| url.to_string())
    } else if matching.ignore_search_part {
        url.split('?').next().unwrap_or(url).to_string()
    } else if matching.ignore_hash_part {
        url.split('#').next().unwrap_or(url).to_string()
    } else {
        url.to_string()
    };

    if matching.force_https {
        matching_url = RE_HTTP_PREFIX
            .replace(&matching_url, "https://")
            .into_owned();
    }
    if matching.ignore_3w {
        matching_url = matching_url.replacen("://www.", "://", 1);
    }
    if matching.case_insensitive {
        matching_url = matching_url.to_lowercase();
    }
    if matching_url.ends_with('/') {
        matching_url.pop();
    }
    matching_url
}

/// Like [`build_match_pattern`], narrowed to the URL's path unless path
/// matching is disabled.
pub fn get_match_pattern_url(url: &str, matching: &UrlMatching) -> MatchPattern {
    let pattern = build_match_pattern(url);
    if !is_valid_url(url) || matching.ignore_path_part {
        return pattern;
    }
    let Ok(parsed) = Url::parse(url) else {
        return pattern;
    };

    let has_tail = parsed.query().map_or(false, |query| !query.is_empty())
        || parsed.fragment().map_or(false, |fragment| !fragment.is_empty());
    pattern.map(|entry| match entry.find("/*") {
        Some(index) => {
            let mut narrowed = format!("{}{}", &entry[..index], parsed.path());
            if has_tail {
                narrowed.push('*');
            }
            narrowed
        }
        None => entry,
    })
}

fn strip_www(host: &str) -> &str {
    let mut host = host;
    while let Some(rest) = host.strip_prefix(WWW_PREFIX) {
        host = rest;
    }
    host
}

fn port_suffix(parsed: &Url) -> String {
    parsed
        .port()
        .map(|port| format!(":{}", port))
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Match Patterns
// ═══════════════════════════════════════════════════════════════════════════════

/// One or several host match patterns (`*://host/path*`, `about:blank*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MatchPattern {
    Single(String),
    Multiple(Vec<String>),
}

impl MatchPattern {
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            MatchPattern::Single(pattern) => vec![pattern.as_str()],
            MatchPattern::Multiple(patterns) => patterns.iter().map(String::as_str).collect(),
        }
    }

    pub fn map(self, f: impl Fn(String) -> String) -> MatchPattern {
        match self {
            MatchPattern::Single(pattern) => MatchPattern::Single(f(pattern)),
            MatchPattern::Multiple(patterns) => {
                MatchPattern::Multiple(patterns.into_iter().map(f).collect())
            }
        }
    }

    /// True if any pattern matches `url`, using host match-pattern rules.
    pub fn matches(&self, url: &str) -> bool {
        self.patterns()
            .into_iter()
            .any(|pattern| pattern_matches(pattern, url))
    }
}

fn pattern_matches(pattern: &str, url: &str) -> bool {
    let Some(rest) = pattern.strip_prefix("*://") else {
        return glob_matches(pattern, url);
    };
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let (authority, path_glob) = match rest.find('/') {
        Some(index) => (&rest[..index], &rest[index..]),
        None => (rest, "/*"),
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let target_authority = format!("{}{}", host.to_ascii_lowercase(), port_suffix(&parsed));
    if !authority.eq_ignore_ascii_case(&target_authority) {
        return false;
    }

    let mut target_path = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        target_path.push('?');
        target_path.push_str(query);
    }
    glob_matches(path_glob, &target_path)
}

fn glob_matches(glob: &str, text: &str) -> bool {
    regex::Regex::new(&glob_to_regex(glob))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matching() -> UrlMatching {
        UrlMatching {
            ignore_hash_part: false,
            ignore_search_part: false,
            ignore_path_part: false,
            force_https: true,
            ignore_3w: true,
            case_insensitive: true,
        }
    }

    #[test]
    fn browser_urls_are_recognized() {
        assert!(is_browser_url("about:blank"));
        assert!(is_browser_url("chrome://settings"));
        assert!(!is_browser_url("https://about.com"));
        assert!(is_chrome_url("view-source:chrome-search://local-ntp"));
    }

    #[test]
    fn normalize_keeps_scheme_and_strips_host_prefix_and_slash() {
        assert_eq!(
            normalize_url("HTTP://WWW.Example.com/Path/"),
            "http://example.com/path"
        );
        assert_eq!(normalize_url("https://a.com:8443/"), "https://a.com:8443");
    }

    #[test]
    fn normalize_is_idempotent() {
        for url in [
            "HTTP://WWW.Example.com/Path/",
            "https://www.www.a.com/x//",
            "http://a.com/#/",
            "ftp://files.example.org/pub/?q=1",
            "https://a.com/caf%C3%A9?Q=Z#Frag",
            "about:blank",
            "not a url",
        ] {
            let once = normalize_url(url);
            assert_eq!(normalize_url(&once), once, "input {}", url);
        }
    }

    #[test]
    fn normalize_passes_through_non_web_urls() {
        assert_eq!(normalize_url("about:Blank"), "about:Blank");
        assert_eq!(normalize_url("file:///tmp/A"), "file:///tmp/A");
    }

    #[test]
    fn match_pattern_adds_www_variant_for_second_level_domains() {
        assert_eq!(
            build_match_pattern("http://www.a.com/page"),
            MatchPattern::Multiple(vec![
                "*://a.com/*".to_string(),
                "*://www.a.com/*".to_string()
            ])
        );
        assert_eq!(
            build_match_pattern("https://docs.a.com:8080/x"),
            MatchPattern::Single("*://docs.a.com:8080/*".to_string())
        );
        assert_eq!(
            build_match_pattern("about:config"),
            MatchPattern::Single("about:config*".to_string())
        );
        assert_eq!(
            build_match_pattern("data:text/plain,hi"),
            MatchPattern::Single("data:text/plain,hi".to_string())
        );
    }

    #[test]
    fn matching_url_forces_https_when_enabled() {
        assert_eq!(
            get_matching_url("http://example.com", &matching()),
            "https://example.com"
        );
        let plain = UrlMatching::default();
        assert_eq!(get_matching_url("http://example.com/", &plain), "http://example.com");
    }

    #[test]
    fn matching_url_ignore_options_use_priority_order() {
        let url = "https://www.A.com/Path/?q=1#top";
        let mut options = matching();
        assert_eq!(get_matching_url(url, &options), "https://a.com/path/?q=1#top");

        options.ignore_hash_part = true;
        assert_eq!(get_matching_url(url, &options), "https://a.com/path/?q=1");

        options.ignore_search_part = true;
        assert_eq!(get_matching_url(url, &options), "https://a.com/path");

        options.ignore_path_part = true;
        assert_eq!(get_matching_url(url, &options), "https://a.com");
    }

    #[test]
    fn matching_url_respects_case_and_3w_flags() {
        let options = UrlMatching {
            case_insensitive: false,
            ignore_3w: false,
            ..matching()
        };
        assert_eq!(
            get_matching_url("https://www.A.com/X", &options),
            "https://www.A.com/X"
        );
    }

    #[test]
    fn match_pattern_url_narrows_to_path() {
        let options = matching();
        assert_eq!(
            get_match_pattern_url("https://docs.a.com/guide/intro", &options),
            MatchPattern::Single("*://docs.a.com/guide/intro".to_string())
        );
        assert_eq!(
            get_match_pattern_url("https://a.com/search?q=rust", &options),
            MatchPattern::Multiple(vec![
                "*://a.com/search*".to_string(),
                "*://www.a.com/search*".to_string()
            ])
        );

        let host_only = UrlMatching {
            ignore_path_part: true,
            ..options
        };
        assert_eq!(
            get_match_pattern_url("https://docs.a.com/guide", &host_only),
            MatchPattern::Single("*://docs.a.com/*".to_string())
        );
    }

    #[test]
    fn patterns_match_like_host_queries() {
        let pattern = build_match_pattern("https://a.com/");
        assert!(pattern.matches("http://www.a.com/anything?x=1"));
        assert!(pattern.matches("https://A.com"));
        assert!(!pattern.matches("https://b.com/"));
        assert!(!pattern.matches("ftp://a.com/"));

        let narrowed = get_match_pattern_url("https://a.com/search?q=1", &matching());
        assert!(narrowed.matches("https://a.com/search?q=2"));
        assert!(!narrowed.matches("https://a.com/other"));

        assert!(MatchPattern::Single("about:blank*".to_string()).matches("about:blank"));
    }
}
