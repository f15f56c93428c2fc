//! `tab-dedup explain`: shows how one URL is classified and keyed.

use std::path::Path;

use serde::Serialize;
use tab_dedup_core::{
    build_match_pattern, get_match_pattern_url, get_matching_url, is_browser_url, is_https_url,
    is_valid_url, normalize_url, DedupOptions, MatchPattern,
};

use crate::input::{self, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlExplanation {
    pub url: String,
    pub valid: bool,
    pub browser_url: bool,
    pub https: bool,
    pub normalized: String,
    pub match_pattern: MatchPattern,
    pub matching_url: String,
    pub match_pattern_url: MatchPattern,
}

pub fn run(url: &str, options: Option<&Path>) -> Result<()> {
    let options = input::load_options(options)?.to_options()?;
    input::print_json(&explain(url, &options))
}

pub fn explain(url: &str, options: &DedupOptions) -> UrlExplanation {
    let matching = options.url_matching();
    UrlExplanation {
        url: url.to_string(),
        valid: is_valid_url(url),
        browser_url: is_browser_url(url),
        https: is_https_url(url),
        normalized: normalize_url(url),
        match_pattern: build_match_pattern(url),
        matching_url: get_matching_url(url, &matching),
        match_pattern_url: get_match_pattern_url(url, &matching),
    }
}
