//! `tab-dedup request`: answers one UI panel request against a tab snapshot.

use std::path::Path;

use tab_dedup_core::{DedupEngine, MemoryHost, StoredOptions, SystemClock};
use tab_dedup_protocol::{Request, Response, TabSnapshot};

use crate::input::{self, Result};

pub fn run(tabs: &Path, request: &Path, options: Option<&Path>) -> Result<()> {
    let tabs = input::load_tabs(tabs)?;
    let request = input::load_request(request)?;
    let stored = input::load_options(options)?;

    let response = answer(tabs, request, stored)?;
    if let Some(error) = &response.error {
        tracing::warn!(code = %error.code, message = %error.message, "Request failed");
    }
    input::print_json(&response)
}

fn answer(tabs: Vec<TabSnapshot>, request: Request, stored: StoredOptions) -> Result<Response> {
    let mut engine = DedupEngine::new(MemoryHost::with_tabs(tabs), SystemClock, stored)?;
    engine.start();
    Ok(engine.handle_request(request))
}
