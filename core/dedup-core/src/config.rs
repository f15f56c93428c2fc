//! Option storage and the immutable options snapshot used by every scan.
//!
//! Stored options are the raw `name -> { "value": ... }` map kept by the
//! preference store. [`DedupOptions`] is the typed view derived from them; the
//! engine swaps the whole snapshot on change and never mutates one in place.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{DedupError, Result};
use crate::normalizer::UrlMatching;
use crate::patterns::Whitelist;

pub const OPTIONS_DIR_NAME: &str = ".tab-dedup";
pub const OPTIONS_FILE_NAME: &str = "options.json";

// ═══════════════════════════════════════════════════════════════════════════════
// Option Table
// ═══════════════════════════════════════════════════════════════════════════════

pub const ON_DUPLICATE_TAB_DETECTED: &str = "onDuplicateTabDetected";
pub const ON_REMAINING_TAB: &str = "onRemainingTab";
pub const KEEP_TAB_BASED_ON_AGE: &str = "keepTabBasedOnAge";
pub const KEEP_TAB_WITH_HTTPS: &str = "keepTabWithHttps";
pub const KEEP_PINNED_TAB: &str = "keepPinnedTab";
pub const SCOPE: &str = "scope";
pub const IGNORE_HASH_PART: &str = "ignoreHashPart";
pub const IGNORE_SEARCH_PART: &str = "ignoreSearchPart";
pub const IGNORE_PATH_PART: &str = "ignorePathPart";
pub const IGNORE_3W: &str = "ignore3w";
pub const CASE_INSENSITIVE: &str = "caseInsensitive";
pub const COMPARE_WITH_TITLE: &str = "compareWithTitle";
pub const WHITE_LIST: &str = "whiteList";

enum OptionKind {
    Flag(bool),
    Choice {
        default: &'static str,
        allowed: &'static [&'static str],
    },
    Text(&'static str),
}

impl OptionKind {
    fn default_value(&self) -> Value {
        match self {
            OptionKind::Flag(value) => Value::Bool(*value),
            OptionKind::Choice { default, .. } => Value::String(default.to_string()),
            OptionKind::Text(value) => Value::String(value.to_string()),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            OptionKind::Flag(_) => value.is_boolean(),
            OptionKind::Choice { allowed, .. } => value
                .as_str()
                .map(|code| allowed.contains(&code))
                .unwrap_or(false),
            OptionKind::Text(_) => value.is_string(),
        }
    }
}

struct OptionSpec {
    name: &'static str,
    kind: OptionKind,
}

const OPTION_SPECS: &[OptionSpec] = &[
    OptionSpec {
        name: ON_DUPLICATE_TAB_DETECTED,
        kind: OptionKind::Choice {
            default: "A",
            allowed: &["A", "M"],
        },
    },
    OptionSpec {
        name: ON_REMAINING_TAB,
        kind: OptionKind::Choice {
            default: "A",
            allowed: &["A", "B"],
        },
    },
    OptionSpec {
        name: KEEP_TAB_BASED_ON_AGE,
        kind: OptionKind::Choice {
            default: "O",
            allowed: &["O", "N"],
        },
    },
    OptionSpec {
        name: KEEP_TAB_WITH_HTTPS,
        kind: OptionKind::Flag(true),
    },
    OptionSpec {
        name: KEEP_PINNED_TAB,
        kind: OptionKind::Flag(true),
    },
    OptionSpec {
        name: SCOPE,
        kind: OptionKind::Choice {
            default: "C",
            allowed: &["C", "A", "CC", "CA"],
        },
    },
    OptionSpec {
        name: IGNORE_HASH_PART,
        kind: OptionKind::Flag(false),
    },
    OptionSpec {
        name: IGNORE_SEARCH_PART,
        kind: OptionKind::Flag(false),
    },
    OptionSpec {
        name: IGNORE_PATH_PART,
        kind: OptionKind::Flag(false),
    },
    OptionSpec {
        name: IGNORE_3W,
        kind: OptionKind::Flag(true),
    },
    OptionSpec {
        name: CASE_INSENSITIVE,
        kind: OptionKind::Flag(true),
    },
    OptionSpec {
        name: COMPARE_WITH_TITLE,
        kind: OptionKind::Flag(false),
    },
    OptionSpec {
        name: WHITE_LIST,
        kind: OptionKind::Text(""),
    },
];

fn spec_for(name: &str) -> Option<&'static OptionSpec> {
    OPTION_SPECS.iter().find(|spec| spec.name == name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stored Options
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOption {
    pub value: Value,
}

/// Raw option map as persisted by the preference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredOptions(BTreeMap<String, StoredOption>);

impl Default for StoredOptions {
    fn default() -> Self {
        let entries = OPTION_SPECS
            .iter()
            .map(|spec| {
                (
                    spec.name.to_string(),
                    StoredOption {
                        value: spec.kind.default_value(),
                    },
                )
            })
            .collect();
        StoredOptions(entries)
    }
}

impl StoredOptions {
    pub fn empty() -> Self {
        StoredOptions(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(|option| &option.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Sets one option after checking the name and the value's shape.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let spec = spec_for(name).ok_or_else(|| DedupError::UnknownOption(name.to_string()))?;
        if !spec.kind.accepts(&value) {
            return Err(DedupError::InvalidOptionValue {
                name: name.to_string(),
                details: format!("unexpected value {}", value),
            });
        }
        if name == WHITE_LIST {
            Whitelist::parse(value.as_str().unwrap_or_default())?;
        }
        self.0.insert(name.to_string(), StoredOption { value });
        Ok(())
    }

    /// Drops obsolete keys, fills missing ones and resets malformed values.
    ///
    /// Returns true when anything changed and the map should be persisted.
    pub fn reconcile(&mut self) -> bool {
        let before = self.0.len();
        self.0.retain(|name, _| spec_for(name).is_some());
        let obsolete = before - self.0.len();

        let mut missing = 0usize;
        let mut reset = 0usize;
        for spec in OPTION_SPECS {
            match self.0.get_mut(spec.name) {
                None => {
                    missing += 1;
                    self.0.insert(
                        spec.name.to_string(),
                        StoredOption {
                            value: spec.kind.default_value(),
                        },
                    );
                }
                Some(option) if !spec.kind.accepts(&option.value) => {
                    reset += 1;
                    option.value = spec.kind.default_value();
                }
                Some(_) => {}
            }
        }

        let changed = obsolete + missing + reset > 0;
        if changed {
            tracing::warn!(obsolete, missing, reset, "Reconciled stored options");
        }
        changed
    }

    /// Builds the typed snapshot. Expects a reconciled map.
    pub fn to_options(&self) -> Result<DedupOptions> {
        let on_duplicate = match code_value(self, ON_DUPLICATE_TAB_DETECTED)? {
            "A" => DuplicateAction::AutoClose,
            "M" => DuplicateAction::Manual,
            other => return Err(invalid(ON_DUPLICATE_TAB_DETECTED, other)),
        };
        let on_remaining_tab = match code_value(self, ON_REMAINING_TAB)? {
            "A" => RemainingTabAction::Activate,
            "B" => RemainingTabAction::Reposition,
            other => return Err(invalid(ON_REMAINING_TAB, other)),
        };
        let keep_newer_tab = match code_value(self, KEEP_TAB_BASED_ON_AGE)? {
            "O" => false,
            "N" => true,
            other => return Err(invalid(KEEP_TAB_BASED_ON_AGE, other)),
        };
        let scope_code = code_value(self, SCOPE)?;
        let scope = Scope::from_code(scope_code).ok_or_else(|| invalid(SCOPE, scope_code))?;

        Ok(DedupOptions {
            on_duplicate,
            on_remaining_tab,
            keep_newer_tab,
            keep_tab_with_https: flag_value(self, KEEP_TAB_WITH_HTTPS)?,
            keep_pinned_tab: flag_value(self, KEEP_PINNED_TAB)?,
            scope,
            ignore_hash_part: flag_value(self, IGNORE_HASH_PART)?,
            ignore_search_part: flag_value(self, IGNORE_SEARCH_PART)?,
            ignore_path_part: flag_value(self, IGNORE_PATH_PART)?,
            ignore_3w: flag_value(self, IGNORE_3W)?,
            case_insensitive: flag_value(self, CASE_INSENSITIVE)?,
            compare_with_title: flag_value(self, COMPARE_WITH_TITLE)?,
            whitelist: Whitelist::parse(code_value(self, WHITE_LIST)?)?,
        })
    }
}

fn flag_value(stored: &StoredOptions, name: &str) -> Result<bool> {
    stored
        .get(name)
        .and_then(Value::as_bool)
        .ok_or_else(|| invalid(name, "expected a boolean"))
}

fn code_value<'a>(stored: &'a StoredOptions, name: &str) -> Result<&'a str> {
    stored
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(name, "expected a string"))
}

fn invalid(name: &str, details: &str) -> DedupError {
    DedupError::InvalidOptionValue {
        name: name.to_string(),
        details: details.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Typed Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateAction {
    #[default]
    AutoClose,
    Manual,
}

/// What happens to the surviving tab after its duplicate was closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemainingTabAction {
    /// Focus the surviving tab in its window.
    #[default]
    Activate,
    /// Move the survivor into the closed tab's slot and activate it if the
    /// closed tab was active.
    Reposition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    pub all_windows: bool,
    pub per_container: bool,
}

impl Scope {
    pub fn from_code(code: &str) -> Option<Self> {
        let (all_windows, per_container) = match code {
            "C" => (false, false),
            "A" => (true, false),
            "CC" => (false, true),
            "CA" => (true, true),
            _ => return None,
        };
        Some(Self {
            all_windows,
            per_container,
        })
    }

    pub fn code(&self) -> &'static str {
        match (self.all_windows, self.per_container) {
            (false, false) => "C",
            (true, false) => "A",
            (false, true) => "CC",
            (true, true) => "CA",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupOptions {
    pub on_duplicate: DuplicateAction,
    pub on_remaining_tab: RemainingTabAction,
    pub keep_newer_tab: bool,
    pub keep_tab_with_https: bool,
    pub keep_pinned_tab: bool,
    pub scope: Scope,
    pub ignore_hash_part: bool,
    pub ignore_search_part: bool,
    pub ignore_path_part: bool,
    pub ignore_3w: bool,
    pub case_insensitive: bool,
    pub compare_with_title: bool,
    pub whitelist: Whitelist,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            on_duplicate: DuplicateAction::AutoClose,
            on_remaining_tab: RemainingTabAction::Activate,
            keep_newer_tab: false,
            keep_tab_with_https: true,
            keep_pinned_tab: true,
            scope: Scope::default(),
            ignore_hash_part: false,
            ignore_search_part: false,
            ignore_path_part: false,
            ignore_3w: true,
            case_insensitive: true,
            compare_with_title: false,
            whitelist: Whitelist::default(),
        }
    }
}

impl DedupOptions {
    pub fn auto_close(&self) -> bool {
        self.on_duplicate == DuplicateAction::AutoClose
    }

    pub fn url_matching(&self) -> UrlMatching {
        UrlMatching {
            ignore_hash_part: self.ignore_hash_part,
            ignore_search_part: self.ignore_search_part,
            ignore_path_part: self.ignore_path_part,
            force_https: self.keep_tab_with_https,
            ignore_3w: self.ignore_3w,
            case_insensitive: self.case_insensitive,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════════════════════════

/// Returns the default options file path (~/.tab-dedup/options.json).
pub fn default_options_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(OPTIONS_DIR_NAME).join(OPTIONS_FILE_NAME))
}

/// Loads stored options, falling back to defaults for a missing, empty or
/// corrupt file. The flag is true when the result differs from the file.
pub fn load_stored_options(path: &Path) -> (StoredOptions, bool) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return (StoredOptions::default(), true);
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read options file; using defaults");
            return (StoredOptions::default(), true);
        }
    };

    if content.trim().is_empty() {
        tracing::warn!(path = %path.display(), "Empty options file; using defaults");
        return (StoredOptions::default(), true);
    }

    match serde_json::from_str::<StoredOptions>(&content) {
        Ok(mut stored) => {
            let changed = stored.reconcile();
            (stored, changed)
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %path.display(),
                "Failed to parse options file; using defaults"
            );
            (StoredOptions::default(), true)
        }
    }
}

/// Writes stored options atomically (temp file + rename).
pub fn save_stored_options(path: &Path, stored: &StoredOptions) -> Result<()> {
    let parent = path.parent().ok_or_else(|| DedupError::ConfigMalformed {
        path: path.to_path_buf(),
        details: "options path has no parent directory".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(|source| DedupError::Io {
        context: format!("creating {}", parent.display()),
        source,
    })?;

    let content = serde_json::to_string_pretty(stored).map_err(|source| DedupError::Json {
        context: "serializing options".to_string(),
        source,
    })?;

    let write_failed = |source: std::io::Error| DedupError::ConfigWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut temp_file = NamedTempFile::new_in(parent).map_err(write_failed)?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(write_failed)?;
    temp_file.flush().map_err(write_failed)?;
    temp_file
        .persist(path)
        .map_err(|err| write_failed(err.error))?;
    Ok(())
}

/// Loads and reconciles stored options, persisting them when they changed.
pub fn initialize_options(path: &Path) -> Result<StoredOptions> {
    let (stored, changed) = load_stored_options(path);
    if changed {
        save_stored_options(path, &stored)?;
    }
    Ok(stored)
}
