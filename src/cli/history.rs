//! History file resolution for the REPL.
//!
//! By default history lives in `~/.rivetdb_history`; the `RIVETDB_HISTORY`
//! environment variable overrides the location, and an empty value disables
//! persistence. rustyline handles the actual file I/O.

use std::env;
use std::path::PathBuf;

const DEFAULT_HISTORY_FILE: &str = ".rivetdb_history";
const HISTORY_ENV_VAR: &str = "RIVETDB_HISTORY";

pub fn history_path() -> Option<PathBuf> {
    if let Ok(custom_path) = env::var(HISTORY_ENV_VAR) {
        if custom_path.is_empty() {
            return None;
        }
        return Some(PathBuf::from(custom_path));
    }

    home_dir().map(|home| home.join(DEFAULT_HISTORY_FILE))
}

fn home_dir() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}
