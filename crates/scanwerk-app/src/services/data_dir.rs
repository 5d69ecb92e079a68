// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::PathBuf;

use tracing::warn;

const APP_DIR: &str = "scanwerk";

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = resolve(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    );
    if let Err(err) = std::fs::create_dir_all(&dir) {
        warn!(path = %dir.display(), %err, "Could not create data directory");
    }
    dir
}

/// `$XDG_DATA_HOME/scanwerk`, then `$HOME/.local/share/scanwerk`, then
/// `/tmp/scanwerk`. Empty variables count as unset.
fn resolve(xdg_data_home: Option<String>, home: Option<String>) -> PathBuf {
    let base = match (xdg_data_home, home) {
        (Some(xdg), _) if !xdg.is_empty() => PathBuf::from(xdg),
        (_, Some(home)) if !home.is_empty() => PathBuf::from(home).join(".local").join("share"),
        _ => PathBuf::from("/tmp"),
    };
    base.join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdg_wins_over_home() {
        let dir = resolve(Some("/data".into()), Some("/home/ana".into()));
        assert_eq!(dir, PathBuf::from("/data/scanwerk"));
    }

    #[test]
    fn home_fallback() {
        let dir = resolve(None, Some("/home/ana".into()));
        assert_eq!(dir, PathBuf::from("/home/ana/.local/share/scanwerk"));
        let dir = resolve(Some(String::new()), Some("/home/ana".into()));
        assert_eq!(dir, PathBuf::from("/home/ana/.local/share/scanwerk"));
    }

    #[test]
    fn last_resort_is_tmp() {
        assert_eq!(resolve(None, None), PathBuf::from("/tmp/scanwerk"));
    }
}
