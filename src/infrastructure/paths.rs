//! Path helpers for data files and user-supplied paths.
//!
//! The data directory holds trace exports. It is taken from
//! `LIFECYCLE_DATA_DIR` when set, otherwise `~/.local/share/lifecycle-manager`,
//! falling back to a relative `.lifecycle-manager` when no home is known.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "LIFECYCLE_DATA_DIR";

/// Returns the data directory for trace files.
///
/// # Examples
///
/// ```
/// use lifecycle_manager::infrastructure::get_data_dir;
///
/// let data_dir = get_data_dir();
/// assert!(data_dir.ends_with("lifecycle-manager") || std::env::var_os("LIFECYCLE_DATA_DIR").is_some());
/// ```
#[must_use]
pub fn get_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_DIR_ENV), std::env::var_os("HOME"))
}

fn data_dir_from(override_dir: Option<OsString>, home: Option<OsString>) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    home.filter(|h| !h.is_empty()).map_or_else(
        || PathBuf::from(".lifecycle-manager"),
        |home| {
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("lifecycle-manager")
        },
    )
}

/// Resolves `path` against the data directory unless it is absolute.
#[must_use]
pub fn resolve_in_data_dir(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_data_dir().join(path)
    }
}

/// Expands a leading `~` to the user's home directory.
///
/// # Examples
///
/// ```
/// use lifecycle_manager::infrastructure::expand_tilde;
///
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    expand_tilde_with(path, std::env::var_os("HOME"))
}

fn expand_tilde_with(path: &str, home: Option<OsString>) -> String {
    let Some(home) = home.and_then(|h| h.into_string().ok()) else {
        return path.to_string();
    };
    if path == "~" {
        home
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{rest}", home.trim_end_matches('/'))
    } else {
        path.to_string()
    }
}
