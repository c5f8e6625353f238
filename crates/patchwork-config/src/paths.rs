//! Platform-specific paths for session files.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/patchwork/` (Linux), `~/Library/Application Support/patchwork/` (macOS), `%APPDATA%\patchwork\` (Windows)
//! - **User sessions**: the `sessions/` subdirectory of the user config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use patchwork_config::paths;
//!
//! if let Some(path) = paths::find_session("live_set") {
//!     println!("Found session at: {:?}", path);
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "patchwork";

/// Subdirectory name for sessions.
const SESSIONS_SUBDIR: &str = "sessions";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user-specific sessions directory.
pub fn user_sessions_dir() -> PathBuf {
    user_config_dir().join(SESSIONS_SUBDIR)
}

/// Ensure the user sessions directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_sessions_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_sessions_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Find a session file by path or by name.
///
/// An existing file path wins; otherwise `name` (with or without `.toml`)
/// is looked up in the user sessions directory.
pub fn find_session(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let user_path = user_sessions_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// List all session files in the user sessions directory.
pub fn list_user_sessions() -> Vec<PathBuf> {
    list_sessions_in_dir(&user_sessions_dir())
}

/// List the `.toml` files in `dir`, sorted by path.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_sessions_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut sessions: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    sessions.sort();
    sessions
}

/// Get the session name from a file path.
///
/// ```rust
/// use patchwork_config::paths::session_name_from_path;
/// use std::path::Path;
///
/// let name = session_name_from_path(Path::new("/path/to/live_set.toml"));
/// assert_eq!(name, Some("live_set".to_string()));
/// ```
pub fn session_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_user_dirs() {
        assert!(user_config_dir().to_string_lossy().contains("patchwork"));
        assert!(user_sessions_dir().ends_with("sessions"));
    }

    #[test]
    fn test_find_session_by_path() {
        let temp_dir = TempDir::new().unwrap();
        let session_path = temp_dir.path().join("set.toml");
        fs::write(&session_path, "name = \"set\"").unwrap();

        assert_eq!(find_session(session_path.to_str().unwrap()), Some(session_path));
    }

    #[test]
    fn test_find_session_not_found() {
        assert!(find_session("nonexistent_session_12345").is_none());
    }

    #[test]
    fn test_list_sessions_in_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.toml"), "").unwrap();
        fs::write(temp_dir.path().join("a.toml"), "").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(temp_dir.path().join("dir.toml")).unwrap();

        let sessions = list_sessions_in_dir(temp_dir.path());
        let names: Vec<_> = sessions
            .iter()
            .filter_map(|p| session_name_from_path(p))
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_list_missing_dir() {
        assert!(list_sessions_in_dir(Path::new("/nonexistent/patchwork/dir")).is_empty());
    }
}
