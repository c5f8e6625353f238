//! Shared CLI helpers used across multiple commands.

use patchwork_config::{SessionConfig, find_session};

/// Load a session by path or by name from the user sessions directory.
pub fn load_session(name: &str) -> anyhow::Result<SessionConfig> {
    let Some(path) = find_session(name) else {
        anyhow::bail!(
            "Session '{}' not found. Pass a path to a .toml file or a name from {}",
            name,
            patchwork_config::user_sessions_dir().display()
        );
    };
    tracing::info!(path = %path.display(), "loading session");
    Ok(SessionConfig::load(&path)?)
}

/// Checks a `--graph` index against the session.
pub fn check_graph_index(session: &SessionConfig, index: Option<usize>) -> anyhow::Result<()> {
    if let Some(index) = index
        && index >= session.graphs.len()
    {
        anyhow::bail!(
            "Graph index {} out of range: session '{}' has {} graph(s)",
            index,
            session.name,
            session.graphs.len()
        );
    }
    Ok(())
}

/// Converts a linear level to dBFS, floored at -120.
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -120.0
    } else {
        (20.0 * linear.log10()).max(-120.0)
    }
}
