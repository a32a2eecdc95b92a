use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

use crate::backend::{DatasetKind, FetchError};
use crate::config::Selection;

const MAX_ERROR_BYTES: usize = 16 * 1024;

#[derive(Debug, Serialize)]
struct FetchErrorLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    dataset: &'static str,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    zones: Vec<String>,
    error_code: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    causes: Vec<String>,
}

// Installs the stderr subscriber. `RUST_LOG` wins over the flags, except
// in the TUI where any output would corrupt the screen.
pub fn init_tracing(verbose: bool, quiet: bool, tui: bool) {
    let filter = if tui {
        EnvFilter::new("off")
    } else {
        let default_level = if quiet {
            "off"
        } else if verbose {
            "info"
        } else {
            "warn"
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/clouddiet/logs")
}

pub fn write_fetch_error_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    kind: DatasetKind,
    source: &str,
    selection: Option<&Selection>,
    error: &FetchError,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = finished_at.unix_timestamp_nanos();
    let file_name = format!("fetch-error-{pid}-{ts}.json");
    let path = dir.join(file_name);

    let selection = selection.filter(|_| kind.is_scoped());
    let log = FetchErrorLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "fetch",
        started_at: started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        finished_at: finished_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        dataset: kind.as_str(),
        source: mask_home(Path::new(source), home_dir),
        project_id: selection.map(|s| s.project_id.clone()),
        zones: selection.map(|s| s.zones.clone()).unwrap_or_default(),
        error_code: error.code(),
        error: truncate_string(&error.to_string(), MAX_ERROR_BYTES),
        causes: causes(error),
    };

    let buf = serde_json::to_vec_pretty(&log).context("ログ(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

pub fn record_fetch_failure(
    home_dir: &Path,
    kind: DatasetKind,
    source: &str,
    selection: Option<&Selection>,
    error: &FetchError,
    elapsed: Duration,
) -> Option<PathBuf> {
    tracing::warn!(
        dataset = kind.as_str(),
        code = error.code(),
        elapsed_ms = elapsed.as_millis() as u64,
        "fetch failed: {error}"
    );
    let finished_at = OffsetDateTime::now_utc();
    let started_at = finished_at - elapsed;
    match write_fetch_error_log(home_dir, started_at, finished_at, kind, source, selection, error)
    {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::warn!("failed to write fetch log: {err:#}");
            None
        }
    }
}

fn causes(error: &FetchError) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = std::error::Error::source(error);
    while let Some(cause) = cur {
        out.push(truncate_string(&cause.to_string(), MAX_ERROR_BYTES));
        cur = cause.source();
    }
    out
}

fn mask_home(path: &Path, home_dir: &Path) -> String {
    let Ok(stripped) = path.strip_prefix(home_dir) else {
        return path.display().to_string();
    };
    let stripped = stripped.display().to_string();
    if stripped.is_empty() {
        "~".to_string()
    } else {
        format!("~/{stripped}")
    }
}

fn truncate_string(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut idx = max_bytes;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    let head = &s[..idx];
    format!("{head}\n...(truncated, total={} bytes)", s.len())
}
