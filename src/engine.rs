use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::backend::{DataSource, DatasetKind, FetchError, HttpBackend, SnapshotDir};
use crate::config::Selection;
use crate::core::{InventoryItem, Project, Report};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub api_url: String,
    pub timeout: Duration,
    pub from_dir: Option<PathBuf>,
    pub show_progress: bool,
}

#[derive(Clone)]
pub struct Engine {
    opts: EngineOptions,
    source: Arc<dyn DataSource>,
    home_dir: PathBuf,
}

impl Engine {
    pub fn new(opts: EngineOptions) -> Result<Self> {
        let home_dir = crate::platform::effective_home_dir()?;
        let source: Arc<dyn DataSource> = match &opts.from_dir {
            Some(dir) => Arc::new(SnapshotDir::new(dir)),
            None => Arc::new(HttpBackend::new(&opts.api_url, opts.timeout)?),
        };
        Ok(Self::with_source(opts, source, home_dir))
    }

    pub fn with_source(opts: EngineOptions, source: Arc<dyn DataSource>, home_dir: PathBuf) -> Self {
        Self {
            opts,
            source,
            home_dir,
        }
    }

    pub fn source(&self) -> Arc<dyn DataSource> {
        Arc::clone(&self.source)
    }

    pub fn timeout(&self) -> Duration {
        self.opts.timeout
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn report(&self, selection: &Selection) -> Result<Report, FetchError> {
        self.fetch(DatasetKind::Report, Some(selection), |s| s.report(selection))
    }

    pub fn projects(&self) -> Result<Vec<Project>, FetchError> {
        self.fetch(DatasetKind::Projects, None, |s| s.projects())
    }

    pub fn resources(&self, selection: &Selection) -> Result<Vec<InventoryItem>, FetchError> {
        self.fetch(DatasetKind::Resources, Some(selection), |s| {
            s.resources(selection)
        })
    }

    fn fetch<T>(
        &self,
        kind: DatasetKind,
        selection: Option<&Selection>,
        f: impl FnOnce(&dyn DataSource) -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();
        let pb = if progress_enabled {
            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb.set_message(format!("{} を取得中...", kind.as_str()));
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let started = Instant::now();
        let result = f(self.source.as_ref());

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        match result {
            Ok(value) => {
                tracing::info!(
                    dataset = kind.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fetched"
                );
                Ok(value)
            }
            Err(err) => {
                crate::logs::record_fetch_failure(
                    &self.home_dir,
                    kind,
                    &self.source.describe(),
                    selection,
                    &err,
                    started.elapsed(),
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Unreachable;

    impl DataSource for Unreachable {
        fn describe(&self) -> String {
            "stub://unreachable".to_string()
        }

        fn report(&self, _selection: &Selection) -> Result<Report, FetchError> {
            Err(FetchError::MissingProject)
        }

        fn projects(&self) -> Result<Vec<Project>, FetchError> {
            Ok(vec![Project {
                project_id: "demo".to_string(),
                display_name: String::new(),
            }])
        }

        fn resources(&self, _selection: &Selection) -> Result<Vec<InventoryItem>, FetchError> {
            Err(FetchError::MissingProject)
        }
    }

    fn temp_home() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let home = std::env::temp_dir().join(format!(
            "clouddiet-engine-unit-{}-{seq}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&home);
        std::fs::create_dir_all(&home).expect("create home");
        home
    }

    fn engine(home: &Path) -> Engine {
        Engine::with_source(
            EngineOptions {
                api_url: String::new(),
                timeout: Duration::from_secs(1),
                from_dir: None,
                show_progress: false,
            },
            Arc::new(Unreachable),
            home.to_path_buf(),
        )
    }

    #[test]
    fn failed_fetch_writes_diagnostic_log() {
        let home = temp_home();
        let engine = engine(&home);
        let selection = Selection::new("demo", vec!["us-central1-a".to_string()]);
        assert!(engine.report(&selection).is_err());

        let logs: Vec<_> = std::fs::read_dir(crate::logs::logs_dir(&home))
            .expect("logs dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(logs.len(), 1, "{logs:?}");
        assert!(logs[0].starts_with("fetch-error-"));

        let _ = std::fs::remove_dir_all(&home);
    }

    #[test]
    fn successful_fetch_writes_nothing() {
        let home = temp_home();
        let engine = engine(&home);
        assert_eq!(engine.projects().expect("projects").len(), 1);
        assert!(!crate::logs::logs_dir(&home).exists());
        let _ = std::fs::remove_dir_all(&home);
    }
}
