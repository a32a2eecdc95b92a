use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Selection;
use crate::core::{InventoryItem, Project, Report};

const MAX_ERROR_BODY_CHARS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Report,
    Projects,
    Resources,
}

impl DatasetKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Report => "report",
            DatasetKind::Projects => "projects",
            DatasetKind::Resources => "resources",
        }
    }

    pub const fn endpoint(self) -> &'static str {
        match self {
            DatasetKind::Report => "/api/v1/report",
            DatasetKind::Projects => "/api/v1/projects",
            DatasetKind::Resources => "/api/v1/resources",
        }
    }

    pub const fn file_name(self) -> &'static str {
        match self {
            DatasetKind::Report => "report.json",
            DatasetKind::Projects => "projects.json",
            DatasetKind::Resources => "resources.json",
        }
    }

    pub const fn is_scoped(self) -> bool {
        !matches!(self, DatasetKind::Projects)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("project_id が未設定です（--project / CLOUDDIET_PROJECT_ID / `clouddiet config --set-project` で指定してください）")]
    MissingProject,
    #[error("バックエンドへの接続に失敗しました: {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("バックエンドがエラーを返しました（HTTP {status}）: {url}{detail}")]
    Status {
        url: String,
        status: u16,
        detail: String,
    },
    #[error("応答(JSON)の解析に失敗しました: {location}")]
    Decode {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("スナップショットを読み取れませんでした: {}", .path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub const fn code(&self) -> &'static str {
        match self {
            FetchError::MissingProject => "MISSING_PROJECT",
            FetchError::Transport { .. } => "TRANSPORT",
            FetchError::Status { .. } => "HTTP_STATUS",
            FetchError::Decode { .. } => "DECODE",
            FetchError::Snapshot { .. } => "SNAPSHOT",
        }
    }
}

pub trait DataSource: Send + Sync {
    fn describe(&self) -> String;

    fn report(&self, selection: &Selection) -> Result<Report, FetchError>;

    fn projects(&self) -> Result<Vec<Project>, FetchError>;

    fn resources(&self, selection: &Selection) -> Result<Vec<InventoryItem>, FetchError>;
}

pub struct HttpBackend {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpBackend {
    pub fn new(api_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = api_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("api_url が空です");
        }
        reqwest::Url::parse(&base_url)
            .with_context(|| format!("api_url が不正です: {base_url}"))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("clouddiet/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("HTTP クライアントの初期化に失敗しました")?;
        Ok(Self { base_url, client })
    }

    pub fn url_for(&self, kind: DatasetKind, selection: Option<&Selection>) -> String {
        let raw = format!("{}{}", self.base_url, kind.endpoint());
        let Some(selection) = selection.filter(|_| kind.is_scoped()) else {
            return raw;
        };
        let params = [
            ("project_id", selection.project_id.clone()),
            ("zones", selection.zones_param()),
        ];
        match reqwest::Url::parse_with_params(&raw, &params) {
            Ok(url) => url.to_string(),
            Err(_) => raw,
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        kind: DatasetKind,
        selection: Option<&Selection>,
    ) -> Result<T, FetchError> {
        if let Some(selection) = selection {
            if !selection.has_project() {
                return Err(FetchError::MissingProject);
            }
        }
        let url = self.url_for(kind, selection);
        tracing::info!(dataset = kind.as_str(), %url, "fetching");

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        let body = resp.text().map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            location: url,
            source,
        })
    }
}

fn error_detail(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return String::new();
    }
    let mut out: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        out.push('…');
    }
    format!("\n{out}")
}

impl DataSource for HttpBackend {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    fn report(&self, selection: &Selection) -> Result<Report, FetchError> {
        self.get_json(DatasetKind::Report, Some(selection))
    }

    fn projects(&self) -> Result<Vec<Project>, FetchError> {
        self.get_json(DatasetKind::Projects, None)
    }

    fn resources(&self, selection: &Selection) -> Result<Vec<InventoryItem>, FetchError> {
        self.get_json(DatasetKind::Resources, Some(selection))
    }
}

pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read<T: DeserializeOwned>(&self, kind: DatasetKind) -> Result<T, FetchError> {
        let path = self.dir.join(kind.file_name());
        tracing::info!(dataset = kind.as_str(), path = %path.display(), "reading snapshot");
        let s = std::fs::read_to_string(&path).map_err(|source| FetchError::Snapshot {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&s).map_err(|source| FetchError::Decode {
            location: path.display().to_string(),
            source,
        })
    }
}

impl DataSource for SnapshotDir {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn report(&self, _selection: &Selection) -> Result<Report, FetchError> {
        self.read(DatasetKind::Report)
    }

    fn projects(&self) -> Result<Vec<Project>, FetchError> {
        self.read(DatasetKind::Projects)
    }

    fn resources(&self, _selection: &Selection) -> Result<Vec<InventoryItem>, FetchError> {
        self.read(DatasetKind::Resources)
    }
}
