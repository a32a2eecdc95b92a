use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_ZONES: [&str; 2] = ["us-central1-a", "us-central1-b"];

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub backend: BackendConfig,
    pub selection: Selection,
    pub ui: UiConfig,
    pub remediation: RemediationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendConfig {
    pub api_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemediationConfig {
    pub cli: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub project_id: String,
    pub zones: Vec<String>,
}

impl Selection {
    pub fn new(project_id: impl Into<String>, zones: Vec<String>) -> Self {
        Self {
            project_id: project_id.into().trim().to_string(),
            zones,
        }
    }

    pub fn zones_param(&self) -> String {
        self.zones.join(",")
    }

    pub fn primary_zone(&self) -> &str {
        self.zones.first().map(String::as_str).unwrap_or("")
    }

    pub fn has_project(&self) -> bool {
        !self.project_id.is_empty()
    }
}

pub fn parse_zones(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(|z| z.to_string())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionDraft {
    pub project_id: String,
    pub zones: String,
}

impl SelectionDraft {
    pub fn from_selection(selection: &Selection) -> Self {
        Self {
            project_id: selection.project_id.clone(),
            zones: selection.zones.join(", "),
        }
    }

    pub fn is_dirty(&self, committed: &Selection) -> bool {
        match self.to_selection() {
            Ok(selection) => &selection != committed,
            Err(_) => true,
        }
    }

    pub fn to_selection(&self) -> Result<Selection> {
        let project_id = self.project_id.trim();
        if project_id.is_empty() {
            return Err(anyhow::anyhow!("project_id を入力してください"));
        }
        if !is_valid_name(project_id) {
            return Err(anyhow::anyhow!(
                "project_id に使えない文字が含まれています: {project_id}"
            ));
        }
        let zones = parse_zones(&self.zones);
        if zones.is_empty() {
            return Err(anyhow::anyhow!(
                "ゾーンを1つ以上入力してください（例: us-central1-a, us-central1-b）"
            ));
        }
        if let Some(bad) = zones.iter().find(|z| !is_valid_name(z)) {
            return Err(anyhow::anyhow!("ゾーン名が不正です: {bad}"));
        }
        Ok(Selection::new(project_id, zones))
    }
}

fn is_valid_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

pub fn commit(draft: &SelectionDraft, path: &Path) -> Result<Selection> {
    let selection = draft.to_selection()?;
    save_selection(path, &selection)?;
    Ok(selection)
}

pub fn save_selection(path: &Path, selection: &Selection) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("設定ディレクトリの作成に失敗しました: {}", parent.display())
        })?;
    }
    let s = toml::to_string_pretty(selection).context("選択内容(TOML)のシリアライズに失敗しました")?;
    std::fs::write(path, s)
        .with_context(|| format!("選択内容の保存に失敗しました: {}", path.display()))
}

pub fn load_selection(path: &Path) -> Result<Option<Selection>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("選択内容の読み取りに失敗しました: {}", path.display()))?;
    let selection: Selection =
        toml::from_str(&s).context("選択内容(TOML)の解析に失敗しました")?;
    Ok(Some(selection))
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                api_url: DEFAULT_API_URL.to_string(),
                timeout_secs: 30,
            },
            selection: Selection {
                project_id: String::new(),
                zones: DEFAULT_ZONES.iter().map(|z| z.to_string()).collect(),
            },
            ui: UiConfig {
                color: true,
                max_table_rows: 20,
            },
            remediation: RemediationConfig {
                cli: crate::remediation::DEFAULT_CLI.to_string(),
            },
            config_path: None,
            selection_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    backend: Option<RawBackendConfig>,
    selection: Option<RawSelectionConfig>,
    ui: Option<RawUiConfig>,
    remediation: Option<RawRemediationConfig>,
}

#[derive(Debug, Deserialize)]
struct RawBackendConfig {
    api_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSelectionConfig {
    project_id: Option<String>,
    zones: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawRemediationConfig {
    cli: Option<String>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/clouddiet/config.toml")
}

pub fn selection_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/clouddiet/selection.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw)?;
        cfg.config_path = Some(path.display().to_string());
    }

    let sel_path = selection_path(home_dir);
    if let Some(selection) = load_selection(&sel_path)? {
        cfg.selection = selection;
    }
    cfg.selection_path = Some(sel_path.display().to_string());

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn non_zero_timeout(secs: u64, source: &str) -> Result<u64> {
    if secs == 0 {
        return Err(anyhow!("{source} は 1 以上を指定してください"));
    }
    Ok(secs)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) -> Result<()> {
    if let Some(backend) = raw.backend {
        if let Some(api_url) = backend.api_url {
            cfg.backend.api_url = api_url;
        }
        if let Some(timeout_secs) = backend.timeout_secs {
            cfg.backend.timeout_secs = non_zero_timeout(timeout_secs, "backend.timeout_secs")?;
        }
    }

    if let Some(selection) = raw.selection {
        if let Some(project_id) = selection.project_id {
            cfg.selection.project_id = project_id.trim().to_string();
        }
        if let Some(zones) = selection.zones {
            cfg.selection.zones = zones
                .iter()
                .map(|z| z.trim().to_string())
                .filter(|z| !z.is_empty())
                .collect();
        }
    }

    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }

    if let Some(remediation) = raw.remediation {
        if let Some(cli) = remediation.cli {
            cfg.remediation.cli = cli;
        }
    }

    Ok(())
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("CLOUDDIET_API_URL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.backend.api_url = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("CLOUDDIET_TIMEOUT_SECS") {
        let secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "CLOUDDIET_TIMEOUT_SECS")?;
        cfg.backend.timeout_secs = non_zero_timeout(secs, "CLOUDDIET_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("CLOUDDIET_PROJECT_ID") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.selection.project_id = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("CLOUDDIET_ZONES") {
        let zones = parse_zones(&v);
        if !zones.is_empty() {
            cfg.selection.zones = zones;
        }
    }
    if let Ok(v) = std::env::var("CLOUDDIET_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "CLOUDDIET_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("CLOUDDIET_UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v
            .trim()
            .parse::<usize>()
            .with_context(|| "CLOUDDIET_UI_MAX_TABLE_ROWS")?;
    }
    if let Ok(v) = std::env::var("CLOUDDIET_REMEDIATION_CLI") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.remediation.cli = v.to_string();
        }
    }

    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}
