use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;

use crate::config::{EffectiveConfig, SelectionDraft};
use crate::core::{InventoryItem, Project, Recommendation, ResourceType, Summary, ZombieResource};
use crate::engine::{Engine, EngineOptions};
use crate::insights::{self, ChartPoint, InventoryView, SavingsBreakdown};
use crate::remediation::{CommandResult, Synthesizer};
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "clouddiet",
    version,
    about = "GCP のコスト削減推奨とゾンビリソースを一覧し、修正用の gcloud コマンドを組み立てる"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "バックエンド呼び出しのタイムアウト（秒）")]
    pub timeout: Option<u64>,
    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,
    #[arg(long, global = true)]
    pub project: Option<String>,
    #[arg(long, global = true, help = "カンマ区切りのゾーン一覧")]
    pub zones: Option<String>,
    #[arg(
        long = "from-dir",
        global = true,
        help = "バックエンドの代わりに保存済み JSON（report.json / projects.json / resources.json）を読む"
    )]
    pub from_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Overview,
    Recommendations,
    Zombies,
    Inventory(InventoryArgs),
    Projects,
    Command(CommandArgs),
    Link(LinkArgs),
    Ui(UiArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct InventoryArgs {
    #[arg(
        long,
        default_value = "",
        help = "名前・種別・場所に対する部分一致（大文字小文字を区別しない）"
    )]
    pub query: String,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["id", "description", "zombie"])
))]
pub struct CommandArgs {
    #[arg(long, help = "レポート内の推奨 ID")]
    pub id: Option<String>,
    #[arg(long, help = "推奨の説明文（バックエンドに問い合わせない）")]
    pub description: Option<String>,
    #[arg(long, help = "レポート内のゾンビリソース ID")]
    pub zombie: Option<String>,
    #[arg(long, help = "推奨にゾーンがない場合に使うゾーン")]
    pub zone: Option<String>,
    #[arg(long, help = "OSC 52 で端末のクリップボードにもコピーする")]
    pub copy: bool,
}

#[derive(Debug, Args)]
pub struct LinkArgs {
    #[arg(long = "type")]
    pub resource_type: ResourceType,
    #[arg(long)]
    pub zone: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct UiArgs {}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
    #[arg(long = "set-project")]
    pub set_project: Option<String>,
    #[arg(long = "set-zones")]
    pub set_zones: Option<String>,
}

#[derive(Debug, Serialize)]
struct OverviewJson<'a> {
    project_id: &'a str,
    zones: &'a [String],
    summary: &'a Summary,
    savings_breakdown: SavingsBreakdown,
    savings_categories: [ChartPoint; 2],
    cost_by_zone: Vec<ChartPoint>,
}

#[derive(Debug, Serialize)]
struct RecommendationRow<'a> {
    #[serde(flatten)]
    recommendation: &'a Recommendation,
    remediation: CommandResult,
}

#[derive(Debug, Serialize)]
struct ZombieRow<'a> {
    #[serde(flatten)]
    zombie: &'a ZombieResource,
    console_url: String,
    remediation: CommandResult,
}

#[derive(Debug, Serialize)]
struct InventoryJson<'a> {
    query: &'a str,
    total: usize,
    matched: usize,
    items: Vec<&'a InventoryItem>,
}

#[derive(Debug, Serialize)]
struct LinkJson<'a> {
    resource_type: ResourceType,
    project_id: &'a str,
    url: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let is_ui_mode = matches!(&cli.command, Commands::Ui(_));
    crate::logs::init_tracing(cli.verbose, cli.quiet, is_ui_mode);

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let env_config_path = std::env::var_os("CLOUDDIET_CONFIG").map(std::path::PathBuf::from);
    let mut cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;
    apply_cli_overrides(&mut cfg, &cli)?;

    let color = stdout_is_tty && cfg.ui.color && !cli.no_color;

    let ui_cfg = UiConfig {
        color,
        stdin_is_tty,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let synthesizer = Synthesizer::new(cfg.remediation.cli.clone());
    let selection = cfg.selection.clone();
    let engine = || {
        Engine::new(EngineOptions {
            api_url: cfg.backend.api_url.clone(),
            timeout: Duration::from_secs(cfg.backend.timeout_secs),
            from_dir: cli.from_dir.clone(),
            show_progress: ui_cfg.stderr_is_tty && !cli.quiet && !cli.json && !is_ui_mode,
        })
        .map_err(crate::exit::invalid_args_err)
    };

    match &cli.command {
        Commands::Overview => {
            let report = engine()?
                .report(&selection)
                .map_err(crate::exit::fetch_failed)?;
            if cli.json {
                let breakdown =
                    insights::aggregate_savings(&report.recommendations, &report.zombie_resources);
                write_json(&OverviewJson {
                    project_id: &selection.project_id,
                    zones: &selection.zones,
                    summary: &report.summary,
                    savings_breakdown: breakdown,
                    savings_categories: breakdown.categories(),
                    cost_by_zone: insights::to_chart_series(&report.summary.cost_by_zone),
                })?;
            } else {
                crate::ui::print_overview(&report, &selection, &ui_cfg);
            }
        }
        Commands::Recommendations => {
            let report = engine()?
                .report(&selection)
                .map_err(crate::exit::fetch_failed)?;
            if cli.json {
                let rows: Vec<RecommendationRow<'_>> = report
                    .recommendations
                    .iter()
                    .map(|rec| RecommendationRow {
                        recommendation: rec,
                        remediation: synthesizer.synthesize(rec, selection.primary_zone()),
                    })
                    .collect();
                write_json(&rows)?;
            } else {
                crate::ui::print_recommendations(
                    &report,
                    &synthesizer,
                    selection.primary_zone(),
                    &ui_cfg,
                );
            }
        }
        Commands::Zombies => {
            let report = engine()?
                .report(&selection)
                .map_err(crate::exit::fetch_failed)?;
            if cli.json {
                let rows: Vec<ZombieRow<'_>> = report
                    .zombie_resources
                    .iter()
                    .map(|zombie| ZombieRow {
                        zombie,
                        console_url: crate::console::zombie_console_url(
                            zombie,
                            &selection.project_id,
                            selection.primary_zone(),
                        ),
                        remediation: synthesizer.zombie_command(zombie, selection.primary_zone()),
                    })
                    .collect();
                write_json(&rows)?;
            } else {
                crate::ui::print_zombies(&report, &synthesizer, &selection, &ui_cfg);
            }
        }
        Commands::Inventory(args) => {
            let items = engine()?
                .resources(&selection)
                .map_err(crate::exit::fetch_failed)?;
            let mut view = InventoryView::new(items);
            view.set_query(args.query.clone());
            if cli.json {
                write_json(&InventoryJson {
                    query: view.query(),
                    total: view.total(),
                    matched: view.len(),
                    items: view.visible().collect(),
                })?;
            } else {
                crate::ui::print_inventory(&view, &ui_cfg);
            }
        }
        Commands::Projects => {
            let projects: Vec<Project> =
                engine()?.projects().map_err(crate::exit::fetch_failed)?;
            if cli.json {
                write_json(&projects)?;
            } else {
                crate::ui::print_projects(&projects, &selection.project_id, &ui_cfg);
            }
        }
        Commands::Command(args) => {
            let fallback_zone = args
                .zone
                .as_deref()
                .map(str::trim)
                .filter(|z| !z.is_empty())
                .unwrap_or(selection.primary_zone());

            let result = if let Some(description) = &args.description {
                let rec = Recommendation::from_description("cli", description.as_str());
                synthesizer.synthesize(&rec, fallback_zone)
            } else {
                let report = engine()?
                    .report(&selection)
                    .map_err(crate::exit::fetch_failed)?;
                if let Some(id) = &args.id {
                    let rec = report.recommendation(id).ok_or_else(|| {
                        crate::exit::invalid_args(format!("推奨が見つかりません: {id}"))
                    })?;
                    synthesizer.synthesize(rec, fallback_zone)
                } else if let Some(resource_id) = &args.zombie {
                    let zombie = report.zombie(resource_id).ok_or_else(|| {
                        crate::exit::invalid_args(format!(
                            "ゾンビリソースが見つかりません: {resource_id}"
                        ))
                    })?;
                    synthesizer.zombie_command(zombie, fallback_zone)
                } else {
                    return Err(crate::exit::invalid_args(
                        "--id / --description / --zombie のいずれかを指定してください",
                    ));
                }
            };

            if cli.json {
                write_json(&result)?;
            } else {
                crate::ui::print_command_result(&result, &ui_cfg);
            }

            if !result.is_actionable() {
                let reason = result
                    .issue
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "実行可能なコマンドを生成できませんでした".to_string());
                return Err(crate::exit::command_unavailable(reason));
            }

            if args.copy {
                match crate::platform::copy_to_clipboard(&result.command) {
                    Ok(()) if !ui_cfg.quiet => eprintln!("クリップボードにコピーしました"),
                    Ok(()) => {}
                    Err(err) => tracing::warn!("clipboard copy failed: {err:#}"),
                }
            }
        }
        Commands::Link(args) => {
            let resource_type = args.resource_type;
            if !selection.has_project() {
                return Err(crate::exit::invalid_args(
                    "project_id が未設定です（--project で指定してください）",
                ));
            }
            let url = crate::console::console_url(
                resource_type,
                &selection.project_id,
                args.zone.as_deref().or(Some(selection.primary_zone())),
                args.name.as_deref(),
            );
            if cli.json {
                write_json(&LinkJson {
                    resource_type,
                    project_id: &selection.project_id,
                    url,
                })?;
            } else {
                println!("{url}");
            }
        }
        Commands::Ui(_args) => {
            if cli.json {
                return Err(crate::exit::invalid_args("ui は --json と併用できません"));
            }
            if !(ui_cfg.stdin_is_tty && ui_cfg.stdout_is_tty) {
                return Err(crate::exit::invalid_args(
                    "ui は TTY が必要です（stdin + stdout）",
                ));
            }
            crate::tui::run(
                engine()?,
                crate::tui::TuiOptions {
                    color: ui_cfg.color,
                    selection: selection.clone(),
                    selection_path: crate::config::selection_path(&home_dir),
                    synthesizer: synthesizer.clone(),
                    fetch_timeout: Duration::from_secs(cfg.backend.timeout_secs),
                },
            )?;
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "clouddiet", &mut out);
        }
        Commands::Config(args) => {
            if args.set_project.is_some() || args.set_zones.is_some() {
                let mut draft = SelectionDraft::from_selection(&selection);
                if let Some(project) = &args.set_project {
                    draft.project_id = project.clone();
                }
                if let Some(zones) = &args.set_zones {
                    draft.zones = zones.clone();
                }
                let path = crate::config::selection_path(&home_dir);
                let committed = crate::config::commit(&draft, &path)
                    .map_err(crate::exit::invalid_args_err)?;
                if cli.json {
                    write_json(&committed)?;
                } else if !ui_cfg.quiet {
                    println!(
                        "選択を保存しました: {}（ゾーン: {}）",
                        committed.project_id,
                        committed.zones.join(", ")
                    );
                }
            } else if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!(
                    "config: `clouddiet config --show` または `--set-project` / `--set-zones` を使用してください"
                );
            }
        }
    }

    Ok(())
}

fn apply_cli_overrides(cfg: &mut EffectiveConfig, cli: &Cli) -> Result<()> {
    if let Some(timeout) = cli.timeout {
        if timeout == 0 {
            return Err(crate::exit::invalid_args(
                "--timeout は 1 以上を指定してください",
            ));
        }
        cfg.backend.timeout_secs = timeout;
    }
    if let Some(api_url) = &cli.api_url {
        let api_url = api_url.trim();
        if api_url.is_empty() {
            return Err(crate::exit::invalid_args("--api-url が空です"));
        }
        cfg.backend.api_url = api_url.to_string();
    }
    if let Some(project) = &cli.project {
        cfg.selection.project_id = project.trim().to_string();
    }
    if let Some(zones) = &cli.zones {
        let zones = crate::config::parse_zones(zones);
        if zones.is_empty() {
            return Err(crate::exit::invalid_args(
                "--zones にゾーンを1つ以上指定してください",
            ));
        }
        cfg.selection.zones = zones;
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish を指定してください）"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("clouddiet").chain(args.iter().copied()))
            .expect("parse")
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn command_requires_exactly_one_target() {
        assert!(Cli::try_parse_from(["clouddiet", "command"]).is_err());
        assert!(
            Cli::try_parse_from(["clouddiet", "command", "--id", "a", "--zombie", "b"]).is_err()
        );
        let cli = parse(&["command", "--description", "vm Delete", "--zone", "us-east1-b"]);
        match cli.command {
            Commands::Command(args) => {
                assert_eq!(args.description.as_deref(), Some("vm Delete"));
                assert_eq!(args.zone.as_deref(), Some("us-east1-b"));
                assert!(!args.copy);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn link_type_is_parsed_by_clap() {
        let cli = parse(&["link", "--type", "instance", "--name", "vm-1"]);
        match cli.command {
            Commands::Link(args) => assert_eq!(args.resource_type, ResourceType::GceInstance),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["clouddiet", "link", "--type", "bucket"]).is_err());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = parse(&["overview", "--json", "--project", "demo", "--zones", "a-1-b"]);
        assert!(cli.json);
        assert_eq!(cli.project.as_deref(), Some("demo"));
    }

    #[test]
    fn cli_overrides_win_over_loaded_config() {
        let mut cfg = EffectiveConfig::default();
        let cli = parse(&[
            "--timeout",
            "5",
            "--api-url",
            "http://backend:9000",
            "--project",
            " demo ",
            "--zones",
            "europe-west1-b, europe-west1-c",
            "overview",
        ]);
        apply_cli_overrides(&mut cfg, &cli).expect("apply");
        assert_eq!(cfg.backend.timeout_secs, 5);
        assert_eq!(cfg.backend.api_url, "http://backend:9000");
        assert_eq!(cfg.selection.project_id, "demo");
        assert_eq!(cfg.selection.zones, vec!["europe-west1-b", "europe-west1-c"]);
    }

    #[test]
    fn invalid_overrides_are_invalid_args() {
        let mut cfg = EffectiveConfig::default();
        let cli = parse(&["--zones", " , ", "overview"]);
        let err = apply_cli_overrides(&mut cfg, &cli).expect_err("should fail");
        assert_eq!(crate::exit::exit_code(&err), 2);

        let cli = parse(&["--timeout", "0", "overview"]);
        let err = apply_cli_overrides(&mut cfg, &cli).expect_err("should fail");
        assert_eq!(crate::exit::exit_code(&err), 2);
    }

    #[test]
    fn parse_shell_rejects_unknown() {
        assert!(matches!(parse_shell(" Zsh "), Ok(clap_complete::Shell::Zsh)));
        let err = parse_shell("powershell").expect_err("unsupported");
        assert_eq!(crate::exit::exit_code(&err), 2);
    }
}
