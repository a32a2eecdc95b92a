use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::config::Selection;
use crate::console;
use crate::core::{Project, Report};
use crate::insights::{self, InventoryView};
use crate::remediation::{CommandResult, Intent, Synthesizer};

const BAR_WIDTH: usize = 24;

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdin_is_tty: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - バックエンドに届かない場合は `--api-url` か `--from-dir` を確認してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `clouddiet --help` を参照してください"
    );
}

pub fn print_overview(report: &Report, selection: &Selection, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    write_overview(&mut io::stdout().lock(), report, selection, cfg);
}

pub fn write_overview(out: &mut dyn Write, report: &Report, selection: &Selection, cfg: &UiConfig) {
    let summary = &report.summary;
    let currency = summary.currency.as_str();

    let project = report
        .project_id
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(&selection.project_id);
    let _ = writeln!(
        out,
        "プロジェクト: {project}（ゾーン: {}）",
        selection.zones.join(", ")
    );
    let _ = writeln!(
        out,
        "概要: 月間削減見込み={}  ゾンビ={}件  推奨={}件",
        format_money(summary.total_potential_savings, currency),
        summary.zombie_resource_count,
        report.recommendation_count()
    );

    let breakdown =
        insights::aggregate_savings(&report.recommendations, &report.zombie_resources);
    let _ = writeln!(out);
    let _ = writeln!(out, "削減内訳:");
    let categories = breakdown.categories();
    let max = categories.iter().map(|p| p.value).fold(0.0, f64::max);
    write_bar_rows(
        out,
        categories.iter().map(|p| (p.name.as_str(), p.value)),
        max,
        currency,
        cfg.color,
    );

    let series = insights::to_chart_series(&summary.cost_by_zone);
    let _ = writeln!(out);
    if series.is_empty() {
        let _ = writeln!(out, "ゾーン別コスト: （データなし）");
        return;
    }
    let _ = writeln!(out, "ゾーン別コスト:");
    let max = series.iter().map(|p| p.value).fold(0.0, f64::max);
    write_bar_rows(
        out,
        series.iter().map(|p| (p.name.as_str(), p.value)),
        max,
        currency,
        cfg.color,
    );
}

fn write_bar_rows<'a>(
    out: &mut dyn Write,
    rows: impl Iterator<Item = (&'a str, f64)> + Clone,
    max: f64,
    currency: &str,
    color: bool,
) {
    let name_w = rows
        .clone()
        .map(|(name, _)| visible_width_ansi(name))
        .max()
        .unwrap_or(0);
    let money_w = rows
        .clone()
        .map(|(_, v)| visible_width_ansi(&format_money(v, currency)))
        .max()
        .unwrap_or(0);
    for (name, value) in rows {
        let bar = bar(value, max, BAR_WIDTH);
        let bar = if color && !bar.is_empty() {
            format!("\x1b[36m{bar}\x1b[0m")
        } else {
            bar
        };
        let _ = writeln!(
            out,
            "  {}  {}  {bar}",
            pad_end_display(name, name_w),
            pad_start_display(&format_money(value, currency), money_w)
        );
    }
}

pub fn print_recommendations(
    report: &Report,
    synthesizer: &Synthesizer,
    fallback_zone: &str,
    cfg: &UiConfig,
) {
    if cfg.quiet {
        return;
    }
    write_recommendations(
        &mut io::stdout().lock(),
        report,
        synthesizer,
        fallback_zone,
        cfg,
    );
}

pub fn write_recommendations(
    out: &mut dyn Write,
    report: &Report,
    synthesizer: &Synthesizer,
    fallback_zone: &str,
    cfg: &UiConfig,
) {
    let total = report.recommendations.len();
    if total == 0 {
        let _ = writeln!(out, "推奨はありません。");
        return;
    }
    let rows = cfg.max_table_rows.max(1).min(total);
    if total > rows {
        let _ = writeln!(out, "推奨（{rows}件表示 / 全{total}件）:");
    } else {
        let _ = writeln!(out, "推奨（{rows}件）:");
    }

    for rec in report.recommendations.iter().take(rows) {
        let result = synthesizer.synthesize(rec, fallback_zone);
        let currency = rec
            .cost_savings
            .as_ref()
            .map(|c| c.currency.as_str())
            .unwrap_or(report.summary.currency.as_str());
        let mut head = format!(
            "- [{}] {}/月",
            format_intent(result.intent, cfg.color),
            format_money(rec.monthly_savings(), currency)
        );
        if let Some(priority) = rec.priority.as_deref().filter(|p| !p.is_empty()) {
            head.push_str(&format!("  {priority}"));
        }
        head.push_str(&format!("  id={}", rec.recommendation_id));
        let _ = writeln!(out, "{head}");
        let _ = writeln!(out, "  説明: {}", truncate_middle(&rec.description, 120));
        write_command_lines(out, &result);
    }
    if total > rows {
        let _ = writeln!(out, "- ...（残り{}件）", total - rows);
    }
}

pub fn print_zombies(
    report: &Report,
    synthesizer: &Synthesizer,
    selection: &Selection,
    cfg: &UiConfig,
) {
    if cfg.quiet {
        return;
    }
    write_zombies(&mut io::stdout().lock(), report, synthesizer, selection, cfg);
}

pub fn write_zombies(
    out: &mut dyn Write,
    report: &Report,
    synthesizer: &Synthesizer,
    selection: &Selection,
    cfg: &UiConfig,
) {
    let total = report.zombie_resources.len();
    if total == 0 {
        let _ = writeln!(out, "ゾンビリソースは見つかりませんでした。");
        return;
    }
    let rows = cfg.max_table_rows.max(1).min(total);
    if total > rows {
        let _ = writeln!(out, "ゾンビリソース（{rows}件表示 / 全{total}件）:");
    } else {
        let _ = writeln!(out, "ゾンビリソース（{rows}件）:");
    }

    let fallback_zone = selection.primary_zone();
    for zombie in report.zombie_resources.iter().take(rows) {
        let zone = zombie.zone_or(fallback_zone);
        let _ = writeln!(
            out,
            "- {} [{}] {}  {}/月",
            zombie.name,
            zombie.resource_type,
            if zone.is_empty() { "-" } else { zone },
            format_money(zombie.monthly_waste(), &report.summary.currency)
        );
        if !zombie.waste_reason.is_empty() {
            let _ = writeln!(out, "  理由: {}", zombie.waste_reason);
        }
        let _ = writeln!(
            out,
            "  コンソール: {}",
            console::zombie_console_url(zombie, &selection.project_id, fallback_zone)
        );
        let result = synthesizer.zombie_command(zombie, fallback_zone);
        write_command_lines(out, &result);
    }
    if total > rows {
        let _ = writeln!(out, "- ...（残り{}件）", total - rows);
    }
}

fn write_command_lines(out: &mut dyn Write, result: &CommandResult) {
    let _ = writeln!(out, "  コマンド: {}", result.command);
    if let Some(issue) = &result.issue {
        let _ = writeln!(out, "  注意: {issue}");
    }
}

pub fn print_inventory(view: &InventoryView, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    write_inventory(&mut io::stdout().lock(), view, cfg);
}

pub fn write_inventory(out: &mut dyn Write, view: &InventoryView, cfg: &UiConfig) {
    let matched = view.len();
    let rows = cfg.max_table_rows.max(1).min(matched);
    if !view.query().trim().is_empty() {
        let _ = writeln!(out, "フィルタ: {}", view.query().trim());
    }
    let _ = writeln!(
        out,
        "リソース（{rows}件表示 / 該当{matched}件 / 全{}件）:",
        view.total()
    );
    if rows == 0 {
        return;
    }

    let label_name = "名前";
    let label_type = "種別";
    let label_loc = "場所";
    let label_state = "状態";
    let label_created = "作成日時";

    let shown: Vec<_> = view.visible().take(rows).collect();
    let name_w = column_width(label_name, &shown, |i| truncate_middle(&i.name, 40));
    let type_w = column_width(label_type, &shown, |i| short_asset_type(&i.asset_type));
    let loc_w = column_width(label_loc, &shown, |i| i.location.clone());
    let state_w = column_width(label_state, &shown, |i| i.state.clone());

    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        pad_end_display(label_name, name_w),
        pad_end_display(label_type, type_w),
        pad_end_display(label_loc, loc_w),
        pad_end_display(label_state, state_w),
        label_created
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        "-".repeat(name_w),
        "-".repeat(type_w),
        "-".repeat(loc_w),
        "-".repeat(state_w),
        "-".repeat(visible_width_ansi(label_created))
    );
    for item in shown {
        let state = if cfg.color && item.is_active() {
            format!("\x1b[32m{}\x1b[0m", item.state)
        } else {
            item.state.clone()
        };
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            pad_end_display(&truncate_middle(&item.name, 40), name_w),
            pad_end_display(&short_asset_type(&item.asset_type), type_w),
            pad_end_display(&item.location, loc_w),
            pad_end_ansi(&state, state_w),
            item.create_time
        );
    }
    if matched > rows {
        let _ = writeln!(out, "...（残り{}件）", matched - rows);
    }
}

pub fn print_projects(projects: &[Project], current: &str, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    if projects.is_empty() {
        let _ = writeln!(out, "アクセス可能なプロジェクトはありません。");
        return;
    }
    let _ = writeln!(out, "プロジェクト（{}件）:", projects.len());
    for project in projects {
        let marker = if project.project_id == current { "*" } else { " " };
        let _ = writeln!(out, "{marker} {}", project.label());
    }
}

pub fn print_command_result(result: &CommandResult, cfg: &UiConfig) {
    let _ = writeln!(io::stdout().lock(), "{}", result.command);
    if cfg.quiet {
        return;
    }
    let mut err = io::stderr().lock();
    if let Some(issue) = &result.issue {
        let _ = writeln!(err, "注意: {issue}");
    }
    if cfg.verbose {
        let _ = writeln!(
            err,
            "intent={} confidence={:?} resource_id={} zone={}",
            result.intent, result.confidence, result.resource_id, result.zone
        );
    }
}

pub fn short_asset_type(asset_type: &str) -> String {
    match asset_type.split_once(".googleapis.com/") {
        Some((service, kind)) if !service.is_empty() => format!("{service}/{kind}"),
        _ => asset_type.to_string(),
    }
}

fn column_width(
    label: &str,
    items: &[&crate::core::InventoryItem],
    cell: impl Fn(&crate::core::InventoryItem) -> String,
) -> usize {
    items
        .iter()
        .map(|i| visible_width_ansi(&cell(i)))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label))
}

pub fn format_intent(intent: Intent, color: bool) -> String {
    let s = intent.as_str();
    if !color {
        return s.to_string();
    }
    let code = match intent {
        Intent::Resize => "33",
        Intent::Delete => "31",
        Intent::Unknown => "90",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

pub fn format_money(amount: f64, currency: &str) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    let frac = cents % 100;
    match currency {
        "" | "USD" => format!("{sign}$ {whole}.{frac:02}"),
        other => format!("{sign}{whole}.{frac:02} {other}"),
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn bar(value: f64, max: f64, width: usize) -> String {
    if value <= 0.0 || max <= 0.0 {
        return String::new();
    }
    let cells = ((value / max) * width as f64).round() as usize;
    "█".repeat(cells.clamp(1, width))
}

pub fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s
        .chars()
        .rev()
        .take(right)
        .collect::<String>()
        .chars()
        .rev()
        .collect();

    format!("{prefix}...{suffix}")
}

fn pad_end_ansi(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

pub fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_start_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat(width - w), s)
}

pub fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
