use std::io;
use std::panic;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap,
};

use crate::backend::DatasetKind;
use crate::config::{Selection, SelectionDraft};
use crate::core::{InventoryItem, Project, Report};
use crate::engine::Engine;
use crate::fetch::{FetchKey, FetchOutcome, FetchSlot};
use crate::insights::{self, ChartPoint, InventoryView};
use crate::remediation::{CommandResult, Intent, Synthesizer};
use crate::ui::{bar, format_money, pad_end_display, short_asset_type, truncate_middle};

const COPY_ACK: Duration = Duration::from_secs(2);
const FETCH_GRACE: Duration = Duration::from_secs(5);
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];
const SETTINGS_FIELDS: usize = 2;

pub struct TuiOptions {
    pub color: bool,
    pub selection: Selection,
    pub selection_path: PathBuf,
    pub synthesizer: Synthesizer,
    pub fetch_timeout: Duration,
}

pub fn run(engine: Engine, opts: TuiOptions) -> Result<()> {
    enable_raw_mode().context("raw mode の有効化")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("代替画面への切り替え")?;

    let mut terminal =
        Terminal::new(CrosstermBackend::new(stdout)).context("ターミナルの初期化")?;
    terminal.clear().ok();

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        run_app(&mut terminal, engine, opts)
    }));

    let _ = terminal.show_cursor();
    let _ = disable_raw_mode();
    let mut stdout = io::stdout();
    let _ = execute!(stdout, LeaveAlternateScreen);

    match res {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!(
            "TUI 内部で panic が発生しました（端末状態は復旧済みのはずです）"
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Main,
    ActionDialog,
    Error,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Overview = 0,
    Inventory = 1,
    Rightsizing = 2,
    Zombies = 3,
    Settings = 4,
}

impl View {
    const ALL: [View; 5] = [
        View::Overview,
        View::Inventory,
        View::Rightsizing,
        View::Zombies,
        View::Settings,
    ];

    fn title(self) -> &'static str {
        match self {
            View::Overview => "概要",
            View::Inventory => "インベントリ",
            View::Rightsizing => "ライトサイジング",
            View::Zombies => "ゾンビ",
            View::Settings => "設定",
        }
    }

    fn next(self) -> Self {
        Self::ALL[(self as usize + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        Self::ALL[(self as usize + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsField {
    Project,
    Zones,
}

struct ActionDialog {
    title: String,
    result: CommandResult,
    console_url: Option<String>,
    copied_at: Option<Instant>,
}

struct StatusLine {
    text: String,
    is_error: bool,
}

impl StatusLine {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

struct App {
    color: bool,
    source_label: String,
    synthesizer: Synthesizer,
    fetch_timeout: Duration,
    selection_path: PathBuf,

    selection: Selection,
    draft: SelectionDraft,
    settings_state: ListState,
    settings_edit: Option<SettingsField>,

    screen: Screen,
    help_return_to: Screen,
    error_return_to: Screen,
    view: View,

    report: Option<Report>,
    report_selection: Selection,
    projects: Vec<Project>,
    inventory: InventoryView,

    report_slot: FetchSlot<Report>,
    projects_slot: FetchSlot<Vec<Project>>,
    resources_slot: FetchSlot<Vec<InventoryItem>>,

    filter_mode: bool,
    inventory_state: ListState,
    rightsizing_state: ListState,
    zombies_state: ListState,

    dialog: Option<ActionDialog>,
    error: Option<String>,
    status: Option<StatusLine>,

    tick: u64,
}

impl App {
    fn new(opts: TuiOptions, source_label: String) -> Self {
        let draft = SelectionDraft::from_selection(&opts.selection);
        let report_selection = opts.selection.clone();
        let mut settings_state = ListState::default();
        settings_state.select(Some(0));
        Self {
            color: opts.color,
            source_label,
            synthesizer: opts.synthesizer,
            fetch_timeout: opts.fetch_timeout,
            selection_path: opts.selection_path,
            selection: opts.selection,
            draft,
            settings_state,
            settings_edit: None,
            screen: Screen::Main,
            help_return_to: Screen::Main,
            error_return_to: Screen::Main,
            view: View::Overview,
            report: None,
            report_selection,
            projects: Vec::new(),
            inventory: InventoryView::default(),
            report_slot: FetchSlot::new(),
            projects_slot: FetchSlot::new(),
            resources_slot: FetchSlot::new(),
            filter_mode: false,
            inventory_state: ListState::default(),
            rightsizing_state: ListState::default(),
            zombies_state: ListState::default(),
            dialog: None,
            error: None,
            status: None,
            tick: 0,
        }
    }

    fn in_flight(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.report_slot.is_in_flight() {
            out.push(DatasetKind::Report.as_str());
        }
        if self.projects_slot.is_in_flight() {
            out.push(DatasetKind::Projects.as_str());
        }
        if self.resources_slot.is_in_flight() {
            out.push(DatasetKind::Resources.as_str());
        }
        out
    }

    fn settings_len(&self) -> usize {
        SETTINGS_FIELDS + self.projects.len()
    }

    fn recommendation_count(&self) -> usize {
        self.report
            .as_ref()
            .map(|r| r.recommendations.len())
            .unwrap_or(0)
    }

    fn zombie_count(&self) -> usize {
        self.report
            .as_ref()
            .map(|r| r.zombie_resources.len())
            .unwrap_or(0)
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    engine: Engine,
    opts: TuiOptions,
) -> Result<()> {
    let mut app = App::new(opts, engine.source().describe());
    request_all(&mut app, &engine);

    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        poll_fetches(&mut app);

        terminal.draw(|f| draw(f, &mut app)).context("画面描画")?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("イベント待ち")? {
            match event::read().context("イベント読み取り")? {
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Press && handle_key(&mut app, &engine, key)? {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick = app.tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    }

    Ok(())
}

fn request_all(app: &mut App, engine: &Engine) {
    let selection = app.selection.clone();

    let projects_engine = engine.clone();
    app.projects_slot.request(
        FetchKey::new(DatasetKind::Projects, &selection),
        move || projects_engine.projects(),
    );

    if !selection.has_project() {
        app.status = Some(StatusLine::error(
            "project_id が未設定です。設定タブ（5）でプロジェクトを選んでください。",
        ));
        return;
    }

    let report_engine = engine.clone();
    let scoped = selection.clone();
    app.report_slot.request(
        FetchKey::new(DatasetKind::Report, &selection),
        move || report_engine.report(&scoped),
    );

    let resources_engine = engine.clone();
    let resources_selection = selection.clone();
    app.resources_slot.request(
        FetchKey::new(DatasetKind::Resources, &selection),
        move || resources_engine.resources(&resources_selection),
    );
}

fn poll_fetches(app: &mut App) {
    let timeout = app.fetch_timeout + FETCH_GRACE;

    if let Some(outcome) = app.report_slot.poll(timeout) {
        if let Some((key, report)) = settle(app, outcome) {
            clamp_selection(&mut app.rightsizing_state, report.recommendations.len());
            clamp_selection(&mut app.zombies_state, report.zombie_resources.len());
            app.report = Some(report);
            if let Some(selection) = key.selection {
                app.report_selection = selection;
            }
        }
    }
    if let Some(outcome) = app.projects_slot.poll(timeout) {
        if let Some((_, projects)) = settle(app, outcome) {
            app.projects = projects;
            let len = app.settings_len();
            clamp_selection(&mut app.settings_state, len);
        }
    }
    if let Some(outcome) = app.resources_slot.poll(timeout) {
        if let Some((_, items)) = settle(app, outcome) {
            app.inventory.replace_items(items);
            clamp_selection(&mut app.inventory_state, app.inventory.len());
        }
    }
}

// Failures leave the previous dataset in place and only update the status line.
fn settle<T>(app: &mut App, outcome: FetchOutcome<T>) -> Option<(FetchKey, T)> {
    match outcome {
        FetchOutcome::Ready { key, value, .. } => {
            if app.status.as_ref().is_some_and(|s| s.is_error) {
                app.status = Some(StatusLine::info(format!(
                    "{} を取得しました",
                    key.kind.as_str()
                )));
            }
            Some((key, value))
        }
        FetchOutcome::Failed { key, error, .. } => {
            app.status = Some(StatusLine::error(format!(
                "{} の取得に失敗しました（前回のデータを表示しています）: {error}",
                key.kind.as_str()
            )));
            None
        }
        FetchOutcome::TimedOut { key, elapsed } => {
            tracing::warn!(
                dataset = key.kind.as_str(),
                elapsed_ms = elapsed.as_millis() as u64,
                "fetch timed out"
            );
            app.status = Some(StatusLine::error(format!(
                "{} の取得がタイムアウトしました（{}秒）。`r` で再取得できます。",
                key.kind.as_str(),
                elapsed.as_secs()
            )));
            None
        }
    }
}

fn clamp_selection(state: &mut ListState, len: usize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let idx = state.selected().unwrap_or(0).min(len - 1);
    state.select(Some(idx));
}

fn move_selection(state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let cur = state.selected().unwrap_or(0) as isize;
    let next = (cur + delta).clamp(0, len as isize - 1);
    state.select(Some(next as usize));
}

fn open_help(app: &mut App) {
    app.help_return_to = app.screen;
    app.screen = Screen::Help;
}

fn open_error(app: &mut App, msg: impl Into<String>) {
    app.error = Some(msg.into());
    app.error_return_to = match app.screen {
        Screen::Error | Screen::Help => Screen::Main,
        other => other,
    };
    app.screen = Screen::Error;
}

fn open_recommendation_dialog(app: &mut App) {
    let Some(report) = &app.report else {
        return;
    };
    let Some(rec) = app
        .rightsizing_state
        .selected()
        .and_then(|i| report.recommendations.get(i))
    else {
        return;
    };
    let result = app
        .synthesizer
        .synthesize(rec, app.report_selection.primary_zone());
    app.dialog = Some(ActionDialog {
        title: truncate_middle(&rec.description, 80),
        result,
        console_url: None,
        copied_at: None,
    });
    app.screen = Screen::ActionDialog;
}

fn open_zombie_dialog(app: &mut App) {
    let Some(report) = &app.report else {
        return;
    };
    let Some(zombie) = app
        .zombies_state
        .selected()
        .and_then(|i| report.zombie_resources.get(i))
    else {
        return;
    };
    let fallback_zone = app.report_selection.primary_zone();
    let result = app.synthesizer.zombie_command(zombie, fallback_zone);
    let console_url = crate::console::zombie_console_url(
        zombie,
        &app.report_selection.project_id,
        fallback_zone,
    );
    app.dialog = Some(ActionDialog {
        title: format!("{} を削除", zombie.name),
        result,
        console_url: Some(console_url),
        copied_at: None,
    });
    app.screen = Screen::ActionDialog;
}

fn copy_dialog_command(app: &mut App) {
    let Some(dialog) = app.dialog.as_mut() else {
        return;
    };
    if !dialog.result.is_actionable() {
        app.status = Some(StatusLine::error(
            "実行可能なコマンドがないためコピーできません",
        ));
        return;
    }
    match crate::platform::copy_to_clipboard(&dialog.result.command) {
        Ok(()) => dialog.copied_at = Some(Instant::now()),
        Err(err) => open_error(app, format!("クリップボードにコピーできませんでした: {err:#}")),
    }
}

fn copy_ack_visible(copied_at: Option<Instant>, now: Instant) -> bool {
    copied_at.is_some_and(|at| now.saturating_duration_since(at) < COPY_ACK)
}

fn commit_draft(app: &mut App, engine: &Engine) {
    match crate::config::commit(&app.draft, &app.selection_path) {
        Ok(selection) => {
            app.selection = selection;
            app.draft = SelectionDraft::from_selection(&app.selection);
            app.status = Some(StatusLine::info(format!(
                "保存しました: {}（{}）",
                app.selection.project_id,
                app.selection.zones.join(", ")
            )));
            request_all(app, engine);
        }
        Err(err) => {
            app.status = Some(StatusLine::error(format!("保存できませんでした: {err:#}")));
        }
    }
}

fn handle_key(app: &mut App, engine: &Engine, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(true);
    }

    match app.screen {
        Screen::Help => {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') | KeyCode::Char('b')
            ) {
                app.screen = app.help_return_to;
            }
            return Ok(false);
        }
        Screen::Error => {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') | KeyCode::Char('b')
            ) {
                app.error = None;
                app.screen = app.error_return_to;
            }
            return Ok(false);
        }
        Screen::ActionDialog => {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('y') | KeyCode::Enter => {
                    copy_dialog_command(app)
                }
                KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('b') => {
                    app.dialog = None;
                    app.screen = Screen::Main;
                }
                KeyCode::Char('?') => open_help(app),
                _ => {}
            }
            return Ok(false);
        }
        Screen::Main => {}
    }

    if app.filter_mode {
        let mut query = app.inventory.query().to_string();
        match key.code {
            KeyCode::Enter | KeyCode::Esc => {
                app.filter_mode = false;
                query = query.trim().to_string();
            }
            KeyCode::Backspace => {
                query.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                query.clear();
            }
            KeyCode::Char(c) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT)
                {
                    query.push(c);
                }
            }
            _ => {}
        }
        app.inventory.set_query(query);
        clamp_selection(&mut app.inventory_state, app.inventory.len());
        return Ok(false);
    }

    if let Some(field) = app.settings_edit {
        let target = match field {
            SettingsField::Project => &mut app.draft.project_id,
            SettingsField::Zones => &mut app.draft.zones,
        };
        match key.code {
            KeyCode::Enter | KeyCode::Esc => app.settings_edit = None,
            KeyCode::Backspace => {
                target.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => target.clear(),
            KeyCode::Char(c) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL)
                    && !key.modifiers.contains(KeyModifiers::ALT)
                {
                    target.push(c);
                }
            }
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('q') => return Ok(true),
        KeyCode::Char('?') => {
            open_help(app);
            return Ok(false);
        }
        KeyCode::Tab => {
            app.view = app.view.next();
            return Ok(false);
        }
        KeyCode::BackTab => {
            app.view = app.view.prev();
            return Ok(false);
        }
        KeyCode::Char(c @ '1'..='5') => {
            let idx = c as usize - '1' as usize;
            app.view = View::ALL[idx];
            return Ok(false);
        }
        KeyCode::Char('r') => {
            request_all(app, engine);
            return Ok(false);
        }
        _ => {}
    }

    let delta = match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(-1),
        KeyCode::Down | KeyCode::Char('j') => Some(1),
        KeyCode::PageUp => Some(-10),
        KeyCode::PageDown => Some(10),
        _ => None,
    };

    match app.view {
        View::Overview => {}
        View::Inventory => {
            if let Some(delta) = delta {
                move_selection(&mut app.inventory_state, app.inventory.len(), delta);
            } else if key.code == KeyCode::Char('/') {
                app.filter_mode = true;
            }
        }
        View::Rightsizing => {
            if let Some(delta) = delta {
                let len = app.recommendation_count();
                move_selection(&mut app.rightsizing_state, len, delta);
            } else if key.code == KeyCode::Enter {
                open_recommendation_dialog(app);
            }
        }
        View::Zombies => {
            if let Some(delta) = delta {
                let len = app.zombie_count();
                move_selection(&mut app.zombies_state, len, delta);
            } else if key.code == KeyCode::Enter {
                open_zombie_dialog(app);
            }
        }
        View::Settings => {
            if let Some(delta) = delta {
                let len = app.settings_len();
                move_selection(&mut app.settings_state, len, delta);
                return Ok(false);
            }
            match key.code {
                KeyCode::Enter => match app.settings_state.selected() {
                    Some(0) => app.settings_edit = Some(SettingsField::Project),
                    Some(1) => app.settings_edit = Some(SettingsField::Zones),
                    Some(i) => {
                        if let Some(project) = app.projects.get(i - SETTINGS_FIELDS) {
                            app.draft.project_id = project.project_id.clone();
                            commit_draft(app, engine);
                        }
                    }
                    None => {}
                },
                KeyCode::Char('s') => commit_draft(app, engine),
                KeyCode::Char('u') => {
                    app.draft = SelectionDraft::from_selection(&app.selection);
                    app.status = Some(StatusLine::info("編集内容を破棄しました"));
                }
                _ => {}
            }
        }
    }

    Ok(false)
}

fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(size);

    draw_header(f, chunks[0], app);
    draw_footer(f, chunks[2], app);

    match app.view {
        View::Overview => draw_overview(f, chunks[1], app),
        View::Inventory => draw_inventory(f, chunks[1], app),
        View::Rightsizing => draw_rightsizing(f, chunks[1], app),
        View::Zombies => draw_zombies(f, chunks[1], app),
        View::Settings => draw_settings(f, chunks[1], app),
    }

    match app.screen {
        Screen::Main => {}
        Screen::ActionDialog => draw_action_dialog(f, chunks[1], app),
        Screen::Error => draw_error(f, chunks[1], app),
        Screen::Help => draw_help(f, chunks[1], app),
    }
}

fn draw_header(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let titles: Vec<Line> = View::ALL
        .iter()
        .enumerate()
        .map(|(i, v)| Line::from(format!("{} {}", i + 1, v.title())))
        .collect();

    let project = if app.selection.has_project() {
        app.selection.project_id.as_str()
    } else {
        "（未設定）"
    };
    let block_title = format!(
        " clouddiet v{} | {project} / {} ",
        env!("CARGO_PKG_VERSION"),
        app.selection.zones.join(",")
    );

    let tabs = Tabs::new(titles)
        .select(app.view as usize)
        .block(Block::default().borders(Borders::ALL).title(block_title))
        .highlight_style(
            Style::default()
                .fg(if app.color { Color::Cyan } else { Color::Reset })
                .add_modifier(Modifier::BOLD | Modifier::REVERSED),
        );
    f.render_widget(tabs, area);
}

fn draw_footer(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let hints = if app.filter_mode {
        format!(
            "フィルタ: {}▏  Enter/Esc: 確定  Backspace: 削除  Ctrl-U: クリア",
            app.inventory.query()
        )
    } else if app.settings_edit.is_some() {
        "入力中  Enter/Esc: 確定  Backspace: 削除  Ctrl-U: クリア".to_string()
    } else {
        match (app.screen, app.view) {
            (Screen::ActionDialog, _) => "c/Enter: コピー  Esc/b: 閉じる".to_string(),
            (Screen::Error, _) | (Screen::Help, _) => "Esc: 戻る".to_string(),
            (_, View::Inventory) => "/: フィルタ  ↑↓/j/k: 移動  Tab: 画面切替  r: 再取得  ?: ヘルプ  q: 終了".to_string(),
            (_, View::Rightsizing) | (_, View::Zombies) => {
                "Enter: アクション  ↑↓/j/k: 移動  Tab: 画面切替  r: 再取得  ?: ヘルプ  q: 終了".to_string()
            }
            (_, View::Settings) => {
                "Enter: 編集/選択  s: 保存  u: 破棄  ↑↓/j/k: 移動  Tab: 画面切替  q: 終了".to_string()
            }
            (_, View::Overview) => "Tab/1-5: 画面切替  r: 再取得  ?: ヘルプ  q: 終了".to_string(),
        }
    };

    let in_flight = app.in_flight();
    let status = if !in_flight.is_empty() {
        let spin = SPINNER[(app.tick as usize) % SPINNER.len()];
        Line::from(Span::styled(
            format!("{spin} 取得中: {}（{}）", in_flight.join(", "), app.source_label),
            Style::default().fg(Color::DarkGray),
        ))
    } else if let Some(status) = &app.status {
        let style = if status.is_error && app.color {
            Style::default().fg(Color::Red)
        } else if status.is_error {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Line::from(Span::styled(status.text.clone(), style))
    } else {
        Line::from(Span::styled(
            format!("データ元: {}", app.source_label),
            Style::default().fg(Color::DarkGray),
        ))
    };

    let text = Text::from(vec![
        Line::from(Span::styled(hints, Style::default().fg(Color::DarkGray))),
        status,
    ]);
    f.render_widget(Paragraph::new(text), area);
}

fn draw_placeholder(f: &mut ratatui::Frame, area: Rect, app: &App, title: &str) {
    let msg = if app.report_slot.is_in_flight() || app.resources_slot.is_in_flight() {
        "データを取得しています..."
    } else {
        "表示できるデータがありません。`r` で再取得するか、設定タブでプロジェクトを確認してください。"
    };
    let w = Paragraph::new(msg)
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .wrap(Wrap { trim: false });
    f.render_widget(w, area);
}

fn kpi(f: &mut ratatui::Frame, area: Rect, title: &str, value: String) {
    let w = Paragraph::new(Line::from(Span::styled(
        value,
        Style::default().add_modifier(Modifier::BOLD),
    )))
    .block(Block::default().borders(Borders::ALL).title(title.to_string()));
    f.render_widget(w, area);
}

fn bar_lines(points: &[ChartPoint], currency: &str, color: bool, width: usize) -> Vec<Line<'static>> {
    if points.is_empty() {
        return vec![Line::from("（データなし）")];
    }
    let max = points.iter().map(|p| p.value).fold(0.0, f64::max);
    let name_w = points
        .iter()
        .map(|p| crate::ui::visible_width_ansi(&p.name))
        .max()
        .unwrap_or(0);
    let bar_style = if color {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    points
        .iter()
        .map(|p| {
            Line::from(vec![
                Span::raw(pad_end_display(&p.name, name_w)),
                Span::raw("  "),
                Span::raw(format!("{:>14}", format_money(p.value, currency))),
                Span::raw("  "),
                Span::styled(bar(p.value, max, width), bar_style),
            ])
        })
        .collect()
}

fn draw_overview(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let Some(report) = &app.report else {
        draw_placeholder(f, area, app, "概要");
        return;
    };
    let summary = &report.summary;

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);
    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(rows[0]);
    kpi(
        f,
        cards[0],
        "月間削減見込み",
        format_money(summary.total_potential_savings, &summary.currency),
    );
    kpi(
        f,
        cards[1],
        "ゾンビリソース",
        format!("{}件", summary.zombie_resource_count),
    );
    kpi(
        f,
        cards[2],
        "推奨",
        format!("{}件", report.recommendation_count()),
    );

    let charts = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    let breakdown =
        insights::aggregate_savings(&report.recommendations, &report.zombie_resources);
    let bar_w = (charts[0].width as usize).saturating_sub(40).max(4);
    let w = Paragraph::new(Text::from(bar_lines(
        &breakdown.categories(),
        &summary.currency,
        app.color,
        bar_w,
    )))
    .block(Block::default().borders(Borders::ALL).title("削減内訳"));
    f.render_widget(w, charts[0]);

    let series = insights::to_chart_series(&summary.cost_by_zone);
    let bar_w = (charts[1].width as usize).saturating_sub(40).max(4);
    let w = Paragraph::new(Text::from(bar_lines(
        &series,
        &summary.currency,
        app.color,
        bar_w,
    )))
    .block(Block::default().borders(Borders::ALL).title("ゾーン別コスト"));
    f.render_widget(w, charts[1]);
}

fn draw_inventory(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let query = app.inventory.query().trim().to_string();
    let title = if app.filter_mode {
        format!(
            "リソース（該当{} / 全{}）フィルタ入力中: {}",
            app.inventory.len(),
            app.inventory.total(),
            app.inventory.query()
        )
    } else if query.is_empty() {
        format!("リソース（全{}）", app.inventory.total())
    } else {
        format!(
            "リソース（該当{} / 全{}）フィルタ: {query}",
            app.inventory.len(),
            app.inventory.total()
        )
    };

    let items: Vec<ListItem> = if app.inventory.is_empty() {
        let msg = if app.inventory.total() == 0 {
            "リソースがありません。"
        } else {
            "フィルタに一致するリソースがありません。"
        };
        vec![ListItem::new(Line::from(msg))]
    } else {
        let active = if app.color {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        app.inventory
            .visible()
            .map(|item| {
                let state_style = if item.is_active() {
                    active
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(
                        pad_end_display(&truncate_middle(&item.name, 32), 32),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::raw(pad_end_display(&short_asset_type(&item.asset_type), 28)),
                    Span::raw("  "),
                    Span::raw(pad_end_display(&item.location, 16)),
                    Span::raw("  "),
                    Span::styled(pad_end_display(&item.state, 10), state_style),
                    Span::raw("  "),
                    Span::styled(item.create_time.clone(), Style::default().fg(Color::DarkGray)),
                ]))
            })
            .collect()
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, area, &mut app.inventory_state);
}

fn intent_style(intent: Intent, enabled: bool) -> Style {
    if !enabled {
        return Style::default();
    }
    match intent {
        Intent::Resize => Style::default().fg(Color::Yellow),
        Intent::Delete => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Intent::Unknown => Style::default().fg(Color::DarkGray),
    }
}

fn command_lines(result: &CommandResult, color: bool) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(vec![
            Span::styled("種別: ", Style::default().fg(Color::DarkGray)),
            Span::styled(result.intent.as_str(), intent_style(result.intent, color)),
            Span::styled(
                format!("（{:?}）", result.confidence).to_lowercase(),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            result.command.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];
    if let Some(issue) = &result.issue {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("注意: {issue}"),
            if color {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            },
        )));
    }
    lines
}

fn draw_rightsizing(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let Some(report) = &app.report else {
        draw_placeholder(f, area, app, "ライトサイジング");
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let fallback_zone = app.report_selection.primary_zone();
    let items: Vec<ListItem> = if report.recommendations.is_empty() {
        vec![ListItem::new(Line::from("推奨はありません。"))]
    } else {
        report
            .recommendations
            .iter()
            .map(|rec| {
                let result = app.synthesizer.synthesize(rec, fallback_zone);
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<7}", result.intent.as_str()),
                        intent_style(result.intent, app.color),
                    ),
                    Span::raw(format!(
                        "{:>12}  ",
                        format_money(rec.monthly_savings(), &report.summary.currency)
                    )),
                    Span::raw(truncate_middle(&rec.description, 60)),
                ]))
            })
            .collect()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("推奨（{}件）", report.recommendations.len())),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, chunks[0], &mut app.rightsizing_state);

    let detail = match app
        .rightsizing_state
        .selected()
        .and_then(|i| report.recommendations.get(i))
    {
        Some(rec) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    rec.description.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!("ID: {}", rec.recommendation_id)),
            ];
            if let Some(priority) = &rec.priority {
                lines.push(Line::from(format!("優先度: {priority}")));
            }
            if let Some(subtype) = &rec.recommender_subtype {
                lines.push(Line::from(format!("サブタイプ: {subtype}")));
            }
            lines.push(Line::from(format!(
                "ゾーン: {}",
                rec.zone.as_deref().unwrap_or(fallback_zone)
            )));
            lines.push(Line::from(""));
            lines.extend(command_lines(
                &app.synthesizer.synthesize(rec, fallback_zone),
                app.color,
            ));
            Text::from(lines)
        }
        None => Text::from("推奨が選択されていません。"),
    };
    let w = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title("詳細"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, chunks[1]);
}

fn draw_zombies(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let Some(report) = &app.report else {
        draw_placeholder(f, area, app, "ゾンビ");
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let fallback_zone = app.report_selection.primary_zone();
    let items: Vec<ListItem> = if report.zombie_resources.is_empty() {
        vec![ListItem::new(Line::from("ゾンビリソースは見つかりませんでした。"))]
    } else {
        report
            .zombie_resources
            .iter()
            .map(|z| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        pad_end_display(&truncate_middle(&z.name, 28), 28),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::raw(pad_end_display(z.resource_type.as_str(), 12)),
                    Span::raw(format!(
                        "{:>12}  ",
                        format_money(z.monthly_waste(), &report.summary.currency)
                    )),
                    Span::styled(z.waste_reason.clone(), Style::default().fg(Color::DarkGray)),
                ]))
            })
            .collect()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("ゾンビリソース（{}件）", report.zombie_resources.len())),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, chunks[0], &mut app.zombies_state);

    let detail = match app
        .zombies_state
        .selected()
        .and_then(|i| report.zombie_resources.get(i))
    {
        Some(z) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    z.name.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!("ID: {}", z.resource_id)),
                Line::from(format!("種別: {}", z.resource_type)),
                Line::from(format!("ゾーン: {}", z.zone_or(fallback_zone))),
                Line::from(format!("理由: {}", z.waste_reason)),
                Line::from(format!(
                    "推定浪費: {}/月",
                    format_money(z.monthly_waste(), &report.summary.currency)
                )),
                Line::from(""),
                Line::from(Span::styled(
                    crate::console::zombie_console_url(
                        z,
                        &app.report_selection.project_id,
                        fallback_zone,
                    ),
                    Style::default().fg(Color::DarkGray),
                )),
                Line::from(""),
            ];
            lines.extend(command_lines(
                &app.synthesizer.zombie_command(z, fallback_zone),
                app.color,
            ));
            Text::from(lines)
        }
        None => Text::from("リソースが選択されていません。"),
    };
    let w = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title("詳細"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, chunks[1]);
}

fn settings_field_line(label: &str, value: &str, active: bool) -> Line<'static> {
    let value = if active {
        format!("{value}▏")
    } else if value.is_empty() {
        "（空）".to_string()
    } else {
        value.to_string()
    };
    let value_style = if active {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(pad_end_display(label, 14), Style::default().fg(Color::DarkGray)),
        Span::styled(value, value_style),
    ])
}

fn draw_settings(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let editing = |field: SettingsField| app.settings_edit == Some(field);
    let mut items = vec![
        ListItem::new(settings_field_line(
            "プロジェクト",
            &app.draft.project_id,
            editing(SettingsField::Project),
        )),
        ListItem::new(settings_field_line(
            "ゾーン",
            &app.draft.zones,
            editing(SettingsField::Zones),
        )),
    ];
    for project in &app.projects {
        let marker = if project.project_id == app.selection.project_id {
            "● "
        } else {
            "  "
        };
        items.push(ListItem::new(Line::from(format!("{marker}{}", project.label()))));
    }

    let dirty = app.draft.is_dirty(&app.selection);
    let title = if dirty {
        "選択（未保存の変更あり）"
    } else {
        "選択"
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, chunks[0], &mut app.settings_state);

    let mut lines = vec![
        Line::from(Span::styled(
            "保存済みの選択",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("  プロジェクト: {}", app.selection.project_id)),
        Line::from(format!("  ゾーン: {}", app.selection.zones.join(", "))),
        Line::from(""),
        Line::from("編集内容は `s` で保存するまで取得に反映されません。"),
        Line::from("一覧のプロジェクトで Enter を押すと、その場で保存して再取得します。"),
        Line::from(""),
        Line::from(Span::styled(
            format!("保存先: {}", app.selection_path.display()),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    if let Err(err) = app.draft.to_selection() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("入力エラー: {err}"),
            Style::default().fg(Color::Yellow),
        )));
    }
    let w = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("説明"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, chunks[1]);
}

fn draw_action_dialog(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let Some(dialog) = &app.dialog else {
        return;
    };
    let mut lines = vec![
        Line::from(Span::styled(
            dialog.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    lines.extend(command_lines(&dialog.result, app.color));
    if let Some(url) = &dialog.console_url {
        lines.push(Line::from(""));
        lines.push(Line::from(format!("コンソール: {url}")));
    }
    lines.push(Line::from(""));
    if copy_ack_visible(dialog.copied_at, Instant::now()) {
        lines.push(Line::from(Span::styled(
            "コピーしました",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )));
    } else if dialog.result.is_actionable() {
        lines.push(Line::from(Span::styled(
            "c: クリップボードにコピー  Esc: 閉じる",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        lines.push(Line::from(Span::styled(
            "Esc: 閉じる",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let popup = centered_rect(80, 60, area);
    f.render_widget(Clear, popup);
    let w = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("アクション"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, popup);
}

fn draw_error(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let msg = app
        .error
        .as_deref()
        .unwrap_or("不明なエラーです。")
        .to_string();
    let popup = centered_rect(70, 40, area);
    f.render_widget(Clear, popup);
    let w = Paragraph::new(msg)
        .block(Block::default().borders(Borders::ALL).title("エラー"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, popup);
}

fn draw_help(f: &mut ratatui::Frame, area: Rect, _app: &App) {
    let text = Text::from(vec![
        Line::from(Span::styled(
            "clouddiet UI",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("共通:"),
        Line::from("  Tab / Shift-Tab / 1-5 : 画面切替"),
        Line::from("  r     : 3つのデータを再取得"),
        Line::from("  ?     : ヘルプ"),
        Line::from("  q     : 終了（入力中は文字入力）"),
        Line::from("  Ctrl-C: 強制終了（どの画面でも）"),
        Line::from(""),
        Line::from("インベントリ:"),
        Line::from("  /     : フィルタ（名前・種別・場所、大文字小文字を区別しない）"),
        Line::from("  ↑↓ / j/k : 移動"),
        Line::from(""),
        Line::from("ライトサイジング / ゾンビ:"),
        Line::from("  Enter : アクション（生成コマンドの表示）"),
        Line::from("  c     : （アクション内）クリップボードにコピー"),
        Line::from(""),
        Line::from("設定:"),
        Line::from("  Enter : 項目を編集 / 一覧のプロジェクトを選んで保存"),
        Line::from("  s     : 編集内容を保存して再取得"),
        Line::from("  u     : 編集内容を破棄"),
        Line::from(""),
        Line::from("入力中:"),
        Line::from("  Enter/Esc: 入力終了  Backspace: 削除  Ctrl-U: クリア"),
        Line::from(""),
        Line::from(Span::styled(
            "注意:",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from("  生成されたコマンドは表示とコピーのみです。実行はご自身の端末で確認してから行ってください。"),
        Line::from("  説明文から組み立てたコマンド（heuristic）は特に内容を確認してください。"),
    ]);

    let popup = centered_rect(70, 80, area);
    f.render_widget(Clear, popup);
    let w = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("ヘルプ"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DataSource, FetchError};
    use crate::core::{CostSavings, Recommendation, ResourceType, ZombieResource};
    use crate::engine::EngineOptions;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEMP_HOME_COUNTER: AtomicU64 = AtomicU64::new(0);

    struct TempHomeDir {
        path: PathBuf,
    }

    impl TempHomeDir {
        fn new() -> Self {
            let pid = std::process::id();
            let n = TEMP_HOME_COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!("clouddiet-tui-home-{pid}-{n}"));
            std::fs::create_dir_all(&path).expect("テスト用ホームディレクトリ作成");
            Self { path }
        }
    }

    impl Drop for TempHomeDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    struct FixtureSource;

    impl DataSource for FixtureSource {
        fn describe(&self) -> String {
            "fixture".to_string()
        }

        fn report(&self, selection: &Selection) -> Result<Report, FetchError> {
            Ok(sample_report(&selection.project_id))
        }

        fn projects(&self) -> Result<Vec<Project>, FetchError> {
            Ok(vec![
                Project {
                    project_id: "demo".to_string(),
                    display_name: "Demo".to_string(),
                },
                Project {
                    project_id: "other".to_string(),
                    display_name: String::new(),
                },
            ])
        }

        fn resources(&self, _selection: &Selection) -> Result<Vec<InventoryItem>, FetchError> {
            Ok(vec![
                item("web-1", "compute.googleapis.com/Instance", "us-central1-a"),
                item("analytics", "bigquery.googleapis.com/Dataset", "US"),
            ])
        }
    }

    fn item(name: &str, asset_type: &str, location: &str) -> InventoryItem {
        InventoryItem {
            name: name.to_string(),
            asset_type: asset_type.to_string(),
            location: location.to_string(),
            project: "demo".to_string(),
            state: "RUNNING".to_string(),
            create_time: "2026-01-01 00:00:00".to_string(),
        }
    }

    fn sample_report(project_id: &str) -> Report {
        let mut rec = Recommendation::from_description(
            "rec-1",
            "web-1 Change machine type from n1-standard-4 to n1-standard-2",
        );
        rec.cost_savings = Some(CostSavings {
            amount_per_month: -40.0,
            currency: "USD".to_string(),
        });
        Report {
            project_id: Some(project_id.to_string()),
            recommendations: vec![rec],
            zombie_resources: vec![ZombieResource {
                resource_id: "9001".to_string(),
                name: "orphan-disk".to_string(),
                resource_type: ResourceType::Disk,
                zone: None,
                region: None,
                waste_reason: "Unattached Disk".to_string(),
                estimated_monthly_waste: Some(7.25),
            }],
            ..Report::default()
        }
    }

    fn test_engine(home: &TempHomeDir) -> Engine {
        Engine::with_source(
            EngineOptions {
                api_url: String::new(),
                timeout: Duration::from_secs(1),
                from_dir: None,
                show_progress: false,
            },
            Arc::new(FixtureSource),
            home.path.clone(),
        )
    }

    fn test_app(home: &TempHomeDir) -> App {
        App::new(
            TuiOptions {
                color: false,
                selection: Selection::new(
                    "demo",
                    vec!["us-central1-a".to_string(), "us-central1-b".to_string()],
                ),
                selection_path: crate::config::selection_path(&home.path),
                synthesizer: Synthesizer::default(),
                fetch_timeout: Duration::from_secs(5),
            },
            "fixture".to_string(),
        )
    }

    fn press(app: &mut App, engine: &Engine, code: KeyCode) -> bool {
        handle_key(app, engine, KeyEvent::new(code, KeyModifiers::NONE)).expect("handle_key")
    }

    fn type_str(app: &mut App, engine: &Engine, s: &str) {
        for c in s.chars() {
            press(app, engine, KeyCode::Char(c));
        }
    }

    fn settle_all(app: &mut App) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !app.in_flight().is_empty() {
            assert!(Instant::now() < deadline, "fetches did not settle");
            std::thread::sleep(Duration::from_millis(5));
            poll_fetches(app);
        }
    }

    #[test]
    fn tab_and_digits_switch_views() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);

        press(&mut app, &engine, KeyCode::Tab);
        assert_eq!(app.view, View::Inventory);
        press(&mut app, &engine, KeyCode::BackTab);
        press(&mut app, &engine, KeyCode::BackTab);
        assert_eq!(app.view, View::Settings);
        press(&mut app, &engine, KeyCode::Char('4'));
        assert_eq!(app.view, View::Zombies);
    }

    #[test]
    fn request_all_loads_every_dataset() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);

        request_all(&mut app, &engine);
        settle_all(&mut app);

        assert_eq!(app.recommendation_count(), 1);
        assert_eq!(app.projects.len(), 2);
        assert_eq!(app.inventory.total(), 2);
        assert_eq!(app.rightsizing_state.selected(), Some(0));
    }

    #[test]
    fn inventory_filter_mode_allows_q_input() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);
        request_all(&mut app, &engine);
        settle_all(&mut app);

        press(&mut app, &engine, KeyCode::Char('2'));
        press(&mut app, &engine, KeyCode::Char('/'));
        assert!(app.filter_mode);
        let quit = press(&mut app, &engine, KeyCode::Char('q'));
        assert!(!quit);
        assert_eq!(app.inventory.query(), "q");
        assert_eq!(app.inventory.len(), 1);

        press(&mut app, &engine, KeyCode::Backspace);
        type_str(&mut app, &engine, "BIGQUERY");
        assert_eq!(app.inventory.len(), 1);
        press(&mut app, &engine, KeyCode::Enter);
        assert!(!app.filter_mode);
        assert_eq!(app.inventory.get(0).map(|i| i.name.as_str()), Some("analytics"));
    }

    #[test]
    fn settings_draft_is_inert_until_committed() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);
        request_all(&mut app, &engine);
        settle_all(&mut app);
        let generation_before = app.report_slot.generation();

        press(&mut app, &engine, KeyCode::Char('5'));
        press(&mut app, &engine, KeyCode::Down);
        press(&mut app, &engine, KeyCode::Enter);
        assert_eq!(app.settings_edit, Some(SettingsField::Zones));
        press(&mut app, &engine, KeyCode::Char('u'));
        let _ = handle_key(
            &mut app,
            &engine,
            KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL),
        )
        .expect("handle_key");
        type_str(&mut app, &engine, "europe-west1-b");
        press(&mut app, &engine, KeyCode::Enter);

        assert_eq!(app.draft.zones, "europe-west1-b");
        assert_eq!(app.selection.zones, vec!["us-central1-a", "us-central1-b"]);
        assert_eq!(app.report_slot.generation(), generation_before);
        assert!(!app.selection_path.exists());

        press(&mut app, &engine, KeyCode::Char('s'));
        assert_eq!(app.selection.zones, vec!["europe-west1-b"]);
        assert_eq!(app.report_slot.generation(), generation_before + 1);
        let saved = crate::config::load_selection(&app.selection_path)
            .expect("load")
            .expect("saved");
        assert_eq!(saved, app.selection);
    }

    #[test]
    fn invalid_draft_is_not_committed() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);

        app.view = View::Settings;
        app.draft.zones = " , ".to_string();
        press(&mut app, &engine, KeyCode::Char('s'));
        assert!(app.status.as_ref().is_some_and(|s| s.is_error));
        assert_eq!(app.selection.zones.len(), 2);
        assert!(!app.selection_path.exists());
    }

    #[test]
    fn selecting_listed_project_commits_immediately() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);
        request_all(&mut app, &engine);
        settle_all(&mut app);

        press(&mut app, &engine, KeyCode::Char('5'));
        for _ in 0..3 {
            press(&mut app, &engine, KeyCode::Down);
        }
        press(&mut app, &engine, KeyCode::Enter);
        assert_eq!(app.selection.project_id, "other");
        settle_all(&mut app);
        assert_eq!(
            app.report.as_ref().and_then(|r| r.project_id.as_deref()),
            Some("other")
        );
    }

    #[test]
    fn enter_on_recommendation_opens_action_dialog() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);
        request_all(&mut app, &engine);
        settle_all(&mut app);

        press(&mut app, &engine, KeyCode::Char('3'));
        press(&mut app, &engine, KeyCode::Enter);
        assert_eq!(app.screen, Screen::ActionDialog);
        let dialog = app.dialog.as_ref().expect("dialog");
        assert_eq!(
            dialog.result.command,
            "gcloud compute instances set-machine-type web-1 --zone us-central1-a --machine-type n1-standard-2"
        );

        let quit = press(&mut app, &engine, KeyCode::Char('q'));
        assert!(!quit);
        assert_eq!(app.screen, Screen::Main);
        assert!(app.dialog.is_none());
    }

    #[test]
    fn zombie_dialog_carries_console_link() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);
        request_all(&mut app, &engine);
        settle_all(&mut app);

        press(&mut app, &engine, KeyCode::Char('4'));
        press(&mut app, &engine, KeyCode::Enter);
        let dialog = app.dialog.as_ref().expect("dialog");
        assert_eq!(
            dialog.result.command,
            "gcloud compute disks delete orphan-disk --zone us-central1-a"
        );
        assert_eq!(
            dialog.console_url.as_deref(),
            Some("https://console.cloud.google.com/compute/disks?project=demo")
        );
    }

    #[test]
    fn dialog_uses_selection_of_displayed_report() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);
        request_all(&mut app, &engine);
        settle_all(&mut app);

        app.view = View::Settings;
        app.draft = SelectionDraft {
            project_id: "other".to_string(),
            zones: "europe-west1-b".to_string(),
        };
        press(&mut app, &engine, KeyCode::Char('s'));
        assert_eq!(app.selection.project_id, "other");

        press(&mut app, &engine, KeyCode::Char('4'));
        press(&mut app, &engine, KeyCode::Enter);
        let dialog = app.dialog.as_ref().expect("dialog");
        assert_eq!(
            dialog.result.command,
            "gcloud compute disks delete orphan-disk --zone us-central1-a"
        );
        assert_eq!(
            dialog.console_url.as_deref(),
            Some("https://console.cloud.google.com/compute/disks?project=demo")
        );

        press(&mut app, &engine, KeyCode::Esc);
        settle_all(&mut app);
        press(&mut app, &engine, KeyCode::Enter);
        let dialog = app.dialog.as_ref().expect("dialog");
        assert_eq!(
            dialog.result.command,
            "gcloud compute disks delete orphan-disk --zone europe-west1-b"
        );
        assert_eq!(
            dialog.console_url.as_deref(),
            Some("https://console.cloud.google.com/compute/disks?project=other")
        );
    }

    #[test]
    fn failed_fetch_keeps_previous_report() {
        let home = TempHomeDir::new();
        let mut app = test_app(&home);
        app.report = Some(sample_report("demo"));

        let key = FetchKey::new(DatasetKind::Report, &app.selection);
        let outcome: FetchOutcome<Report> = FetchOutcome::Failed {
            key,
            error: FetchError::MissingProject,
            elapsed: Duration::from_millis(1),
        };
        assert!(settle(&mut app, outcome).is_none());
        assert!(app.report.is_some());
        let status = app.status.as_ref().expect("status");
        assert!(status.is_error);
        assert!(status.text.contains("report"));
    }

    #[test]
    fn copy_ack_expires_after_two_seconds() {
        let now = Instant::now();
        assert!(!copy_ack_visible(None, now));
        assert!(copy_ack_visible(Some(now), now + Duration::from_millis(1500)));
        assert!(!copy_ack_visible(Some(now), now + Duration::from_millis(2000)));
    }

    #[test]
    fn help_returns_to_previous_screen() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);

        press(&mut app, &engine, KeyCode::Char('?'));
        assert_eq!(app.screen, Screen::Help);
        press(&mut app, &engine, KeyCode::Esc);
        assert_eq!(app.screen, Screen::Main);
    }

    #[test]
    fn missing_project_skips_scoped_fetches() {
        let home = TempHomeDir::new();
        let engine = test_engine(&home);
        let mut app = test_app(&home);
        app.selection = Selection::new("", vec!["us-central1-a".to_string()]);

        request_all(&mut app, &engine);
        assert!(!app.report_slot.is_in_flight());
        assert!(!app.resources_slot.is_in_flight());
        assert!(app.status.as_ref().is_some_and(|s| s.is_error));
        settle_all(&mut app);
        assert_eq!(app.projects.len(), 2);
    }
}
