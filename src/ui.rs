use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode, View};
use crate::editor::FieldKind;
use crate::model::{GpuFamily, GpuSummary, WorkloadRecord, WorkloadStatus};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);
const PL_E: Color = Color::Rgb(13, 148, 136);
const ROW_HIGHLIGHT: Color = Color::Rgb(24, 36, 58);

const JOB_HEADERS: [&str; 8] = [
    "NAME",
    "STATUS",
    "COMPLETIONS",
    "DURATION",
    "AGE",
    "PODS",
    "GPU",
    "GPU INFO",
];

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    match app.view() {
        View::ConfirmDelete => render_confirm_modal(frame, app),
        View::SaveName => render_save_name_modal(frame, app),
        _ => {}
    }
    if app.show_help() {
        render_help_modal(frame, app);
    }
    if app.notice().is_some() {
        render_notice_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line)
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let filter = app.filter();
    let scope = if filter.only_mine { "mine" } else { "all" };
    let mut spans = Vec::new();
    push_powerline_segment(
        &mut spans,
        format!(" 󱃾 {} ", compact_text(app.context(), 24)),
        Color::White,
        PL_A,
        PL_B,
    );
    push_powerline_segment(
        &mut spans,
        format!(" 󰅩 {} ", compact_text(app.namespace(), 20)),
        Color::White,
        PL_B,
        PL_C,
    );
    push_powerline_segment(
        &mut spans,
        format!(" 󰀄 {} ", compact_text(app.identity(), 16)),
        Color::White,
        PL_C,
        PL_D,
    );
    push_powerline_segment(
        &mut spans,
        format!(
            " 󰈲 {}  {}  {} ",
            filter.status.title(),
            filter.sort.title(),
            scope
        ),
        Color::White,
        PL_D,
        BG,
    );
    Line::from(spans)
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let Some(refreshed_at) = app.refreshed_at() else {
        return Line::from(Vec::new());
    };
    let mut spans = Vec::new();
    push_powerline_segment_rtl(
        &mut spans,
        format!(" 󰑓 {refreshed_at} "),
        Color::Black,
        PL_E,
        BG,
    );
    Line::from(spans)
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    match app.view() {
        View::ConfigList => render_config_list(frame, area, app),
        View::ConfigEdit | View::SaveName => render_config_form(frame, area, app),
        View::Main | View::ConfirmDelete | View::ShellSession | View::ConfigViewerSession => {
            render_jobs_table(frame, area, app)
        }
    }
}

fn render_jobs_table(frame: &mut Frame, area: Rect, app: &App) {
    let header_row = Row::new(JOB_HEADERS.iter().map(|header| {
        Cell::from(*header).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = app.rows().iter().map(job_row);
    let title = if app.rows().len() == app.snapshot_len() {
        format!("Jobs ({})", app.rows().len())
    } else {
        format!("Jobs ({}/{})", app.rows().len(), app.snapshot_len())
    };

    let table = Table::new(rows, job_column_constraints())
        .header(header_row)
        .block(panel_block(title, ACCENT))
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(ROW_HIGHLIGHT)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    state.select(app.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

fn job_row(record: &WorkloadRecord) -> Row<'static> {
    let white = Style::default().fg(Color::White);
    Row::new(vec![
        Cell::from(record.name.clone()).style(white),
        Cell::from(record.status.title()).style(Style::default().fg(status_color(record.status))),
        Cell::from(record.completions.clone()).style(white),
        Cell::from(record.duration.clone()).style(white),
        Cell::from(record.age.clone()).style(white),
        Cell::from(record.pod_count.to_string()).style(white),
        Cell::from(record.gpu_count.to_string()).style(white),
        Cell::from(record.gpu.label()).style(Style::default().fg(gpu_color(&record.gpu))),
    ])
}

fn status_color(status: WorkloadStatus) -> Color {
    match status {
        WorkloadStatus::Running => ACCENT,
        WorkloadStatus::Complete => Color::Rgb(96, 165, 250),
        WorkloadStatus::Failed => ERROR,
        WorkloadStatus::Pending => WARN,
    }
}

fn gpu_color(summary: &GpuSummary) -> Color {
    match summary {
        GpuSummary::NoGpu => MUTED,
        GpuSummary::Waiting(_) => Color::Rgb(100, 116, 139),
        GpuSummary::Assigned(descriptor) => match descriptor.family {
            Some(GpuFamily::H200) => Color::Rgb(250, 204, 21),
            Some(GpuFamily::H100) => Color::Rgb(192, 132, 252),
            Some(GpuFamily::A100) => Color::Rgb(96, 165, 250),
            None => Color::White,
        },
    }
}

fn job_column_constraints() -> Vec<Constraint> {
    vec![
        Constraint::Min(24),
        Constraint::Length(9),
        Constraint::Length(11),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(5),
        Constraint::Length(4),
        Constraint::Min(12),
    ]
}

fn render_config_list(frame: &mut Frame, area: Rect, app: &App) {
    let entries = app.config_entries();
    let header_row = Row::new([Cell::from("CONFIGURATION")])
        .height(1)
        .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));

    let rows = entries.iter().enumerate().map(|(index, entry)| {
        let style = if index == 0 {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(Color::White)
        };
        Row::new([Cell::from(entry.clone()).style(style)])
    });

    let table = Table::new(rows, column_constraints(1))
        .header(header_row)
        .block(panel_block(
            format!("Configurations ({})", entries.len().saturating_sub(1)),
            ACCENT,
        ))
        .row_highlight_style(
            Style::default()
                .bg(ROW_HIGHLIGHT)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    state.select(Some(app.config_selected()));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_config_form(frame: &mut Frame, area: Rect, app: &App) {
    let Some(form) = app.form() else {
        frame.render_widget(
            Paragraph::new("No configuration loaded")
                .block(panel_block("Configuration".to_string(), MUTED))
                .style(Style::default().fg(MUTED)),
            area,
        );
        return;
    };

    let header_row = Row::new(["PARAMETER", "VALUE"].map(|header| {
        Cell::from(header).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let fields = form.fields();
    let rows = fields.iter().enumerate().map(|(index, field)| {
        let editing = (index == form.selected())
            .then(|| form.editing())
            .flatten();
        let value = match (editing, &field.kind) {
            (Some(buffer), _) => Cell::from(format!("{buffer}▏"))
                .style(Style::default().fg(Color::Black).bg(WARN)),
            (None, FieldKind::Choice(_)) => Cell::from(format!("◀ {} ▶", field.value))
                .style(Style::default().fg(Color::Rgb(125, 211, 252))),
            (None, FieldKind::Text) => {
                Cell::from(field.value.clone()).style(Style::default().fg(Color::White))
            }
        };
        Row::new(vec![
            Cell::from(field.name.clone()).style(Style::default().fg(MUTED)),
            value,
        ])
    });

    let source = form.source().unwrap_or("new");
    let title = if form.modified() {
        format!("Configuration: {source} [modified]")
    } else {
        format!("Configuration: {source}")
    };
    let border = if form.modified() { WARN } else { ACCENT };

    let table = Table::new(
        rows,
        [Constraint::Percentage(35), Constraint::Percentage(65)],
    )
    .header(header_row)
    .block(panel_block(title, border))
    .column_spacing(2)
    .row_highlight_style(
        Style::default()
            .bg(ROW_HIGHLIGHT)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    state.select((!fields.is_empty()).then_some(form.selected()));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let (mode_label, mode_bg) = match app.mode() {
        InputMode::Normal => (" 󰘳 jobs ", PL_A),
        InputMode::Confirm => (" 󰀦 confirm ", WARN),
        InputMode::Notice => (" 󰅚 notice ", ERROR),
        InputMode::ConfigList => (" 󰈙 configs ", PL_A),
        InputMode::ConfigEdit => (" 󰏫 edit ", PL_A),
        InputMode::Text => (" 󰌌 input ", WARN),
    };
    let mode_fg = if mode_bg == PL_A {
        Color::White
    } else {
        Color::Black
    };

    let status_text = app
        .pending_confirmation_prompt()
        .map(|prompt| format!("{prompt}? (y/n)"))
        .unwrap_or_else(|| app.status().to_string());
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, mode_label, mode_fg, mode_bg, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(
            " {} {} ",
            footer_status_icon(&status_text),
            compact_text(&status_text, area.width.saturating_sub(40).max(24) as usize)
        ),
        Color::White,
        PL_B,
        BG,
    );

    let hints = Line::from(Span::styled(
        format!("{} ", key_hints(app)),
        Style::default().fg(MUTED),
    ));
    let min_left = 28u16;
    let hints_width = (spans_width(&hints.spans) as u16).min(area.width.saturating_sub(min_left));
    if hints_width == 0 {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(hints_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(hints)
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn key_hints(app: &App) -> &'static str {
    match app.mode() {
        InputMode::Normal => "r refresh  f filter  s sort  h mine  n configs  ? help",
        InputMode::Confirm => "y confirm  n cancel",
        InputMode::Notice => "Enter dismiss",
        InputMode::ConfigList => "Enter open  a apply  d delete  Esc back",
        InputMode::ConfigEdit => "Enter edit  ←/→ cycle  e bulk  ^S save  a apply  Esc back",
        InputMode::Text => "Enter accept  Esc cancel",
    }
}

fn footer_status_icon(status_text: &str) -> &'static str {
    let status = status_text.to_ascii_lowercase();
    let has_failure = ["failed", "error", "timed out", "rejected", "denied", "not owned"]
        .iter()
        .any(|needle| status.contains(needle));
    if has_failure { "󰅚" } else { "󰄬" }
}

fn render_confirm_modal(frame: &mut Frame, app: &App) {
    let Some(prompt) = app.pending_confirmation_prompt() else {
        return;
    };
    let area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(format!("{prompt}?")),
        Line::from(""),
        Line::from(Span::styled(
            "y / Enter confirm    n / Esc cancel",
            Style::default().fg(MUTED),
        )),
    ];
    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .alignment(Alignment::Center)
        .block(modal_block("Confirm", WARN))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_save_name_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from("Save configuration as:"),
        Line::from(""),
        Line::from(Span::styled(
            format!("{}▏", app.name_input()),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
    ];
    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(modal_block("Save", ACCENT))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_notice_modal(frame: &mut Frame, app: &App) {
    let Some(notice) = app.notice() else {
        return;
    };
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);

    let mut lines: Vec<Line> = notice.message.lines().map(|line| Line::from(line.to_string())).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press Enter to dismiss",
        Style::default().fg(MUTED),
    )));
    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(modal_block(&notice.title, ERROR))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "jobdeck help  ns:{}  identity:{}",
            app.namespace(),
            app.identity()
        )),
        Line::from(""),
    ];
    for line in HELP_LINES {
        lines.push(Line::from(*line));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(modal_block("Help", ACCENT))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

const HELP_LINES: &[&str] = &[
    "Jobs: j/k move  g/G top/bottom  r refresh",
    "Filter: f cycle status  s cycle sort  h only my jobs",
    "Actions: d delete  e shell into running pod  c view job YAML",
    "Configs: n open list  Enter open  a apply  d delete",
    "Editor: Enter edit field  ←/→ cycle GPU model  e bulk edit",
    "        Ctrl+S save  a apply  Esc back (twice if modified)",
    "General: ? toggle help  q quit",
];

fn panel_block(title: String, border: Color) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(PANEL))
}

fn modal_block(title: &str, border: Color) -> Block<'static> {
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(PANEL))
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}
