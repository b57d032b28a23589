use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState},
};

use crate::domain::CMDMode;
use crate::model::UIData;
use crate::pane::{ConnectionState, PaneView};

pub const STATUSLINE_HEIGHT: usize = 1;
// Borders, table header and the pane status line.
pub const PANE_CHROME_HEIGHT: usize = 4;

const COLUMN_WIDTH_MIN: u16 = 6;
const COLUMN_WIDTH_MAX: u16 = 40;
const COLUMN_WIDTH_MARGIN: u16 = 1;

pub struct TableUI;

impl TableUI {
    pub fn new() -> Self {
        Self
    }

    pub fn draw(&mut self, uidata: &UIData, frame: &mut Frame) {
        let [body, statusline] = Layout::vertical([
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(frame.area());

        let pane_areas =
            Layout::vertical(uidata.panes.iter().map(|_| Constraint::Fill(1))).split(body);
        for (idx, (pane, area)) in uidata.panes.iter().zip(pane_areas.iter()).enumerate() {
            draw_pane(frame, pane, *area, idx == uidata.focused);
        }

        draw_statusline(frame, uidata, statusline);

        if uidata.show_popup {
            draw_popup(frame, &uidata.popup_message);
        }
    }
}

fn connection_span(state: ConnectionState) -> Span<'static> {
    match state {
        ConnectionState::Idle => "○ idle".dark_gray(),
        ConnectionState::Connecting => "◌ connecting".yellow(),
        ConnectionState::Connected => "● connected".green(),
        ConnectionState::Disconnected => "● disconnected".red(),
    }
}

fn header_line(pane: &PaneView) -> Line<'static> {
    let auto = if pane.auto_refresh {
        format!("auto {}ms", pane.interval_ms).green()
    } else {
        "auto off".dark_gray()
    };
    let mut spans = vec![
        " ".into(),
        pane.title.clone().bold(),
        " [".into(),
        pane.index.clone().yellow(),
        "] ".into(),
        connection_span(pane.connection),
        " · ".into(),
        auto,
    ];
    if !pane.follow {
        spans.push(" · paused".magenta());
    }
    spans.push(" ".into());
    Line::from(spans)
}

fn column_widths(pane: &PaneView) -> Vec<Constraint> {
    pane.columns
        .iter()
        .enumerate()
        .map(|(pos, name)| {
            let longest = pane
                .rows
                .iter()
                .map(|r| r.get(pos).map(|c| c.chars().count()).unwrap_or(0))
                .max()
                .unwrap_or(0)
                .max(name.chars().count() + 2);
            let width = (longest as u16 + COLUMN_WIDTH_MARGIN).clamp(COLUMN_WIDTH_MIN, COLUMN_WIDTH_MAX);
            Constraint::Length(width)
        })
        .collect()
}

fn draw_pane(frame: &mut Frame, pane: &PaneView, area: Rect, focused: bool) {
    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::bordered()
        .title(header_line(pane))
        .title_bottom(Line::from(format!(" {} ", pane.status_message)).left_aligned())
        .title_bottom(Line::from(format!(" {} rows ", pane.rows.len())).right_aligned())
        .border_set(if focused { border::THICK } else { border::PLAIN })
        .border_style(border_style);

    if pane.columns.is_empty() {
        let waiting = Paragraph::new("no data yet").centered().dark_gray().block(block);
        frame.render_widget(waiting, area);
        return;
    }

    let header = Row::new(pane.columns.iter().enumerate().map(|(pos, name)| {
        let marker = match pane.sort {
            Some(s) if s.column == pos && s.ascending => " ▲",
            Some(s) if s.column == pos => " ▼",
            _ => "",
        };
        let cell = Cell::from(format!("{name}{marker}"));
        if focused && pos == pane.selected_column {
            cell.style(Style::default().add_modifier(Modifier::REVERSED))
        } else {
            cell
        }
    }))
    .style(Style::default().add_modifier(Modifier::BOLD))
    .height(1);

    let rows = pane
        .rows
        .iter()
        .map(|r| Row::new(r.iter().map(|c| Cell::from(c.as_str()))));

    let table = Table::new(rows, column_widths(pane))
        .header(header)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = TableState::default();
    if !pane.rows.is_empty() {
        state.select(Some(pane.selected_row));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_statusline(frame: &mut Frame, uidata: &UIData, area: Rect) {
    let line = if uidata.active_cmdinput {
        let prompt = match uidata.cmd_mode {
            Some(CMDMode::Interval) => "interval ms: ",
            Some(CMDMode::Index) => "index: ",
            None => "> ",
        };
        let x = area.x + (prompt.chars().count() + uidata.cmdinput.cursor) as u16;
        frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
        Line::from(vec![prompt.bold(), uidata.cmdinput.input.clone().into()])
    } else {
        Line::from(vec![
            uidata.status_message.clone().into(),
            "  ? help  q quit".dark_gray(),
        ])
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_popup(frame: &mut Frame, message: &str) {
    let area = frame.area();
    let lines = message.lines().count() as u16 + 2;
    let width = message.lines().map(|l| l.chars().count()).max().unwrap_or(0) as u16 + 4;
    let popup = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(lines) / 2,
        width: width.min(area.width),
        height: lines.min(area.height),
    };
    let block = Block::bordered()
        .title(Line::from(" Help ".bold()).centered())
        .border_set(border::THICK);
    frame.render_widget(Clear, popup);
    frame.render_widget(Paragraph::new(message).block(block), popup);
}
