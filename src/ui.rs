use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{block::Title, Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use std::collections::HashMap;

use crate::app::App;
use crate::detail::DetailEntry;
use crate::search::{SearchDisplay, SearchItem};
use crate::source::DetailRecord;

/// Screen regions for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenLayout {
    pub diagram: Rect,
    pub panel: Option<Rect>,
    pub status: Rect,
}

pub fn screen_layout(area: Rect, app: &App) -> ScreenLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    let diagram = rows[0];

    // The panel floats over the diagram's right edge; the diagram keeps the
    // full width whether or not anything is selected.
    let panel = app.selection.selected_id().map(|_| {
        let width = app.config.display.side_panel_width.min(diagram.width / 2);
        Rect::new(diagram.right() - width, diagram.y, width, diagram.height)
    });
    ScreenLayout {
        diagram,
        panel,
        status: rows[1],
    }
}

const CLOSE_MARKER: &str = "[x]";

/// True if (col, row) falls on the side panel's close marker.
pub fn is_close_marker(panel: Rect, col: u16, row: u16) -> bool {
    let width = CLOSE_MARKER.len() as u16;
    row == panel.y && col + width + 1 >= panel.right() && col + 1 < panel.right()
}

pub fn draw(frame: &mut Frame, app: &App) {
    let areas = screen_layout(frame.area(), app);

    draw_diagram(frame.buffer_mut(), app, areas.diagram);
    if let Some(panel) = areas.panel {
        draw_side_panel(frame, app, panel);
    }
    draw_status_bar(frame, app, areas.status);
    if app.search.is_open() {
        draw_search(frame, app, areas.diagram);
    }
}

const UP: u8 = 1;
const DOWN: u8 = 2;
const LEFT: u8 = 4;
const RIGHT: u8 = 8;

fn box_char(mask: u8) -> char {
    match mask {
        0 => ' ',
        m if m == UP | DOWN => '│',
        m if m == LEFT | RIGHT || m == LEFT || m == RIGHT => '─',
        m if m == DOWN | RIGHT => '┌',
        m if m == UP | RIGHT => '└',
        m if m == DOWN | LEFT => '┐',
        m if m == UP | LEFT => '┘',
        m if m == UP | DOWN | RIGHT => '├',
        m if m == UP | DOWN | LEFT => '┤',
        m if m == DOWN | LEFT | RIGHT => '┬',
        m if m == UP | LEFT | RIGHT => '┴',
        m if m == UP || m == DOWN => '│',
        _ => '┼',
    }
}

/// Connector cells, keyed by (col, row) relative to the diagram area
#[derive(Default)]
struct Connectors {
    cells: HashMap<(i64, i64), u8>,
}

impl Connectors {
    fn mark(&mut self, col: i64, row: i64, dirs: u8) {
        *self.cells.entry((col, row)).or_default() |= dirs;
    }

    fn horizontal(&mut self, row: i64, from: i64, to: i64) {
        for col in from.min(to)..=from.max(to) {
            let mut dirs = 0;
            if col > from.min(to) {
                dirs |= LEFT;
            }
            if col < from.max(to) {
                dirs |= RIGHT;
            }
            self.mark(col, row, dirs);
        }
    }

    fn vertical(&mut self, col: i64, from: i64, to: i64) {
        for row in from.min(to)..=from.max(to) {
            let mut dirs = 0;
            if row > from.min(to) {
                dirs |= UP;
            }
            if row < from.max(to) {
                dirs |= DOWN;
            }
            self.mark(col, row, dirs);
        }
    }

    /// Elbow from a parent marker to a child marker: out of the parent,
    /// along a vertical spine just left of the child, then into the child.
    fn elbow(&mut self, parent: (i64, i64), child: (i64, i64)) {
        let (pc, pr) = parent;
        let (cc, cr) = child;
        if cc <= pc + 1 {
            return;
        }
        let spine = (cc - 2).max(pc + 1);
        self.horizontal(pr, pc + 1, spine);
        self.vertical(spine, pr, cr);
        self.horizontal(cr, spine, cc - 1);
    }
}

fn put_str(buf: &mut Buffer, area: Rect, col: i64, row: i64, text: &str, style: Style) {
    if row < 0 || row >= area.height as i64 {
        return;
    }
    for (i, ch) in text.chars().enumerate() {
        let c = col + i as i64;
        if c < 0 {
            continue;
        }
        if c >= area.width as i64 {
            break;
        }
        let cell = &mut buf[(area.x + c as u16, area.y + row as u16)];
        cell.set_char(ch);
        cell.set_style(style);
    }
}

fn draw_diagram(buf: &mut Buffer, app: &App, area: Rect) {
    let theme = &app.theme;
    if app.diagram.nodes.is_empty() {
        let message = match &app.fragment_error {
            Some(_) => "No tree to show",
            None if app.ui.is_loading => "Loading tree...",
            None => "",
        };
        put_str(buf, area, 2, 1, message, Style::default().fg(theme.panel_muted));
        return;
    }

    let geometry = app.layout.geometry();
    let cell = app.config.display.cell;
    let cells: Vec<(i64, i64)> = app
        .diagram
        .nodes
        .iter()
        .map(|node| cell.to_cell(geometry.to_screen(node.pos)))
        .collect();

    let mut connectors = Connectors::default();
    for (index, node) in app.diagram.nodes.iter().enumerate() {
        for &child in &node.children {
            connectors.elbow(cells[index], cells[child]);
        }
    }
    let edge_style = Style::default().fg(theme.edge);
    for (&(col, row), &mask) in &connectors.cells {
        put_str(buf, area, col, row, &box_char(mask).to_string(), edge_style);
    }

    for (node, &(col, row)) in app.diagram.nodes.iter().zip(&cells) {
        let marker = if node.collapsed { "●" } else { "○" };
        put_str(buf, area, col, row, marker, Style::default().fg(theme.node_marker));

        let mut style = if node.extinct {
            Style::default().fg(theme.node_extinct)
        } else {
            Style::default().fg(theme.node_label)
        };
        if app.selection.is_selected(&node.id) {
            style = style
                .fg(theme.node_selected_fg)
                .bg(theme.node_selected_bg)
                .add_modifier(Modifier::BOLD);
        }
        if app.focus.as_deref() == Some(node.id.as_str()) {
            style = style.fg(theme.node_focus_fg).add_modifier(Modifier::REVERSED);
        }
        put_str(buf, area, col + 1, row, " ", Style::default());
        put_str(buf, area, col + 2, row, &node.label, style);
    }
}

fn detail_lines<'a>(app: &App, record: &'a DetailRecord) -> Vec<Line<'a>> {
    let theme = &app.theme;
    let heading = Style::default().fg(theme.panel_heading).add_modifier(Modifier::BOLD);
    let muted = Style::default().fg(theme.panel_muted);

    let mut lines = vec![
        Line::from(Span::styled(
            crate::tree::decorate_name(&record.name, record.extant),
            Style::default().fg(theme.panel_title).add_modifier(Modifier::BOLD),
        )),
        match &record.image {
            Some(url) => Line::from(vec![Span::styled("Image: ", muted), Span::raw(url.as_str())]),
            None => Line::from(Span::styled("No image", muted)),
        },
        Line::from(Span::styled("t: show tree | Esc: close", muted)),
    ];

    if let Some(other_names) = record.other_names.as_deref().filter(|s| !s.is_empty()) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Other names", heading)));
        lines.push(Line::from(other_names));
    }
    if let Some(description) = record.description.as_deref().filter(|s| !s.is_empty()) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Description", heading)));
        lines.push(Line::from(description));
    }
    if let Some(edited) = record.last_edited() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Last edited {}", edited.format("%Y-%m-%d")),
            muted,
        )));
    }
    lines
}

fn draw_side_panel(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let block = Block::default()
        .title(" Details ")
        .title(Title::from(CLOSE_MARKER).alignment(Alignment::Right))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.panel_border));

    let Some((id, entry)) = app.selected_detail() else {
        return;
    };

    let lines = match entry {
        DetailEntry::Resolved(record) => detail_lines(app, record),
        DetailEntry::Absent | DetailEntry::Pending => {
            vec![Line::from(Span::styled("Loading...", Style::default().fg(theme.panel_muted)))]
        }
        DetailEntry::Failed(e) => vec![
            Line::from(Span::styled(
                format!("Could not load {}: {}", id, e),
                Style::default().fg(theme.panel_error),
            )),
            Line::from(Span::styled(
                "Select the node again to retry",
                Style::default().fg(theme.panel_muted),
            )),
        ],
    };

    let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 3,
        width,
        height,
    )
}

fn draw_search(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let search = &app.search;
    let muted = Style::default().fg(theme.search_group_label);

    let mut lines = vec![
        Line::from(vec![
            Span::styled("> ", Style::default().fg(theme.search_border)),
            Span::styled(format!("{}_", search.query()), Style::default().fg(theme.search_input)),
        ]),
        Line::from(""),
    ];

    let items: &[SearchItem] = match search.display() {
        SearchDisplay::Suggestions(items) => {
            lines.push(Line::from(Span::styled("Suggestions", muted)));
            items
        }
        SearchDisplay::Results(items) => items,
        SearchDisplay::Loading => {
            lines.push(Line::from(Span::styled("Searching...", muted)));
            &[]
        }
        SearchDisplay::NoResults(query) => {
            lines.push(Line::from(Span::styled(format!("No results found for {}", query), muted)));
            &[]
        }
        SearchDisplay::Failed(e) => {
            lines.push(Line::from(Span::styled(
                format!("Search failed: {}", e),
                Style::default().fg(theme.panel_error),
            )));
            &[]
        }
    };

    for (i, item) in items.iter().enumerate() {
        let mut spans = vec![Span::raw(item.label.clone())];
        if let Some(category) = &item.category {
            spans.push(Span::styled(format!("  {}", category), Style::default().fg(theme.search_category)));
        }
        let mut line = Line::from(spans);
        if i == search.highlighted() {
            line = line.style(
                Style::default()
                    .fg(theme.search_highlight_fg)
                    .bg(theme.search_highlight_bg),
            );
        }
        lines.push(line);
    }

    let height = lines.len() as u16 + 2;
    let rect = centered(area, app.config.display.search_width, height);
    let block = Block::default()
        .title(" Search ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.search_border));

    frame.render_widget(Clear, rect);
    frame.render_widget(Paragraph::new(lines).block(block), rect);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let status_text = if app.ui.is_loading {
        format!("Loading... | {}", app.ui.status_message)
    } else {
        app.ui.status_message.clone()
    };

    let help_text = if app.search.is_open() {
        "Type to search | ↑↓: Highlight | Enter: Select | Esc: Close"
    } else {
        "/: Search | Enter: Select | Space: Fold | hjkl: Pan | +-: Zoom | t: Tree | b: Back | q: Quit"
    };

    let status_line = Line::from(vec![
        Span::styled(status_text, Style::default().fg(theme.status_bar_fg)),
        Span::raw(" | "),
        Span::styled(app.current_url().to_string(), Style::default().fg(theme.status_url)),
        Span::raw(" | "),
        Span::styled(help_text, Style::default().fg(theme.status_help_text)),
    ]);

    let paragraph = Paragraph::new(status_line).style(Style::default().bg(theme.status_bar_bg));
    frame.render_widget(paragraph, area);
}
