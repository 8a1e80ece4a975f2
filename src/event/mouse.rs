use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use super::ZOOM_STEP;
use crate::app::App;
use crate::ui::{is_close_marker, screen_layout};

fn inside(area: Rect, col: u16, row: u16) -> bool {
    col >= area.x && col < area.right() && row >= area.y && row < area.bottom()
}

pub fn handle_mouse(app: &mut App, mouse: MouseEvent) -> bool {
    let areas = screen_layout(app.ui.frame, app);
    let (col, row) = (mouse.column, mouse.row);
    let diagram = areas.diagram;
    let in_panel = areas.panel.map_or(false, |panel| inside(panel, col, row));
    let in_diagram = inside(diagram, col, row) && !in_panel;

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if app.search.is_open() {
                return app.close_search();
            }
            if let Some(panel) = areas.panel {
                if is_close_marker(panel, col, row) {
                    return app.close_panel();
                }
            }
            if !in_diagram {
                return false;
            }
            app.ui.drag_from = Some((col, row));
            app.click_cell(col - diagram.x, row - diagram.y)
        }
        MouseEventKind::Drag(MouseButton::Left) => match app.ui.drag_from {
            Some((from_col, from_row)) => {
                app.pan_cells(col as i32 - from_col as i32, row as i32 - from_row as i32);
                app.ui.drag_from = Some((col, row));
                true
            }
            None => false,
        },
        MouseEventKind::Up(MouseButton::Left) => {
            app.ui.drag_from = None;
            false
        }
        MouseEventKind::ScrollUp if in_diagram && !app.search.is_open() => {
            app.zoom_at_cell(ZOOM_STEP, col - diagram.x, row - diagram.y);
            true
        }
        MouseEventKind::ScrollDown if in_diagram && !app.search.is_open() => {
            app.zoom_at_cell(1.0 / ZOOM_STEP, col - diagram.x, row - diagram.y);
            true
        }
        _ => false,
    }
}
