use crossterm::event::KeyCode;

use super::{PAN_COLS, PAN_ROWS, ZOOM_STEP};
use crate::app::{App, FocusMove};
use crate::error::Result;

/// Keys while the diagram has the keyboard.
pub fn handle_diagram_key(app: &mut App, key: KeyCode) -> Result<bool> {
    let keys = app.config.keys.clone();

    let changed = match key {
        KeyCode::Char(c) if c == keys.quit => {
            app.ui.should_quit = true;
            false
        }
        KeyCode::Char(c) if c == keys.search => app.open_search(),
        KeyCode::Char(c) if c == keys.reroot => app.reroot_at_selection(),
        KeyCode::Char(c) if c == keys.back => app.go_back(),
        KeyCode::Char(c) if c == keys.reset_view => {
            app.reset_view();
            true
        }
        KeyCode::Esc => {
            if app.close_panel() {
                true
            } else {
                app.ui.should_quit = true;
                false
            }
        }

        KeyCode::Up => app.move_focus(FocusMove::Previous),
        KeyCode::Down => app.move_focus(FocusMove::Next),
        KeyCode::Left => app.move_focus(FocusMove::Parent),
        KeyCode::Right => app.move_focus(FocusMove::FirstChild),
        KeyCode::Enter => app.select_focused(),
        KeyCode::Char(' ') => match app.focus.clone() {
            Some(id) => app.toggle_collapse(&id),
            None => false,
        },

        // hjkl move the viewport, so the drawing shifts the other way
        KeyCode::Char('h') => {
            app.pan_cells(PAN_COLS, 0);
            true
        }
        KeyCode::Char('l') => {
            app.pan_cells(-PAN_COLS, 0);
            true
        }
        KeyCode::Char('k') => {
            app.pan_cells(0, PAN_ROWS);
            true
        }
        KeyCode::Char('j') => {
            app.pan_cells(0, -PAN_ROWS);
            true
        }
        KeyCode::Char('+') | KeyCode::Char('=') => {
            app.zoom(ZOOM_STEP);
            true
        }
        KeyCode::Char('-') => {
            app.zoom(1.0 / ZOOM_STEP);
            true
        }
        _ => false,
    };

    Ok(changed)
}
