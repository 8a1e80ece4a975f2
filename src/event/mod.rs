use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::Rect;

use crate::app::App;
use crate::error::Result;

pub mod diagram;
pub mod mouse;
pub mod search;

pub use diagram::*;
pub use mouse::*;
pub use search::*;

/// Cells moved per pan keystroke
pub const PAN_COLS: i32 = 4;
pub const PAN_ROWS: i32 = 2;
/// Zoom factor per keystroke or wheel notch
pub const ZOOM_STEP: f64 = 1.2;

/// Returns true if the UI needs a redraw.
pub fn handle_event(event: Event, app: &mut App) -> Result<bool> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
        Event::Mouse(mouse) => Ok(handle_mouse(app, mouse)),
        Event::Resize(width, height) => {
            app.set_frame(Rect::new(0, 0, width, height));
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.ui.should_quit = true;
                return Ok(false);
            }
            KeyCode::Char('l') => {
                app.ui.force_redraw = true;
                app.ui.status_message = "Screen refreshed".to_string();
                return Ok(true);
            }
            KeyCode::Char('k') => return Ok(app.open_search()),
            _ => {}
        }
    }

    if app.search.is_open() {
        handle_search_key(app, key.code)
    } else {
        handle_diagram_key(app, key.code)
    }
}
