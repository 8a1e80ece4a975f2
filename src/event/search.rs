use crossterm::event::KeyCode;

use crate::app::App;
use crate::error::Result;

/// Keys while the search surface is open. Every printable key edits the
/// query, including the ones bound to diagram actions.
pub fn handle_search_key(app: &mut App, key: KeyCode) -> Result<bool> {
    let changed = match key {
        KeyCode::Esc => app.close_search(),
        KeyCode::Enter => app.choose_search_result().is_some(),
        KeyCode::Up => app.search.move_highlight(-1),
        KeyCode::Down => app.search.move_highlight(1),
        KeyCode::Backspace => app.search.backspace(),
        KeyCode::Char(c) => app.search.push_char(c),
        _ => false,
    };
    Ok(changed)
}
