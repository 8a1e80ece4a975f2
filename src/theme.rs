use ratatui::style::Color;

/// All colors used by the diagram, panels and dialogs
#[derive(Debug, Clone)]
pub struct Theme {
    // Diagram
    pub edge: Color,
    pub node_marker: Color,
    pub node_label: Color,
    pub node_extinct: Color,
    pub node_selected_bg: Color,
    pub node_selected_fg: Color,
    pub node_focus_fg: Color,

    // Side panel
    pub panel_border: Color,
    pub panel_title: Color,
    pub panel_heading: Color,
    pub panel_muted: Color,
    pub panel_error: Color,

    // Search dialog
    pub search_border: Color,
    pub search_input: Color,
    pub search_group_label: Color,
    pub search_highlight_bg: Color,
    pub search_highlight_fg: Color,
    pub search_category: Color,

    // Status bar
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_url: Color,
    pub status_help_text: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            // Diagram
            edge: Color::DarkGray,
            node_marker: Color::Cyan,
            node_label: Color::Reset,
            node_extinct: Color::Gray,
            node_selected_bg: Color::Yellow,
            node_selected_fg: Color::Black,
            node_focus_fg: Color::Yellow,

            // Side panel
            panel_border: Color::Yellow,
            panel_title: Color::White,
            panel_heading: Color::Cyan,
            panel_muted: Color::Gray,
            panel_error: Color::Red,

            // Search dialog
            search_border: Color::Cyan,
            search_input: Color::White,
            search_group_label: Color::Gray,
            search_highlight_bg: Color::White,
            search_highlight_fg: Color::Black,
            search_category: Color::DarkGray,

            // Status bar
            status_bar_bg: Color::DarkGray,
            status_bar_fg: Color::White,
            status_url: Color::Cyan,
            status_help_text: Color::Gray,
        }
    }
}

/// Get the current theme
pub fn get_theme() -> Theme {
    Theme::default()
}
