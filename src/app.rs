use ratatui::layout::{Rect, Size};
use std::collections::HashSet;
use tokio::sync::mpsc;
use url::Url;

use crate::async_task::Task;
use crate::config::Config;
use crate::detail::{DetailCache, DetailEntry};
use crate::error::FetchError;
use crate::layout::{initial_collapsed, DiagramLayout, LayoutEngine, Point};
use crate::location::{with_query_param, BrowserHistory, SharedHistory, NODE_ID_PARAM, SELECTED_NODE_PARAM};
use crate::observer::ChangeSet;
use crate::search::SearchController;
use crate::selection::SelectionController;
use crate::theme::{get_theme, Theme};
use crate::tree::{Node, TreeFragment};
use crate::ui::screen_layout;

/// Terminal size assumed until the first draw reports the real one
const DEFAULT_COLS: u16 = 120;
const DEFAULT_ROWS: u16 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMove {
    Previous,
    Next,
    Parent,
    FirstChild,
}

#[derive(Debug, Clone)]
pub struct UiState {
    pub status_message: String,
    pub is_loading: bool,
    pub should_quit: bool,
    pub force_redraw: bool,
    /// View-local state changed outside the controllers
    pub dirty: bool,
    /// Whole terminal area, as of the last frame
    pub frame: Rect,
    /// Diagram area in cells, as of the last resize
    pub cols: u16,
    pub rows: u16,
    /// Cell where the current mouse drag was last seen
    pub drag_from: Option<(u16, u16)>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            status_message: "Ready".to_string(),
            is_loading: false,
            should_quit: false,
            force_redraw: false,
            dirty: true,
            frame: Rect::new(0, 0, DEFAULT_COLS, DEFAULT_ROWS),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            drag_from: None,
        }
    }
}

/// Composition root: one diagram, one side panel, one search surface.
///
/// Controllers own their state; the app only routes events between them and
/// keeps view-local state (collapse set, keyboard focus, status line).
pub struct App {
    pub config: Config,
    pub theme: Theme,
    pub ui: UiState,

    pub history: SharedHistory,
    pub fragment: Option<TreeFragment>,
    pub fragment_error: Option<FetchError>,
    pub diagram: DiagramLayout,
    pub collapsed: HashSet<String>,
    pub focus: Option<String>,

    pub layout: LayoutEngine,
    pub selection: SelectionController,
    pub details: DetailCache,
    pub search: SearchController,

    tasks: mpsc::Sender<Task>,
    tree_request: u64,
    changes: ChangeSet,
}

impl App {
    pub fn new(location: Url, config: Config, tasks: mpsc::Sender<Task>) -> Self {
        let history = BrowserHistory::shared(location);
        let (width, height) = config.display.cell.container_px(DEFAULT_COLS, DEFAULT_ROWS);
        let mut app = Self {
            theme: get_theme(),
            ui: UiState::default(),
            fragment: None,
            fragment_error: None,
            diagram: DiagramLayout::default(),
            collapsed: HashSet::new(),
            focus: None,
            layout: LayoutEngine::new(width, height),
            selection: SelectionController::mount(history.clone()),
            details: DetailCache::new(tasks.clone()),
            search: SearchController::new(tasks.clone()),
            history,
            config,
            tasks,
            tree_request: 0,
            changes: ChangeSet::new(),
        };
        app.watch_controllers();
        app.fetch_selected_detail();
        app
    }

    fn watch_controllers(&mut self) {
        self.changes.clear();
        self.changes.watch(self.layout.notifier());
        self.changes.watch(self.selection.notifier());
        self.changes.watch(self.details.notifier());
        self.changes.watch(self.search.notifier());
    }

    /// True when something visible changed since the last call.
    pub fn take_needs_redraw(&mut self) -> bool {
        let controllers = self.changes.take_changed();
        let local = std::mem::take(&mut self.ui.dirty);
        controllers || local
    }

    pub fn current_url(&self) -> Url {
        self.history.borrow().current().clone()
    }

    pub fn root_param(&self) -> Option<String> {
        self.history.borrow().param(NODE_ID_PARAM)
    }

    /// Request the fragment named by the current URL. Any fragment request
    /// still in flight becomes stale.
    pub fn load_current_root(&mut self) {
        self.tree_request += 1;
        let root = self.root_param();
        let task = Task::LoadTree {
            root: root.clone(),
            request: self.tree_request,
        };
        match self.tasks.try_send(task) {
            Ok(()) => {
                self.ui.is_loading = true;
                self.ui.status_message = match &root {
                    Some(id) => format!("Loading tree at {}...", id),
                    None => "Loading tree...".to_string(),
                };
            }
            Err(e) => {
                log::error!("app: failed to queue tree load: {}", e);
                self.ui.status_message = format!("Failed to load tree: {}", e);
            }
        }
        self.ui.dirty = true;
    }

    /// Apply a fragment response. Returns false for superseded requests.
    pub fn apply_fragment(&mut self, request: u64, result: Result<Node, FetchError>) -> bool {
        if request != self.tree_request {
            log::debug!("app: ignoring stale tree response #{}", request);
            return false;
        }
        self.ui.is_loading = false;
        self.ui.dirty = true;

        match result.and_then(TreeFragment::new) {
            Ok(fragment) => {
                let stats = fragment.stats();
                self.ui.status_message = format!(
                    "Loaded {} ({} nodes)",
                    fragment.root().display_name(),
                    stats.total_nodes
                );
                self.mount(fragment);
            }
            Err(e) => {
                log::warn!("app: tree fragment unavailable: {}", e);
                self.ui.status_message = if e.is_not_found() {
                    "Tree not found".to_string()
                } else {
                    format!("Tree unavailable: {}", e)
                };
                self.fragment = None;
                self.fragment_error = Some(e);
                self.diagram = DiagramLayout::default();
                self.focus = None;
            }
        }
        true
    }

    /// A new fragment replaces the old one and the view starts over from the
    /// URL: selection re-seeded, manual pan/zoom forgotten.
    fn mount(&mut self, fragment: TreeFragment) {
        self.collapsed = initial_collapsed(&fragment, self.config.display.initial_depth);
        self.remount_selection();
        self.layout.reset_for_new_fragment();

        self.focus = match self.selection.selected_id() {
            Some(id) if fragment.contains(id) => Some(id.to_string()),
            _ => Some(fragment.root_id().to_string()),
        };
        if let Some(id) = self.selection.selected_id().map(str::to_string) {
            self.reveal(&fragment, &id);
        }
        self.fragment = Some(fragment);
        self.fragment_error = None;
        self.rebuild_diagram();
        self.fetch_selected_detail();
    }

    /// Seed a fresh selection from the current history entry.
    fn remount_selection(&mut self) {
        self.selection = SelectionController::mount(self.history.clone());
        self.watch_controllers();
        self.ui.dirty = true;
    }

    /// Expand every collapsed ancestor of `id`.
    fn reveal(&mut self, fragment: &TreeFragment, id: &str) {
        let mut current = fragment.parent_of(id);
        while let Some(parent) = current {
            self.collapsed.remove(&parent.id);
            current = fragment.parent_of(&parent.id);
        }
    }

    pub fn rebuild_diagram(&mut self) {
        self.diagram = match &self.fragment {
            Some(fragment) => DiagramLayout::place(fragment, &self.collapsed, self.layout.geometry()),
            None => DiagramLayout::default(),
        };
        if let Some(focus) = &self.focus {
            if self.diagram.index_of(focus).is_none() {
                self.focus = self.diagram.nodes.first().map(|n| n.id.clone());
            }
        }
        self.ui.dirty = true;
    }

    fn fetch_selected_detail(&mut self) {
        if let Some(id) = self.selection.selected_id().map(str::to_string) {
            self.details.get(&id);
        }
    }

    /// The user picked a node in the diagram.
    pub fn click_node(&mut self, id: &str) {
        self.selection.select(id);
        self.details.retry(id);
        self.details.get(id);
        if self.diagram.index_of(id).is_some() {
            self.focus = Some(id.to_string());
            self.ui.dirty = true;
        }
    }

    /// Click at a cell of the diagram area.
    pub fn click_cell(&mut self, col: u16, row: u16) -> bool {
        let hit = self
            .diagram
            .hit_test(self.layout.geometry(), self.config.display.cell, col as i64, row as i64)
            .map(|node| node.id.clone());
        match hit {
            Some(id) => {
                self.click_node(&id);
                true
            }
            None => false,
        }
    }

    pub fn close_panel(&mut self) -> bool {
        self.selection.clear()
    }

    pub fn selected_detail(&self) -> Option<(&str, &DetailEntry)> {
        let id = self.selection.selected_id()?;
        Some((id, self.details.peek(id)))
    }

    pub fn open_search(&mut self) -> bool {
        self.search.open()
    }

    pub fn close_search(&mut self) -> bool {
        self.search.close()
    }

    pub fn choose_search_result(&mut self) -> Option<String> {
        let id = self.search.choose(&mut self.selection)?;
        self.details.retry(&id);
        self.details.get(&id);
        if let Some(fragment) = self.fragment.take() {
            if fragment.contains(&id) {
                self.reveal(&fragment, &id);
                self.focus = Some(id.clone());
            }
            self.fragment = Some(fragment);
            self.rebuild_diagram();
        }
        self.ui.status_message = format!("Selected {}", id);
        Some(id)
    }

    /// Show the tree rooted at `id` as a new history entry.
    pub fn navigate_to_root(&mut self, id: &str) {
        let next = {
            let history = self.history.borrow();
            let rooted = with_query_param(history.current(), NODE_ID_PARAM, Some(id));
            with_query_param(&rooted, SELECTED_NODE_PARAM, None)
        };
        self.history.borrow_mut().push(next);
        self.remount_selection();
        self.load_current_root();
    }

    pub fn reroot_at_selection(&mut self) -> bool {
        match self.selection.selected_id().map(str::to_string) {
            Some(id) => {
                self.navigate_to_root(&id);
                true
            }
            None => {
                self.ui.status_message = "Select a node first".to_string();
                self.ui.dirty = true;
                false
            }
        }
    }

    pub fn go_back(&mut self) -> bool {
        let moved = self.history.borrow_mut().back().is_some();
        if moved {
            self.remount_selection();
            self.fetch_selected_detail();
            self.load_current_root();
        } else {
            self.ui.status_message = "No earlier tree".to_string();
            self.ui.dirty = true;
        }
        moved
    }

    /// Record the terminal size and resize the diagram to what the status bar
    /// leaves of it. The side panel floats over the diagram and never counts.
    pub fn set_frame(&mut self, frame: Rect) {
        if frame != self.ui.frame {
            self.ui.frame = frame;
            self.ui.dirty = true;
        }
        let areas = screen_layout(frame, self);
        self.resize(areas.diagram.width, areas.diagram.height);
    }

    /// Size reported by the terminal backend; the frame always starts at the
    /// top-left corner.
    pub fn set_terminal_size(&mut self, size: Size) {
        self.set_frame(Rect::new(0, 0, size.width, size.height));
    }

    /// Terminal area available to the diagram changed.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.ui.cols = cols;
        self.ui.rows = rows;
        let (width, height) = self.config.display.cell.container_px(cols, rows);
        if self.layout.on_resize(width, height) {
            self.rebuild_diagram();
        }
    }

    pub fn pan_cells(&mut self, dcols: i32, drows: i32) {
        let cell = self.config.display.cell;
        self.layout.pan(dcols as f64 * cell.width_px, drows as f64 * cell.height_px);
    }

    pub fn zoom(&mut self, factor: f64) {
        self.layout.zoom_by(factor);
    }

    pub fn zoom_at_cell(&mut self, factor: f64, col: u16, row: u16) {
        let anchor: Point = self.config.display.cell.cell_center(col, row);
        self.layout.zoom_at(factor, anchor);
    }

    pub fn reset_view(&mut self) {
        self.layout.reset_for_new_fragment();
        self.rebuild_diagram();
    }

    pub fn toggle_collapse(&mut self, id: &str) -> bool {
        let Some(node) = self.fragment.as_ref().and_then(|f| f.find_node(id)) else {
            return false;
        };
        if !node.has_children() {
            return false;
        }
        if !self.collapsed.remove(id) {
            self.collapsed.insert(id.to_string());
        }
        self.rebuild_diagram();
        true
    }

    pub fn move_focus(&mut self, movement: FocusMove) -> bool {
        let nodes = &self.diagram.nodes;
        if nodes.is_empty() {
            return false;
        }
        let current = self
            .focus
            .as_deref()
            .and_then(|id| self.diagram.index_of(id))
            .unwrap_or(0);

        let target = match movement {
            FocusMove::Previous => current.checked_sub(1),
            FocusMove::Next => Some(current + 1).filter(|&i| i < nodes.len()),
            FocusMove::Parent => nodes[current].parent,
            FocusMove::FirstChild => {
                if nodes[current].collapsed {
                    let id = nodes[current].id.clone();
                    self.toggle_collapse(&id);
                    return true;
                }
                nodes[current].children.first().copied()
            }
        };

        match target {
            Some(index) => {
                self.focus = Some(self.diagram.nodes[index].id.clone());
                self.ui.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn select_focused(&mut self) -> bool {
        match self.focus.clone() {
            Some(id) => {
                self.click_node(&id);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::parse_location;
    use crate::tree::tests::sample_root;
    use assert_matches::assert_matches;

    fn app_at(location: &str) -> (App, mpsc::Receiver<Task>) {
        let (tx, rx) = mpsc::channel(32);
        let app = App::new(parse_location(location).unwrap(), Config::default(), tx);
        (app, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Task>) -> Vec<Task> {
        let mut tasks = Vec::new();
        while let Ok(task) = rx.try_recv() {
            tasks.push(task);
        }
        tasks
    }

    fn loaded(location: &str) -> (App, mpsc::Receiver<Task>) {
        let (mut app, mut rx) = app_at(location);
        app.load_current_root();
        let request = drain(&mut rx)
            .into_iter()
            .find_map(|t| match t {
                Task::LoadTree { request, .. } => Some(request),
                _ => None,
            })
            .unwrap();
        app.apply_fragment(request, Ok(sample_root()));
        drain(&mut rx);
        (app, rx)
    }

    #[test]
    fn test_seeded_selection_fetches_detail_immediately() {
        let (app, mut rx) = app_at("?selected_node_id=felidae");
        assert_eq!(app.selection.selected_id(), Some("felidae"));
        let tasks = drain(&mut rx);
        assert_matches!(&tasks[..], [Task::FetchDetail { id, .. }] if id == "felidae");
        assert_matches!(app.selected_detail(), Some(("felidae", DetailEntry::Pending)));
    }

    #[test]
    fn test_mount_collapses_and_reveals_selection() {
        let (app, _rx) = loaded("?selected_node_id=felidae");
        // mammalia starts collapsed at depth 2 but holds the selection
        assert!(!app.collapsed.contains("mammalia"));
        assert!(app.diagram.get("felidae").is_some());
        assert_eq!(app.focus.as_deref(), Some("felidae"));
    }

    #[test]
    fn test_click_close_keeps_cache() {
        let (mut app, mut rx) = loaded("");
        app.click_node("aves");
        let tasks = drain(&mut rx);
        assert_eq!(tasks.len(), 1);

        assert!(app.close_panel());
        assert!(app.selected_detail().is_none());
        assert_eq!(app.details.peek("aves"), &DetailEntry::Pending);
        assert_eq!(app.history.borrow().param(SELECTED_NODE_PARAM), None);
    }

    #[test]
    fn test_stale_fragment_ignored() {
        let (mut app, mut rx) = app_at("");
        app.load_current_root();
        app.load_current_root();
        let requests: Vec<u64> = drain(&mut rx)
            .into_iter()
            .filter_map(|t| match t {
                Task::LoadTree { request, .. } => Some(request),
                _ => None,
            })
            .collect();
        assert!(!app.apply_fragment(requests[0], Ok(Node::new("old", "Old"))));
        assert!(app.fragment.is_none());
        assert!(app.apply_fragment(requests[1], Ok(sample_root())));
        assert_eq!(app.fragment.as_ref().unwrap().root_id(), "amniota");
    }

    #[test]
    fn test_failed_fragment_renders_nothing() {
        let (mut app, mut rx) = app_at("?node_id=missing");
        app.load_current_root();
        drain(&mut rx);
        app.apply_fragment(1, Err(FetchError::NotFound));
        assert!(app.fragment.is_none());
        assert!(app.diagram.nodes.is_empty());
        assert_eq!(app.ui.status_message, "Tree not found");
    }

    #[test]
    fn test_navigate_to_root_pushes_and_back_returns() {
        let (mut app, mut rx) = loaded("?node_id=amniota&selected_node_id=mammalia");
        app.navigate_to_root("mammalia");
        {
            let history = app.history.borrow();
            assert_eq!(history.len(), 2);
            assert_eq!(history.param(NODE_ID_PARAM).as_deref(), Some("mammalia"));
            assert_eq!(history.param(SELECTED_NODE_PARAM), None);
        }
        assert_matches!(&drain(&mut rx)[..], [Task::LoadTree { root: Some(r), .. }] if r == "mammalia");

        assert!(app.go_back());
        assert_eq!(app.root_param().as_deref(), Some("amniota"));
        assert!(!app.go_back());
    }

    #[test]
    fn test_reroot_clears_selection_even_if_fragment_fails() {
        let (mut app, mut rx) = loaded("");
        app.click_node("aves");
        assert!(app.reroot_at_selection());
        assert_eq!(app.selection.selected_id(), None);

        let request = drain(&mut rx)
            .into_iter()
            .find_map(|t| match t {
                Task::LoadTree { request, .. } => Some(request),
                _ => None,
            })
            .unwrap();
        app.apply_fragment(request, Err(FetchError::transport("connection refused")));

        assert_eq!(app.selection.state(), &crate::selection::SelectionState::NoSelection);
        assert_eq!(app.history.borrow().param(SELECTED_NODE_PARAM), None);
        assert!(app.selected_detail().is_none());
        assert_eq!(app.root_param().as_deref(), Some("aves"));
    }

    #[test]
    fn test_back_restores_selection_of_earlier_entry() {
        let (mut app, mut rx) = loaded("?selected_node_id=mammalia");
        app.navigate_to_root("mammalia");
        assert_eq!(app.selection.selected_id(), None);
        drain(&mut rx);

        assert!(app.go_back());
        assert_eq!(app.selection.selected_id(), Some("mammalia"));
        assert_eq!(app.history.borrow().param(SELECTED_NODE_PARAM).as_deref(), Some("mammalia"));
        assert!(drain(&mut rx)
            .iter()
            .any(|t| matches!(t, Task::LoadTree { root: None, .. })));
    }

    #[test]
    fn test_opening_panel_does_not_resize_diagram() {
        let (mut app, _rx) = loaded("");
        app.set_frame(Rect::new(0, 0, 120, 40));
        let before = *app.layout.geometry();

        app.click_node("aves");
        app.set_frame(Rect::new(0, 0, 120, 40));
        assert_eq!(app.layout.geometry(), &before);

        app.close_panel();
        app.set_frame(Rect::new(0, 0, 120, 40));
        assert_eq!(app.layout.geometry(), &before);
    }

    #[test]
    fn test_terminal_size_sets_frame_and_diagram() {
        let (mut app, _rx) = loaded("");
        app.set_terminal_size(Size::new(100, 30));
        assert_eq!(app.ui.frame, Rect::new(0, 0, 100, 30));
        assert_eq!((app.ui.cols, app.ui.rows), (100, 29));
        assert_eq!(app.layout.geometry().container_width, 800.0);
    }

    #[test]
    fn test_manual_view_survives_resize_until_new_fragment() {
        let (mut app, mut rx) = loaded("");
        app.pan_cells(5, 0);
        let translate = app.layout.geometry().translate;
        app.resize(70, 30);
        assert_eq!(app.layout.geometry().translate, translate);

        app.load_current_root();
        let request = match drain(&mut rx).pop() {
            Some(Task::LoadTree { request, .. }) => request,
            other => panic!("expected tree load, got {:?}", other),
        };
        app.apply_fragment(request, Ok(sample_root()));
        assert!(!app.layout.has_interacted());
        assert_eq!(app.layout.geometry().translate.x, 560.0 / 8.0);
    }

    #[test]
    fn test_focus_movement_and_toggle() {
        let (mut app, _rx) = loaded("");
        assert_eq!(app.focus.as_deref(), Some("amniota"));
        assert!(app.move_focus(FocusMove::FirstChild));
        assert_eq!(app.focus.as_deref(), Some("synapsida"));
        assert!(app.move_focus(FocusMove::FirstChild));
        assert_eq!(app.focus.as_deref(), Some("mammalia"));

        // mammalia is collapsed: first move expands it
        assert!(app.move_focus(FocusMove::FirstChild));
        assert!(app.diagram.get("felidae").is_some());
        assert!(app.move_focus(FocusMove::FirstChild));
        assert_eq!(app.focus.as_deref(), Some("felidae"));

        assert!(app.move_focus(FocusMove::Parent));
        assert_eq!(app.focus.as_deref(), Some("mammalia"));
        assert!(app.toggle_collapse("mammalia"));
        assert!(app.diagram.get("felidae").is_none());
        assert!(!app.toggle_collapse("aves"));
    }

    #[test]
    fn test_needs_redraw_tracks_controller_changes() {
        let (mut app, _rx) = loaded("");
        app.take_needs_redraw();
        assert!(!app.take_needs_redraw());
        app.open_search();
        assert!(app.take_needs_redraw());
        assert!(!app.take_needs_redraw());
        app.click_node("aves");
        assert!(app.take_needs_redraw());
    }
}
