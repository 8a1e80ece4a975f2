use crate::location::{with_query_param, SharedHistory, SELECTED_NODE_PARAM};
use crate::observer::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    NoSelection,
    Selected(String),
}

/// Sole owner of "which node is selected" and sole writer of the
/// `selected_node_id` URL parameter.
///
/// The URL is read exactly once, at mount. After that every write goes from
/// the controller to the URL, never back, and each write replaces the current
/// history entry instead of pushing a new one.
#[derive(Debug)]
pub struct SelectionController {
    state: SelectionState,
    history: SharedHistory,
    notifier: Notifier,
}

impl SelectionController {
    pub fn mount(history: SharedHistory) -> Self {
        let state = match history.borrow().param(SELECTED_NODE_PARAM) {
            Some(id) => SelectionState::Selected(id),
            None => SelectionState::NoSelection,
        };
        log::debug!("selection: mounted with {:?}", state);
        Self {
            state,
            history,
            notifier: Notifier::new(),
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn selected_id(&self) -> Option<&str> {
        match &self.state {
            SelectionState::Selected(id) => Some(id),
            SelectionState::NoSelection => None,
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_id() == Some(id)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Select `id`. Selecting the current id again still rewrites the URL
    /// entry but is otherwise a no-op. Returns whether the state changed.
    pub fn select(&mut self, id: &str) -> bool {
        if id.is_empty() {
            log::warn!("selection: ignoring empty node id");
            return false;
        }
        self.write_url(Some(id));

        if self.is_selected(id) {
            return false;
        }
        self.state = SelectionState::Selected(id.to_string());
        self.notifier.notify();
        true
    }

    pub fn clear(&mut self) -> bool {
        if self.state == SelectionState::NoSelection {
            return false;
        }
        self.write_url(None);
        self.state = SelectionState::NoSelection;
        self.notifier.notify();
        true
    }

    fn write_url(&self, id: Option<&str>) {
        let mut history = self.history.borrow_mut();
        let next = with_query_param(history.current(), SELECTED_NODE_PARAM, id);
        history.replace(next);
    }
}
