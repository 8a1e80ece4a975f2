//! Search-as-you-type.
//!
//! Every non-empty input issues a lookup stamped with a fresh token; only a
//! response carrying the latest token (for the query still in the box) is
//! ever shown. Nothing is aborted: superseded responses simply land and are
//! dropped.

use lazy_static::lazy_static;
use tokio::sync::mpsc;

use crate::async_task::Task;
use crate::error::FetchError;
use crate::observer::Notifier;
use crate::selection::SelectionController;
use crate::source::SearchCandidate;

/// One row in the search surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    pub id: String,
    pub label: String,
    pub category: Option<String>,
}

impl From<&SearchCandidate> for SearchItem {
    fn from(candidate: &SearchCandidate) -> Self {
        Self {
            id: candidate.id.clone(),
            label: candidate.label(),
            category: candidate.other_names.clone().filter(|s| !s.is_empty()),
        }
    }
}

fn suggestion(id: &str, label: &str, category: &str) -> SearchItem {
    SearchItem {
        id: id.to_string(),
        label: label.to_string(),
        category: Some(category.to_string()),
    }
}

lazy_static! {
    /// Shown whenever the query is empty; never fetched.
    pub static ref SUGGESTIONS: Vec<SearchItem> = vec![
        suggestion("579b68753431084e0fdc5430", "Homininae", "Great apes and humans"),
        suggestion("587eb692edafd34956b1dd1a", "Archosauria", "Dinosaurs, birds and crocodiles"),
        suggestion("57a8baf1343108933d3a8f36", "Felidae", "Cats"),
        suggestion("5878ebea365f536a716e2311", "Canidae", "Dogs"),
        suggestion("57af13b0343108290570722c", "Ursidae", "Bears"),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultSet {
    query: String,
    items: Vec<SearchItem>,
}

/// What the search surface should show right now
#[derive(Debug, Clone, PartialEq)]
pub enum SearchDisplay<'a> {
    Suggestions(&'a [SearchItem]),
    Loading,
    NoResults(&'a str),
    Failed(&'a FetchError),
    Results(&'a [SearchItem]),
}

#[derive(Debug)]
pub struct SearchController {
    open: bool,
    query: String,
    result_set: Option<ResultSet>,
    error: Option<(String, FetchError)>,
    issued_tokens: u64,
    last_token: u64,
    highlighted: usize,
    tasks: mpsc::Sender<Task>,
    notifier: Notifier,
}

impl SearchController {
    pub fn new(tasks: mpsc::Sender<Task>) -> Self {
        Self {
            open: false,
            query: String::new(),
            result_set: None,
            error: None,
            issued_tokens: 0,
            last_token: 0,
            highlighted: 0,
            tasks,
            notifier: Notifier::new(),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn last_token(&self) -> u64 {
        self.last_token
    }

    pub fn open(&mut self) -> bool {
        if self.open {
            return false;
        }
        self.open = true;
        self.highlighted = 0;
        self.notifier.notify();
        true
    }

    /// Close the surface and start clean next time. Lookups still in flight
    /// are left to finish but can no longer affect what is shown.
    pub fn close(&mut self) -> bool {
        if !self.open && self.query.is_empty() {
            return false;
        }
        self.open = false;
        self.query.clear();
        self.result_set = None;
        self.error = None;
        self.highlighted = 0;
        self.last_token = self.next_token();
        self.notifier.notify();
        true
    }

    /// The input changed. The query updates immediately; a lookup is issued
    /// unless the query is empty.
    pub fn set_query(&mut self, query: &str) -> bool {
        if query == self.query {
            return false;
        }
        self.query = query.to_string();
        self.highlighted = 0;

        if !self.query.is_empty() {
            let token = self.next_token();
            self.last_token = token;
            self.error = None;
            let task = Task::Search {
                query: self.query.clone(),
                token,
            };
            log::debug!("search: issuing #{} for {:?}", token, self.query);
            if let Err(e) = self.tasks.try_send(task) {
                log::error!("search: failed to queue lookup: {}", e);
                self.error = Some((
                    self.query.clone(),
                    FetchError::transport(format!("request queue unavailable: {}", e)),
                ));
            }
        }
        self.notifier.notify();
        true
    }

    pub fn push_char(&mut self, c: char) -> bool {
        let mut query = self.query.clone();
        query.push(c);
        self.set_query(&query)
    }

    pub fn backspace(&mut self) -> bool {
        let mut query = self.query.clone();
        if query.pop().is_none() {
            return false;
        }
        self.set_query(&query)
    }

    /// Apply a lookup response. Anything but the latest token for the
    /// current query is discarded silently.
    pub fn apply_response(
        &mut self,
        token: u64,
        query: &str,
        result: Result<Vec<SearchCandidate>, FetchError>,
    ) -> bool {
        if token != self.last_token || query != self.query {
            log::debug!(
                "search: dropping stale response #{} for {:?} (latest #{})",
                token,
                query,
                self.last_token
            );
            return false;
        }

        match result {
            Ok(candidates) => {
                self.result_set = Some(ResultSet {
                    query: query.to_string(),
                    items: candidates.iter().map(SearchItem::from).collect(),
                });
                self.error = None;
            }
            Err(e) if e.is_not_found() => {
                self.result_set = Some(ResultSet {
                    query: query.to_string(),
                    items: Vec::new(),
                });
                self.error = None;
            }
            Err(e) => {
                log::warn!("search: lookup for {:?} failed: {}", query, e);
                self.error = Some((query.to_string(), e));
            }
        }
        self.highlighted = 0;
        self.notifier.notify();
        true
    }

    pub fn display(&self) -> SearchDisplay<'_> {
        if self.query.is_empty() {
            return SearchDisplay::Suggestions(SUGGESTIONS.as_slice());
        }
        if let Some((query, error)) = &self.error {
            if *query == self.query {
                return SearchDisplay::Failed(error);
            }
        }
        match &self.result_set {
            Some(set) if set.query == self.query => {
                if set.items.is_empty() {
                    SearchDisplay::NoResults(&self.query)
                } else {
                    SearchDisplay::Results(&set.items)
                }
            }
            _ => SearchDisplay::Loading,
        }
    }

    /// Items that can be highlighted and chosen
    pub fn visible_items(&self) -> &[SearchItem] {
        match self.display() {
            SearchDisplay::Suggestions(items) | SearchDisplay::Results(items) => items,
            _ => &[],
        }
    }

    pub fn highlighted(&self) -> usize {
        self.highlighted
    }

    pub fn move_highlight(&mut self, delta: isize) -> bool {
        let len = self.visible_items().len();
        if len == 0 {
            return false;
        }
        let next = (self.highlighted as isize + delta).clamp(0, len as isize - 1) as usize;
        if next == self.highlighted {
            return false;
        }
        self.highlighted = next;
        self.notifier.notify();
        true
    }

    pub fn highlighted_item(&self) -> Option<&SearchItem> {
        self.visible_items().get(self.highlighted)
    }

    /// Pick the highlighted item: select it and close the surface.
    pub fn choose(&mut self, selection: &mut SelectionController) -> Option<String> {
        let id = self.highlighted_item()?.id.clone();
        selection.select(&id);
        self.close();
        Some(id)
    }

    fn next_token(&mut self) -> u64 {
        self.issued_tokens += 1;
        self.issued_tokens
    }
}
