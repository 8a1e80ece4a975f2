//! The shareable location of the view: a URL carrying `node_id` (which root
//! fragment is shown) and `selected_node_id` (which detail panel is open),
//! kept in an in-memory browser-style history.

use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

use crate::error::Result;

pub const NODE_ID_PARAM: &str = "node_id";
pub const SELECTED_NODE_PARAM: &str = "selected_node_id";

pub const DEFAULT_LOCATION: &str = "https://clades.local/tree";

pub type SharedHistory = Rc<RefCell<BrowserHistory>>;

/// Parse a user supplied location. A bare query string such as
/// `?node_id=abc` is resolved against the default tree page.
pub fn parse_location(input: &str) -> Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Url::parse(DEFAULT_LOCATION)?);
    }
    match Url::parse(input) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(DEFAULT_LOCATION)?;
            Ok(base.join(input)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// First non-empty value of `key` in the query string.
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Copy of `url` with `key` set to `value` (or removed when `None`). Other
/// parameters keep their order; an existing key is replaced where it stands.
pub fn with_query_param(url: &Url, key: &str, value: Option<&str>) -> Url {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut replaced = false;
    for (k, v) in url.query_pairs() {
        if k == key {
            if let (Some(value), false) = (value, replaced) {
                pairs.push((k.into_owned(), value.to_string()));
                replaced = true;
            }
        } else {
            pairs.push((k.into_owned(), v.into_owned()));
        }
    }
    if let (Some(value), false) = (value, replaced) {
        pairs.push((key.to_string(), value.to_string()));
    }

    let mut next = url.clone();
    if pairs.is_empty() {
        next.set_query(None);
    } else {
        next.query_pairs_mut().clear().extend_pairs(pairs);
    }
    next
}

/// Browser-style session history. `replace` rewrites the current entry in
/// place; only `push` creates a new entry the user can go back to.
#[derive(Debug, Clone)]
pub struct BrowserHistory {
    entries: Vec<Url>,
    index: usize,
}

impl BrowserHistory {
    pub fn new(initial: Url) -> Self {
        Self {
            entries: vec![initial],
            index: 0,
        }
    }

    pub fn shared(initial: Url) -> SharedHistory {
        Rc::new(RefCell::new(Self::new(initial)))
    }

    pub fn current(&self) -> &Url {
        &self.entries[self.index]
    }

    pub fn replace(&mut self, url: Url) {
        log::debug!("history: replace {}", url);
        self.entries[self.index] = url;
    }

    /// Push a new entry, discarding any forward entries.
    pub fn push(&mut self, url: Url) {
        log::debug!("history: push {}", url);
        self.entries.truncate(self.index + 1);
        self.entries.push(url);
        self.index += 1;
    }

    pub fn back(&mut self) -> Option<&Url> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(&self.entries[self.index])
    }

    pub fn can_go_back(&self) -> bool {
        self.index > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn param(&self, key: &str) -> Option<String> {
        query_param(self.current(), key)
    }
}
