//! Change notification for controllers.
//!
//! Each controller owns a [`Notifier`] and bumps it whenever its observable
//! state changes. The view subscribes to all of them through a [`ChangeSet`]
//! and re-derives its output when any revision moved.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Notifier {
    revision: watch::Sender<u64>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { revision }
    }

    pub fn notify(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

/// A bundle of subscriptions the view polls once per loop iteration.
#[derive(Debug, Default)]
pub struct ChangeSet {
    receivers: Vec<watch::Receiver<u64>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, notifier: &Notifier) {
        self.receivers.push(notifier.subscribe());
    }

    pub fn clear(&mut self) {
        self.receivers.clear();
    }

    /// Returns true if any watched notifier fired since the last call, and
    /// marks everything as seen.
    pub fn take_changed(&mut self) -> bool {
        let mut changed = false;
        for rx in &mut self.receivers {
            if rx.has_changed().unwrap_or(false) {
                changed = true;
                rx.borrow_and_update();
            }
        }
        changed
    }
}
