//! Commit watermark over out-of-order record completions.
//!
//! Workers finish in whatever order the network allows, but the durable
//! cursor must never pass a record that was not accepted: on resume,
//! everything at or after the cursor is re-processed, so overshooting a
//! failed record would silently drop it. The tracker therefore advances the
//! watermark only across a contiguous run of accepted indices, and the
//! first terminal failure pins it for the rest of the run. Accepted
//! completions beyond a pinned failure still count for the run's stats;
//! they are simply re-sent (idempotently) after a resume.

use std::collections::BTreeMap;

#[derive(Debug)]
pub struct CursorTracker {
    /// Next index the durable cursor would name; everything below it was
    /// accepted.
    next: usize,
    /// Terminal outcomes at or above `next` (true = accepted).
    outcomes: BTreeMap<usize, bool>,
    /// Set once a failure reaches the watermark; the cursor stays put
    /// afterwards.
    pinned: bool,
}

impl CursorTracker {
    /// Start tracking at the persisted cursor position.
    pub fn new(start: usize) -> Self {
        Self {
            next: start,
            outcomes: BTreeMap::new(),
            pinned: false,
        }
    }

    /// Record a terminal outcome for `index`. Returns the new cursor value
    /// when the watermark moved, `None` otherwise.
    pub fn complete(&mut self, index: usize, accepted: bool) -> Option<usize> {
        self.outcomes.insert(index, accepted);
        if self.pinned {
            return None;
        }

        let before = self.next;
        while let Some(&accepted) = self.outcomes.get(&self.next) {
            if !accepted {
                self.pinned = true;
                break;
            }
            self.outcomes.remove(&self.next);
            self.next += 1;
        }
        (self.next > before).then_some(self.next)
    }

    /// Current watermark: the cursor value that is (or may be) persisted.
    pub fn position(&self) -> usize {
        self.next
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}
