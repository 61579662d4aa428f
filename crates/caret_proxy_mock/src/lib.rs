//! Simulated hosts implementing the shared `caret_proxy` contract.
//!
//! The hosts here are deterministic and record every call they receive. They
//! model the behaviors a real host shows through its bounded caret window:
//! short windows, windows whose length changes between reads, separate text
//! segments that hide each other's content, hosts that never refresh their
//! windows, and documents that never end.

use caret_proxy::{split_chars, CaretWindowProxy};

/// One call received by a simulated host, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyCall {
    ReadBefore,
    ReadAfter,
    MoveCaret(isize),
    DeleteBackward,
    InsertText(String),
    UnmarkText,
}

impl ProxyCall {
    /// Returns true for calls that change document content.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::DeleteBackward | Self::InsertText(_))
    }
}

/// How the simulated host refreshes the windows it exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostBehavior {
    /// Windows always reflect the current caret position.
    #[default]
    Honest,
    /// Windows are captured once at the first read and never refreshed.
    Frozen,
    /// The document grows on demand, so the caret never reaches an end.
    Endless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    /// A caret sitting on a segment boundary belongs to the segment after it.
    Following,
    /// A caret sitting on a segment boundary belongs to the segment before it.
    Preceding,
}

const ENDLESS_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// In-memory document reachable only through a bounded caret window.
///
/// Segment boundaries split the document into regions the host never exposes
/// together. A caret resting exactly on a boundary belongs to the segment it
/// arrived from, so a window read after a rightward sweep shows nothing after
/// the caret and a read after a leftward sweep shows nothing before it.
#[derive(Debug, Clone)]
pub struct SimulatedHost {
    chars: Vec<String>,
    caret: usize,
    before_limit: usize,
    after_limit: usize,
    window_cycle: Vec<usize>,
    cycle_index: usize,
    boundaries: Vec<usize>,
    affinity: Affinity,
    behavior: HostBehavior,
    frozen: Option<(String, String)>,
    calls: Vec<ProxyCall>,
}

impl SimulatedHost {
    /// Creates a host holding `text` with the caret at the end and 50-character windows.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let chars = split_chars(text);
        let caret = chars.len();

        Self {
            chars,
            caret,
            before_limit: Self::DEFAULT_WINDOW,
            after_limit: Self::DEFAULT_WINDOW,
            window_cycle: Vec::new(),
            cycle_index: 0,
            boundaries: Vec::new(),
            affinity: Affinity::Following,
            behavior: HostBehavior::Honest,
            frozen: None,
            calls: Vec::new(),
        }
    }

    const DEFAULT_WINDOW: usize = 50;

    /// Places the caret at `position`, clamped to the document.
    #[must_use]
    pub fn with_caret(mut self, position: usize) -> Self {
        self.caret = position.min(self.chars.len());
        self
    }

    /// Uses the same window limit on both sides of the caret.
    #[must_use]
    pub fn with_window_limit(self, limit: usize) -> Self {
        self.with_window_limits(limit, limit)
    }

    #[must_use]
    pub fn with_window_limits(mut self, before: usize, after: usize) -> Self {
        self.before_limit = before;
        self.after_limit = after;
        self
    }

    /// Cycles through `limits` each time the caret changes position instead of
    /// using a fixed limit. Reads at an unchanged position see the same limit.
    #[must_use]
    pub fn with_window_cycle(mut self, limits: Vec<usize>) -> Self {
        self.window_cycle = limits;
        self.cycle_index = 0;
        self
    }

    /// Splits the document into segments at the given character positions.
    #[must_use]
    pub fn with_boundaries(mut self, mut boundaries: Vec<usize>) -> Self {
        let len = self.chars.len();
        boundaries.retain(|position| *position > 0 && *position < len);
        boundaries.sort_unstable();
        boundaries.dedup();
        self.boundaries = boundaries;
        self
    }

    #[must_use]
    pub fn with_behavior(mut self, behavior: HostBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Full document text, including content the host never exposed.
    #[must_use]
    pub fn text(&self) -> String {
        self.chars.concat()
    }

    /// Document length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Current caret position in characters from the document start.
    #[must_use]
    pub fn caret(&self) -> usize {
        self.caret
    }

    #[must_use]
    pub fn calls(&self) -> &[ProxyCall] {
        &self.calls
    }

    /// Number of caret-move calls received.
    #[must_use]
    pub fn move_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, ProxyCall::MoveCaret(_)))
            .count()
    }

    /// Content-changing calls received, in order.
    #[must_use]
    pub fn mutation_calls(&self) -> Vec<ProxyCall> {
        self.calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn current_limits(&self) -> (usize, usize) {
        if self.window_cycle.is_empty() {
            return (self.before_limit, self.after_limit);
        }

        let limit = self.window_cycle[self.cycle_index % self.window_cycle.len()];
        (limit, limit)
    }

    fn segment_start(&self) -> usize {
        self.boundaries
            .iter()
            .rev()
            .find(|boundary| {
                **boundary < self.caret
                    || (**boundary == self.caret && self.affinity == Affinity::Following)
            })
            .copied()
            .unwrap_or(0)
    }

    fn segment_end(&self) -> usize {
        self.boundaries
            .iter()
            .find(|boundary| {
                **boundary > self.caret
                    || (**boundary == self.caret && self.affinity == Affinity::Preceding)
            })
            .copied()
            .unwrap_or(self.chars.len())
    }

    fn ensure_endless_len(&mut self, len: usize) {
        while self.chars.len() < len {
            let letter = ENDLESS_ALPHABET[self.chars.len() % ENDLESS_ALPHABET.len()];
            self.chars.push(char::from(letter).to_string());
        }
    }

    fn live_window(&mut self) -> (String, String) {
        let (before_limit, after_limit) = self.current_limits();
        if self.behavior == HostBehavior::Endless {
            self.ensure_endless_len(self.caret + after_limit);
        }

        let start = self
            .segment_start()
            .max(self.caret.saturating_sub(before_limit));
        let end = self.segment_end().min(self.caret + after_limit);

        (
            self.chars[start..self.caret].concat(),
            self.chars[self.caret..end].concat(),
        )
    }

    fn window(&mut self) -> (String, String) {
        if self.behavior != HostBehavior::Frozen {
            return self.live_window();
        }

        if self.frozen.is_none() {
            self.frozen = Some(self.live_window());
        }
        self.frozen.clone().unwrap_or_default()
    }

    fn shift_boundaries_after(&mut self, position: usize, delta: isize) {
        for boundary in &mut self.boundaries {
            if *boundary > position {
                *boundary = boundary.saturating_add_signed(delta);
            }
        }
    }
}

impl CaretWindowProxy for SimulatedHost {
    fn read_before(&mut self) -> Option<String> {
        self.calls.push(ProxyCall::ReadBefore);
        let (before, _) = self.window();
        (!before.is_empty()).then_some(before)
    }

    fn read_after(&mut self) -> Option<String> {
        self.calls.push(ProxyCall::ReadAfter);
        let (_, after) = self.window();
        (!after.is_empty()).then_some(after)
    }

    fn move_caret(&mut self, delta: isize) {
        self.calls.push(ProxyCall::MoveCaret(delta));

        let target = self.caret.saturating_add_signed(delta);
        if self.behavior == HostBehavior::Endless {
            self.ensure_endless_len(target);
        }
        let previous = self.caret;
        self.caret = target.min(self.chars.len());
        if self.caret != previous {
            self.cycle_index = self.cycle_index.wrapping_add(1);
        }

        if delta < 0 {
            self.affinity = Affinity::Following;
        } else if delta > 0 {
            self.affinity = Affinity::Preceding;
        }
    }

    fn delete_backward(&mut self) {
        self.calls.push(ProxyCall::DeleteBackward);
        if self.caret == 0 {
            return;
        }

        self.caret -= 1;
        self.chars.remove(self.caret);
        self.shift_boundaries_after(self.caret, -1);
    }

    fn insert_text(&mut self, text: &str) {
        self.calls.push(ProxyCall::InsertText(text.to_string()));
        let inserted = split_chars(text);
        let count = inserted.len();
        let at = self.caret;

        self.chars.splice(at..at, inserted);
        self.shift_boundaries_after(at, count as isize);
        self.caret += count;
        self.affinity = Affinity::Preceding;
    }

    fn unmark_text(&mut self) {
        self.calls.push(ProxyCall::UnmarkText);
    }
}
