//! Minimal contract for a host document that is only reachable through a
//! bounded window of text around an invisible caret.
//!
//! This crate defines the collaborator surface consumed by `caret_capture`
//! and the character model shared by every implementation. It contains no
//! scanning logic and no host platform bindings.
//!
//! Character counts are extended grapheme clusters: a caret move of `1`
//! crosses one user-perceived character, whatever its byte or code point
//! length.

use unicode_segmentation::UnicodeSegmentation;

/// Snapshot of the text the host exposes on either side of the caret.
///
/// Windows are ephemeral: the host decides their length and may grow or
/// shrink them between reads. Absent reads are represented as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaretWindow {
    pub before: String,
    pub after: String,
}

impl CaretWindow {
    #[must_use]
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
        }
    }

    /// Number of characters exposed before the caret.
    #[must_use]
    pub fn before_len(&self) -> usize {
        char_count(&self.before)
    }

    /// Number of characters exposed after the caret.
    #[must_use]
    pub fn after_len(&self) -> usize {
        char_count(&self.after)
    }

    /// Returns true when the host exposes nothing on either side.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Caret-relative access to a host document.
///
/// Implementations are owned by a single context and must never be called
/// concurrently. Reads and caret moves never change document content;
/// `delete_backward` and `insert_text` are the only mutating calls.
pub trait CaretWindowProxy {
    /// Text immediately before the caret, or `None` when the host exposes nothing.
    fn read_before(&mut self) -> Option<String>;

    /// Text immediately after the caret, or `None` when the host exposes nothing.
    fn read_after(&mut self) -> Option<String>;

    /// Moves the caret by `delta` characters (negative moves left).
    ///
    /// Hosts clamp moves at the document edges without reporting it.
    fn move_caret(&mut self, delta: isize);

    /// Deletes one character before the caret.
    fn delete_backward(&mut self);

    /// Inserts `text` at the caret.
    fn insert_text(&mut self, text: &str);

    /// Cancels any active composition so caret moves cannot commit marked text.
    fn unmark_text(&mut self) {}

    /// Whether calls still reach the host. Local hosts are always reachable.
    fn is_available(&mut self) -> bool {
        true
    }

    /// Reads both windows; absent sides become empty strings.
    fn read_window(&mut self) -> CaretWindow {
        CaretWindow {
            before: self.read_before().unwrap_or_default(),
            after: self.read_after().unwrap_or_default(),
        }
    }
}

impl<P: CaretWindowProxy + ?Sized> CaretWindowProxy for &mut P {
    fn read_before(&mut self) -> Option<String> {
        (**self).read_before()
    }

    fn read_after(&mut self) -> Option<String> {
        (**self).read_after()
    }

    fn move_caret(&mut self, delta: isize) {
        (**self).move_caret(delta);
    }

    fn delete_backward(&mut self) {
        (**self).delete_backward();
    }

    fn insert_text(&mut self, text: &str) {
        (**self).insert_text(text);
    }

    fn unmark_text(&mut self) {
        (**self).unmark_text();
    }

    fn is_available(&mut self) -> bool {
        (**self).is_available()
    }

    fn read_window(&mut self) -> CaretWindow {
        (**self).read_window()
    }
}

impl<P: CaretWindowProxy + ?Sized> CaretWindowProxy for Box<P> {
    fn read_before(&mut self) -> Option<String> {
        (**self).read_before()
    }

    fn read_after(&mut self) -> Option<String> {
        (**self).read_after()
    }

    fn move_caret(&mut self, delta: isize) {
        (**self).move_caret(delta);
    }

    fn delete_backward(&mut self) {
        (**self).delete_backward();
    }

    fn insert_text(&mut self, text: &str) {
        (**self).insert_text(text);
    }

    fn unmark_text(&mut self) {
        (**self).unmark_text();
    }

    fn is_available(&mut self) -> bool {
        (**self).is_available()
    }

    fn read_window(&mut self) -> CaretWindow {
        (**self).read_window()
    }
}

/// Number of user-perceived characters in `text`.
#[must_use]
pub fn char_count(text: &str) -> usize {
    text.graphemes(true).count()
}

/// The first `count` characters of `text` (all of it when shorter).
#[must_use]
pub fn prefix_chars(text: &str, count: usize) -> &str {
    match text.grapheme_indices(true).nth(count) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

/// The last `count` characters of `text` (all of it when shorter).
#[must_use]
pub fn suffix_chars(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }

    match text.grapheme_indices(true).rev().nth(count - 1) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

/// Splits `text` into owned characters.
#[must_use]
pub fn split_chars(text: &str) -> Vec<String> {
    text.graphemes(true).map(ToString::to_string).collect()
}
