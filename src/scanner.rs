//! Whole-document capture through a bounded caret window.
//!
//! The scanner runs two phases against a [`CaretWindowProxy`]. Phase A moves
//! left until the true start of the document is confirmed; phase B moves
//! right to the true end, assembling every character it crosses. The caret is
//! then moved back by the net distance travelled, so it ends where it began.
//!
//! A read that comes back empty does not prove a boundary: hosts split
//! documents into segments that hide each other's text. Each empty read
//! triggers a probe cascade of increasing step sizes, and only when no probe
//! changes the window is the boundary declared reached.

use std::thread;
use std::time::Duration;

use caret_proxy::{char_count, prefix_chars, suffix_chars, CaretWindow, CaretWindowProxy};
use tracing::{debug, info, warn};

use crate::error::ScanStalledWarning;

/// Hop budget used when none is configured.
pub const DEFAULT_MAX_HOPS: usize = 20_000;

/// Probe sizes tried, in order, when the window reads empty.
pub const DEFAULT_PROBE_STEPS: [usize; 4] = [1, 8, 32, 128];

/// Pause between hops so event-driven hosts can refresh their window.
pub const DEFAULT_HOP_DELAY: Duration = Duration::from_millis(10);

/// Tunables for a scan. None of them affect correctness on an honest host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub probe_steps: Vec<usize>,
    /// Upper bound on a single sweep hop; `None` consumes the whole window.
    pub sweep_chunk_limit: Option<usize>,
    pub hop_delay: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            probe_steps: DEFAULT_PROBE_STEPS.to_vec(),
            sweep_chunk_limit: None,
            hop_delay: DEFAULT_HOP_DELAY,
        }
    }
}

impl ScanOptions {
    /// Default options without pacing, for hosts that update synchronously.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            hop_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_probe_steps(mut self, steps: Vec<usize>) -> Self {
        self.probe_steps = steps;
        self
    }

    #[must_use]
    pub fn with_sweep_chunk_limit(mut self, limit: usize) -> Self {
        self.sweep_chunk_limit = (limit > 0).then_some(limit);
        self
    }

    #[must_use]
    pub fn with_hop_delay(mut self, delay: Duration) -> Self {
        self.hop_delay = delay;
        self
    }
}

/// Mutable state of one in-flight scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub left_consumed: usize,
    pub right_consumed: usize,
    pub assembled: String,
    pub hops: usize,
}

impl ScanProgress {
    /// Caret offset that returns the caret to where the scan started.
    pub fn restoring_offset(&self) -> isize {
        to_signed(self.left_consumed).saturating_sub(to_signed(self.right_consumed))
    }
}

/// Outcome of a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub text: String,
    pub total_length: usize,
    pub reached_start: bool,
    pub reached_end: bool,
    /// Caret moves spent by both phases, excluding the restoring move.
    pub hops: usize,
    pub max_hops: usize,
}

impl CaptureResult {
    fn empty_document() -> Self {
        Self {
            text: String::new(),
            total_length: 0,
            reached_start: true,
            reached_end: true,
            hops: 0,
            max_hops: 0,
        }
    }

    /// Both boundaries were confirmed.
    pub fn is_complete(&self) -> bool {
        self.reached_start && self.reached_end
    }

    pub fn stall_warning(&self) -> Option<ScanStalledWarning> {
        (!self.is_complete()).then_some(ScanStalledWarning {
            hops: self.hops,
            max_hops: self.max_hops,
            reached_start: self.reached_start,
            reached_end: self.reached_end,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn signed(self, step: usize) -> isize {
        match self {
            Self::Left => to_signed(step).saturating_neg(),
            Self::Right => to_signed(step),
        }
    }

    /// The window the caret is moving into.
    fn leading(self, window: &CaretWindow) -> &str {
        match self {
            Self::Left => &window.before,
            Self::Right => &window.after,
        }
    }

    /// The window the caret is moving away from.
    fn trailing(self, window: &CaretWindow) -> &str {
        match self {
            Self::Left => &window.after,
            Self::Right => &window.before,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Verified movement observed after a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeMeasurement {
    pub delta: usize,
    /// The characters the caret crossed, in document order.
    pub crossed: String,
}

/// Measures how far a probe of `step` characters actually moved the caret,
/// comparing the windows read before (`pre`) and after (`post`) the move.
///
/// Growth of the trailing window is the primary evidence, then shrinkage of
/// the leading window, then any content change at all (the caret crossed
/// into a segment whose window starts fresh). The result never exceeds
/// `step`, so a window that shifts on its own cannot inflate the delta.
pub fn measure_probe(
    direction: Direction,
    step: usize,
    pre: &CaretWindow,
    post: &CaretWindow,
) -> Option<ProbeMeasurement> {
    let trailing_pre = char_count(direction.trailing(pre));
    let trailing_post = char_count(direction.trailing(post));
    let leading_pre = char_count(direction.leading(pre));
    let leading_post = char_count(direction.leading(post));

    let (delta, from_trailing) = if trailing_post > trailing_pre {
        (step.min(trailing_post - trailing_pre), true)
    } else if leading_pre > leading_post {
        (step.min(leading_pre - leading_post), false)
    } else if pre != post {
        (step.min(trailing_post), true)
    } else {
        return None;
    };

    if delta == 0 {
        return None;
    }

    let crossed = match (direction, from_trailing) {
        (Direction::Right, true) => suffix_chars(&post.before, delta),
        (Direction::Right, false) => prefix_chars(&pre.after, delta),
        (Direction::Left, true) => prefix_chars(&post.after, delta),
        (Direction::Left, false) => suffix_chars(&pre.before, delta),
    };

    Some(ProbeMeasurement {
        delta,
        crossed: crossed.to_string(),
    })
}

enum ProbeOutcome {
    Progressed(CaretWindow),
    Boundary,
    OutOfHops,
}

/// Drives a proxy through a two-phase capture.
///
/// The scanner only issues reads, caret moves and `unmark_text`; it never
/// inserts or deletes.
#[derive(Debug)]
pub struct DocumentScanner<P> {
    proxy: P,
    options: ScanOptions,
}

impl<P: CaretWindowProxy> DocumentScanner<P> {
    pub fn new(proxy: P) -> Self {
        Self::with_options(proxy, ScanOptions::default())
    }

    pub fn with_options(proxy: P, options: ScanOptions) -> Self {
        Self { proxy, options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn proxy_mut(&mut self) -> &mut P {
        &mut self.proxy
    }

    pub fn into_inner(self) -> P {
        self.proxy
    }

    /// Captures the whole document using at most `max_hops` caret moves.
    ///
    /// Always terminates. When the budget runs out or the host stops
    /// responding, the partial text is returned with the unconfirmed
    /// boundary flag left `false`.
    pub fn capture(&mut self, max_hops: usize) -> CaptureResult {
        capture_with(&mut self.proxy, max_hops, &self.options)
    }
}

/// Captures the document behind `proxy` with default options.
pub fn capture<P: CaretWindowProxy + ?Sized>(proxy: &mut P, max_hops: usize) -> CaptureResult {
    capture_with(proxy, max_hops, &ScanOptions::default())
}

/// Captures the document behind `proxy`.
///
/// When the first read shows nothing on either side, the document is
/// reported as empty with both boundaries confirmed and no caret moves.
/// A host that parks the caret in an empty segment between non-empty ones
/// (an empty field or paragraph) is indistinguishable from an empty document
/// on that read, so its neighbours are not captured. Callers that can put
/// the caret in such a segment should move it into text before capturing.
pub fn capture_with<P: CaretWindowProxy + ?Sized>(
    proxy: &mut P,
    max_hops: usize,
    options: &ScanOptions,
) -> CaptureResult {
    proxy.unmark_text();

    let first = proxy.read_window();
    if first.is_empty() {
        debug!("window empty on both sides, treating document as empty");
        return CaptureResult {
            max_hops,
            ..CaptureResult::empty_document()
        };
    }

    let mut run = ScanRun {
        proxy,
        options,
        max_hops,
        progress: ScanProgress::default(),
    };

    let reached_start = run.phase(Direction::Left, first);
    let window = run.proxy.read_window();
    let reached_end = run.phase(Direction::Right, window);
    run.restore();

    let ScanProgress {
        assembled, hops, ..
    } = run.progress;
    let result = CaptureResult {
        total_length: char_count(&assembled),
        text: assembled,
        reached_start,
        reached_end,
        hops,
        max_hops,
    };

    if result.is_complete() {
        info!(
            length = result.total_length,
            hops = result.hops,
            "captured document"
        );
    } else {
        warn!(
            length = result.total_length,
            hops = result.hops,
            max_hops,
            reached_start,
            reached_end,
            "capture stopped before both boundaries were confirmed"
        );
    }

    result
}

struct ScanRun<'a, P: ?Sized> {
    proxy: &'a mut P,
    options: &'a ScanOptions,
    max_hops: usize,
    progress: ScanProgress,
}

impl<P: CaretWindowProxy + ?Sized> ScanRun<'_, P> {
    /// Moves in `direction` until a boundary is confirmed (`true`) or the hop
    /// budget runs out (`false`).
    fn phase(&mut self, direction: Direction, mut window: CaretWindow) -> bool {
        loop {
            let available = char_count(direction.leading(&window));
            if available > 0 {
                let step = self
                    .options
                    .sweep_chunk_limit
                    .map_or(available, |limit| available.min(limit));
                let crossed = match direction {
                    Direction::Left => "",
                    Direction::Right => prefix_chars(&window.after, step),
                }
                .to_string();

                if !self.hop(direction, step) {
                    return false;
                }
                self.record(direction, step, &crossed);
                window = self.proxy.read_window();
                continue;
            }

            match self.probe(direction, &window) {
                ProbeOutcome::Progressed(next) => window = next,
                ProbeOutcome::Boundary => {
                    debug!(
                        direction = direction.as_str(),
                        hops = self.progress.hops,
                        "boundary confirmed"
                    );
                    return true;
                }
                ProbeOutcome::OutOfHops => return false,
            }
        }
    }

    fn probe(&mut self, direction: Direction, pre: &CaretWindow) -> ProbeOutcome {
        let options = self.options;
        for &step in &options.probe_steps {
            if !self.hop(direction, step) {
                return ProbeOutcome::OutOfHops;
            }

            let post = self.proxy.read_window();
            if let Some(measured) = measure_probe(direction, step, pre, &post) {
                debug!(
                    direction = direction.as_str(),
                    step,
                    delta = measured.delta,
                    "probe crossed hidden text"
                );
                self.record(direction, measured.delta, &measured.crossed);
                return ProbeOutcome::Progressed(post);
            }
        }

        ProbeOutcome::Boundary
    }

    fn hop(&mut self, direction: Direction, step: usize) -> bool {
        if self.progress.hops >= self.max_hops {
            return false;
        }

        self.pace();
        self.proxy.move_caret(direction.signed(step));
        self.progress.hops += 1;
        true
    }

    fn record(&mut self, direction: Direction, delta: usize, crossed: &str) {
        match direction {
            Direction::Left => self.progress.left_consumed += delta,
            Direction::Right => {
                self.progress.right_consumed += delta;
                self.progress.assembled.push_str(crossed);
            }
        }
    }

    fn restore(&mut self) {
        let offset = self.progress.restoring_offset();
        if offset != 0 {
            self.pace();
            self.proxy.move_caret(offset);
        }
    }

    fn pace(&self) {
        if !self.options.hop_delay.is_zero() {
            thread::sleep(self.options.hop_delay);
        }
    }
}

fn to_signed(value: usize) -> isize {
    isize::try_from(value).unwrap_or(isize::MAX)
}
