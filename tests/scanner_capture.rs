use caret_capture::{capture_with, CaretWindow, CaretWindowProxy, DocumentScanner, ScanOptions};
use caret_proxy_mock::{HostBehavior, ProxyCall, SimulatedHost};
use pretty_assertions::assert_eq;

const MAX_HOPS: usize = 20_000;

fn sample_text(len: usize) -> String {
    const WORDS: &[&str] = &["lorem ", "ipsum ", "dolor ", "sit ", "amet, ", "consectetur\n"];
    let mut text = String::new();
    let mut index = 0;
    while text.chars().count() < len {
        text.push_str(WORDS[index % WORDS.len()]);
        index += 1;
    }
    text.chars().take(len).collect()
}

fn scan(host: &mut SimulatedHost) -> caret_capture::CaptureResult {
    capture_with(host, MAX_HOPS, &ScanOptions::immediate())
}

fn scan_scripted(host: &mut ScriptedHost) -> caret_capture::CaptureResult {
    capture_with(host, MAX_HOPS, &ScanOptions::immediate())
}

/// Host that replays a fixed window per caret move, whatever the move size.
struct ScriptedHost {
    windows: Vec<CaretWindow>,
    position: usize,
    moves: Vec<isize>,
}

impl ScriptedHost {
    fn new(windows: Vec<CaretWindow>) -> Self {
        Self {
            windows,
            position: 0,
            moves: Vec::new(),
        }
    }

    fn current(&self) -> &CaretWindow {
        &self.windows[self.position]
    }
}

impl CaretWindowProxy for ScriptedHost {
    fn read_before(&mut self) -> Option<String> {
        Some(self.current().before.clone())
    }

    fn read_after(&mut self) -> Option<String> {
        Some(self.current().after.clone())
    }

    fn move_caret(&mut self, delta: isize) {
        self.moves.push(delta);
        self.position = (self.position + 1).min(self.windows.len() - 1);
    }

    fn delete_backward(&mut self) {
        panic!("capture must not delete");
    }

    fn insert_text(&mut self, _text: &str) {
        panic!("capture must not insert");
    }
}

#[test]
fn five_hundred_chars_behind_fifty_char_windows_are_captured_from_the_end() {
    let text = sample_text(500);
    let mut host = SimulatedHost::new(&text).with_window_limit(50);

    let result = scan(&mut host);

    assert!(result.reached_start);
    assert!(result.reached_end);
    assert_eq!(result.total_length, 500);
    assert_eq!(result.text, text);
    assert_eq!(host.caret(), 500);
}

#[test]
fn caret_returns_to_every_start_position() {
    let text = sample_text(73);
    for start in [0, 1, 9, 10, 11, 36, 59, 72, 73] {
        let mut host = SimulatedHost::new(&text)
            .with_caret(start)
            .with_window_limit(7)
            .with_boundaries(vec![10, 25, 60]);

        let result = scan(&mut host);

        assert_eq!(result.text, text, "caret started at {start}");
        assert!(result.is_complete(), "caret started at {start}");
        assert_eq!(host.caret(), start, "caret started at {start}");
    }
}

#[test]
fn empty_document_needs_no_caret_moves() {
    let mut host = SimulatedHost::new("");

    let result = scan(&mut host);

    assert_eq!(result.text, "");
    assert_eq!(result.total_length, 0);
    assert!(result.reached_start && result.reached_end);
    assert_eq!(result.hops, 0);
    assert_eq!(host.move_count(), 0);
}

#[test]
fn consecutive_captures_of_an_unchanged_document_match() {
    let text = sample_text(240);
    let mut host = SimulatedHost::new(&text)
        .with_caret(131)
        .with_window_cycle(vec![5, 40, 12, 1, 64])
        .with_boundaries(vec![48, 120]);

    let first = scan(&mut host);
    let second = scan(&mut host);

    assert_eq!(first.text, text);
    assert_eq!(first.text, second.text);
    assert_eq!(host.caret(), 131);
}

#[test]
fn scanning_never_mutates_the_document() {
    let text = sample_text(150);
    let mut host = SimulatedHost::new(&text)
        .with_caret(80)
        .with_window_limit(16)
        .with_boundaries(vec![30, 31, 100]);

    scan(&mut host);

    assert!(host.mutation_calls().is_empty());
    assert_eq!(host.text(), text);
}

#[test]
fn composition_is_cancelled_once_before_moving() {
    let mut host = SimulatedHost::new("abc def").with_caret(3);

    scan(&mut host);

    let unmarks: Vec<usize> = host
        .calls()
        .iter()
        .enumerate()
        .filter(|(_, call)| **call == ProxyCall::UnmarkText)
        .map(|(index, _)| index)
        .collect();
    assert_eq!(unmarks, vec![0]);
}

#[test]
fn probes_cross_segment_boundaries_in_both_directions() {
    let mut host = SimulatedHost::new("first field|second field|third")
        .with_caret(18)
        .with_boundaries(vec![12, 25]);

    let result = scan(&mut host);

    assert_eq!(result.text, "first field|second field|third");
    assert!(result.is_complete());
    assert_eq!(host.caret(), 18);
}

#[test]
fn single_character_segments_are_not_lost_or_duplicated() {
    let text = "abcdefghij";
    let mut host = SimulatedHost::new(text)
        .with_caret(4)
        .with_window_limit(3)
        .with_boundaries(vec![1, 2, 3, 9]);

    let result = scan(&mut host);

    assert_eq!(result.text, text);
    assert_eq!(host.caret(), 4);
}

#[test]
fn grapheme_clusters_count_as_single_characters() {
    let text = "cafe\u{301} 👍🏽 naïve 🇳🇴 end";
    let len = caret_proxy::char_count(text);
    let mut host = SimulatedHost::new(text).with_caret(7).with_window_limit(3);

    let result = scan(&mut host);

    assert_eq!(result.text, text);
    assert_eq!(result.total_length, len);
    assert_eq!(host.caret(), 7);
}

#[test]
fn sweep_chunk_limit_caps_each_sweep_hop() {
    let text = sample_text(500);
    let mut host = SimulatedHost::new(&text).with_window_limit(200);
    let options = ScanOptions::immediate().with_sweep_chunk_limit(50);

    let result = capture_with(&mut host, MAX_HOPS, &options);

    assert_eq!(result.text, text);
    let sweeps = host
        .calls()
        .iter()
        .filter(|call| matches!(call, ProxyCall::MoveCaret(50) | ProxyCall::MoveCaret(-50)))
        .count();
    assert_eq!(sweeps, 20);
    // Ten sweeps and four failed probes in each direction; no restoring move.
    assert_eq!(host.move_count(), 28);
    assert_eq!(result.hops, 28);
}

#[test]
fn whole_window_sweeps_use_fewer_hops() {
    let text = sample_text(500);
    let mut host = SimulatedHost::new(&text).with_window_limit(200);

    let result = scan(&mut host);

    assert_eq!(result.text, text);
    assert_eq!(result.hops, 14);
}

#[test]
fn frozen_host_terminates_within_the_hop_budget() {
    let mut host = SimulatedHost::new("abcdef")
        .with_caret(3)
        .with_behavior(HostBehavior::Frozen);

    let result = capture_with(&mut host, 40, &ScanOptions::immediate());

    assert!(!result.is_complete());
    assert_eq!(result.hops, 40);
    let warning = result.stall_warning().expect("stall warning");
    assert!(warning.budget_exhausted());
    assert!(host.mutation_calls().is_empty());
}

#[test]
fn endless_host_reports_an_unconfirmed_end_and_restores_the_caret() {
    let mut host = SimulatedHost::new("seed")
        .with_window_limit(10)
        .with_behavior(HostBehavior::Endless);

    let result = capture_with(&mut host, 30, &ScanOptions::immediate());

    assert!(result.reached_start);
    assert!(!result.reached_end);
    assert_eq!(result.hops, 30);
    assert_eq!(result.total_length, 250);
    assert!(result.text.starts_with("seed"));
    assert_eq!(host.caret(), 4);
}

#[test]
fn scanner_owns_its_proxy_and_hands_it_back() {
    let mut scanner = DocumentScanner::with_options(
        SimulatedHost::new("owned text").with_caret(5),
        ScanOptions::immediate(),
    );

    let result = scanner.capture(100);
    assert_eq!(result.text, "owned text");
    assert_eq!(scanner.proxy_mut().read_before().as_deref(), Some("owned"));

    let host = scanner.into_inner();
    assert_eq!(host.caret(), 5);
}

#[test]
fn oversized_step_appends_only_the_verified_growth() {
    let start = CaretWindow::new("", "hello");
    let swept = CaretWindow::new("hello", "");
    let crossed = CaretWindow::new("hello0123456789", "");
    let mut windows = vec![start; 4];
    windows.extend(vec![swept; 3]);
    windows.extend(vec![crossed; 5]);
    let mut host = ScriptedHost::new(windows);

    let options = ScanOptions::immediate().with_probe_steps(vec![1, 8, 32]);
    let result = capture_with(&mut host, MAX_HOPS, &options);

    // The 32-character move only grew the window by 10.
    assert_eq!(result.text, "hello0123456789");
    assert_eq!(result.total_length, 15);
    assert!(result.is_complete());
    assert_eq!(result.hops, 10);
    assert_eq!(host.moves, vec![-1, -8, -32, 5, 1, 8, 32, 1, 8, 32, -15]);
}

#[test]
fn caret_in_an_empty_segment_reads_as_an_empty_document() {
    let mut host = ScriptedHost::new(vec![
        CaretWindow::default(),
        CaretWindow::new("", "next field"),
    ]);

    let result = scan_scripted(&mut host);

    assert_eq!(result.text, "");
    assert!(result.is_complete());
    assert_eq!(result.hops, 0);
    assert!(host.moves.is_empty());
}
