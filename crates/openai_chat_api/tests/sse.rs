use openai_chat_api::{ChatStreamEvent, SseStreamParser};

fn delta(text: &str) -> ChatStreamEvent {
    ChatStreamEvent::ContentDelta {
        delta: text.to_string(),
    }
}

#[test]
fn sse_parses_deltas_and_done_sentinel() {
    let events = SseStreamParser::parse_frames(concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: [DONE]\n\n",
    ));

    assert_eq!(events, vec![delta("Hi"), delta(" there"), ChatStreamEvent::Done]);
}

#[test]
fn sse_skips_malformed_and_empty_frames() {
    let events = SseStreamParser::parse_frames(concat!(
        ": keep-alive comment\n\n",
        "data: {not json\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[]}\n\n",
        "event: ping\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
    ));

    assert_eq!(events, vec![delta("ok")]);
}

#[test]
fn sse_normalizes_crlf_line_endings() {
    let events = SseStreamParser::parse_frames(
        "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n",
    );

    assert_eq!(events, vec![delta("a"), ChatStreamEvent::Done]);
}

#[test]
fn sse_maps_error_object_to_error_event() {
    let events = SseStreamParser::parse_frames(
        "data: {\"error\":{\"message\":\"quota exceeded\",\"type\":\"insufficient_quota\",\"code\":null}}\n\n",
    );

    assert_eq!(
        events,
        vec![ChatStreamEvent::Error {
            code: Some("insufficient_quota".to_string()),
            message: "quota exceeded".to_string(),
        }]
    );
}

#[test]
fn sse_frames_split_at_arbitrary_byte_boundaries_reassemble() {
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n\ndata: [DONE]\n\n";
    let bytes = body.as_bytes();

    for split in 1..bytes.len() {
        let mut parser = SseStreamParser::default();
        let mut events = parser.feed(&bytes[..split]);
        events.extend(parser.feed(&bytes[split..]));

        assert_eq!(
            events,
            vec![delta("caf\u{e9}"), ChatStreamEvent::Done],
            "split {split}"
        );
    }
}

#[test]
fn sse_trailing_frame_without_blank_line_is_drained_by_finish() {
    let mut parser = SseStreamParser::default();
    let events = parser.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
    assert!(events.is_empty());
    assert!(!parser.is_empty_buffer());

    assert_eq!(parser.finish(), Some(delta("tail")));
    assert!(parser.is_empty_buffer());
}
