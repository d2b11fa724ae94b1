// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Tests for SSE frame parsing and decoding
//
// Tests cover:
//  1. Blank and colon-free frames yield nothing
//  2. Named events with JSON data
//  3. JSON-only data lines (event name inside the payload)
//  4. [DONE] sentinel
//  5. Malformed data degrades to a raw answer
//  6. Key/value fallback bag
//  7. Typed classification of every dispatched kind
//  8. Decoder: split frames, CRLF, split UTF-8, tail handling

use super::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse(frame: &str) -> RawEvent {
    parse_frame(frame).unwrap_or_else(|| panic!("expected an event for {frame:?}"))
}

fn classify(frame: &str) -> StreamEvent {
    StreamEvent::from_raw(&parse(frame))
}

// ---------------------------------------------------------------------------
// 1. Frames without data or colon-bearing lines
// ---------------------------------------------------------------------------

#[test]
fn blank_frame_yields_none() {
    assert_eq!(parse_frame(""), None);
    assert_eq!(parse_frame("   \n\t \n"), None);
}

#[test]
fn frame_without_colons_yields_none() {
    assert_eq!(parse_frame("hello world"), None);
    assert_eq!(parse_frame("just\nsome\nlines"), None);
}

#[test]
fn leading_colon_comment_is_not_a_key() {
    assert_eq!(parse_frame(": keep-alive"), None);
}

// ---------------------------------------------------------------------------
// 2-3. JSON payloads
// ---------------------------------------------------------------------------

#[test]
fn named_event_with_json_data() {
    let event = parse("event: agent_thought\ndata: {\"thought\":\"查询数据库\"}");
    assert_eq!(event.event, "agent_thought");
    assert_eq!(event.str_field("thought"), Some("查询数据库"));
}

#[test]
fn payload_event_field_overrides_named_event() {
    let event = parse("event: message\ndata: {\"event\":\"message_end\",\"id\":\"m1\"}");
    assert_eq!(event.event, "message_end");
}

#[test]
fn blank_payload_event_field_falls_back_to_named_event() {
    let event = parse("event: agent_message\ndata: {\"event\":\"  \",\"answer\":\"x\"}");
    assert_eq!(event.event, "agent_message");
}

#[test]
fn json_only_data_defaults_to_message() {
    let event = parse("data: {\"answer\":\"X\"}");
    assert_eq!(event.event, "message");
    assert_eq!(event.payload.get("answer"), Some(&json!("X")));
}

#[test]
fn last_event_line_wins() {
    let event = parse("event: first\nevent:  second \ndata: {}");
    assert_eq!(event.event, "second");
}

#[test]
fn multiple_data_lines_are_newline_joined() {
    let event = parse("data: {\"answer\":\ndata: \"joined\"}");
    assert_eq!(event.str_field("answer"), Some("joined"));
}

#[test]
fn only_one_leading_space_is_stripped_from_data() {
    let event = parse("data:   indented");
    assert_eq!(event.str_field("answer"), Some("  indented"));
}

// ---------------------------------------------------------------------------
// 4. Sentinel
// ---------------------------------------------------------------------------

#[test]
fn done_sentinel_maps_to_done_event() {
    let event = parse("data: [DONE]");
    assert_eq!(event.event, "done");
    assert!(event.payload.is_empty());
    assert!(StreamEvent::from_raw(&event).is_terminal());
}

// ---------------------------------------------------------------------------
// 5. Malformed data
// ---------------------------------------------------------------------------

#[test]
fn malformed_json_becomes_raw_answer() {
    let event = parse("event: agent_message\nid: 7\ndata: {not json");
    assert_eq!(event.event, "agent_message");
    assert_eq!(event.str_field("answer"), Some("{not json"));
    assert_eq!(event.str_field("id"), Some("7"));
}

#[test]
fn plain_text_data_becomes_message_answer() {
    let stream_event = classify("data: 你好");
    assert_eq!(stream_event.kind, EventKind::AnswerDelta("你好".into()));
}

#[test]
fn non_object_json_is_treated_as_raw_text() {
    let event = parse("data: 42");
    assert_eq!(event.event, "message");
    assert_eq!(event.str_field("answer"), Some("42"));
}

// ---------------------------------------------------------------------------
// 6. Fallback bag
// ---------------------------------------------------------------------------

#[test]
fn key_value_lines_without_data_form_the_payload() {
    let event = parse("id: 12\nretry: 3000");
    assert_eq!(event.event, "message");
    assert_eq!(event.str_field("id"), Some("12"));
    assert_eq!(event.str_field("retry"), Some("3000"));
}

#[test]
fn bag_event_key_names_the_event() {
    // Indented, so it is not an `event:` field line.
    let event = parse("id: 1\n  event: ping");
    assert_eq!(event.event, "ping");
}

#[test]
fn named_event_without_data_uses_event_name() {
    let event = parse("event: message_end\nid: 9");
    assert_eq!(event.event, "message_end");
}

// ---------------------------------------------------------------------------
// 7. Classification
// ---------------------------------------------------------------------------

#[test]
fn round_trip_message_answer() {
    let encoded = format!("data: {}", json!({"event": "message", "answer": "X"}));
    let stream_event = classify(&encoded);
    assert_eq!(stream_event.kind, EventKind::AnswerDelta("X".into()));
}

#[test]
fn thought_text_prefers_thought_then_message_then_answer() {
    let from_thought = classify("event: agent_thought\ndata: {\"thought\":\" a \",\"message\":\"b\"}");
    let from_message = classify("event: agent_thought\ndata: {\"message\":\"b\",\"answer\":\"c\"}");
    let from_answer = classify("event: agent_thought\ndata: {\"answer\":\"c\"}");

    let text = |e: StreamEvent| match e.kind {
        EventKind::Thought(t) => t.text,
        other => panic!("expected thought, got {other:?}"),
    };
    assert_eq!(text(from_thought), "a");
    assert_eq!(text(from_message), "b");
    assert_eq!(text(from_answer), "c");
}

#[test]
fn thought_carries_tool_observation_and_timestamp() {
    let event = classify(
        "event: agent_thought\ndata: {\"thought\":\"查询\",\"tool_name\":\"ev_db\",\"observation\":\"3 rows\",\"created_at\":1700000000}",
    );
    match event.kind {
        EventKind::Thought(t) => {
            assert_eq!(t.tool.as_deref(), Some("ev_db"));
            assert_eq!(t.observation.as_deref(), Some("3 rows"));
            assert_eq!(t.created_at, Some(1_700_000_000));
        }
        other => panic!("expected thought, got {other:?}"),
    }
}

#[test]
fn tool_field_wins_over_tool_name() {
    let event = classify("event: agent_thought\ndata: {\"thought\":\"x\",\"tool\":\"a\",\"tool_name\":\"b\"}");
    match event.kind {
        EventKind::Thought(t) => assert_eq!(t.tool.as_deref(), Some("a")),
        other => panic!("expected thought, got {other:?}"),
    }
}

#[test]
fn end_events_are_terminal() {
    for name in ["message_end", "agent_message_end"] {
        let event = classify(&format!("data: {{\"event\":\"{name}\"}}"));
        assert!(event.is_terminal(), "{name} should be terminal");
    }
}

#[test]
fn error_event_carries_message() {
    let event = classify("event: error\ndata: {\"message\":\"quota exceeded\"}");
    assert_eq!(event.kind, EventKind::Error(Some("quota exceeded".into())));

    let bare = classify("event: error\ndata: {}");
    assert_eq!(bare.kind, EventKind::Error(None));

    let blank = classify("event: error\ndata: {\"message\":\"  \"}");
    assert_eq!(blank.kind, EventKind::Error(None));
}

#[test]
fn unknown_events_pass_through_by_name() {
    let event = classify("data: {\"event\":\"workflow_started\"}");
    assert_eq!(event.kind, EventKind::Unknown("workflow_started".into()));
}

#[test]
fn conversation_id_is_extracted_when_non_empty() {
    let with_id = classify("data: {\"event\":\"message\",\"answer\":\"\",\"conversation_id\":\"c-1\"}");
    assert_eq!(with_id.conversation_id.as_deref(), Some("c-1"));

    let empty_id = classify("data: {\"event\":\"message\",\"conversation_id\":\"\"}");
    assert_eq!(empty_id.conversation_id, None);
}

// ---------------------------------------------------------------------------
// 8. Decoder
// ---------------------------------------------------------------------------

#[test]
fn decoder_emits_frames_across_chunk_boundaries() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"event: message\nda").is_empty());
    assert!(decoder.push(b"ta: {\"answer\":\"A\"}\n").is_empty());

    let frames = decoder.push(b"\ndata: [DONE]\n\n");
    assert_eq!(
        frames,
        vec![
            "event: message\ndata: {\"answer\":\"A\"}".to_string(),
            "data: [DONE]".to_string()
        ]
    );
    assert_eq!(decoder.buffered(), "");
}

#[test]
fn decoder_normalises_crlf_split_between_chunks() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: {\"answer\":\"x\"}\r").is_empty());
    let frames = decoder.push(b"\n\r\n");
    assert_eq!(frames, vec!["data: {\"answer\":\"x\"}".to_string()]);
}

#[test]
fn decoder_holds_split_multibyte_characters() {
    let bytes = "data: 推荐\n\n".as_bytes();
    // Split inside the first CJK character (3 bytes each).
    let (head, rest) = bytes.split_at(7);

    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(head).is_empty());
    assert!(!decoder.buffered().contains('\u{FFFD}'));

    let frames = decoder.push(rest);
    assert_eq!(frames, vec!["data: 推荐".to_string()]);
}

#[test]
fn decoder_replaces_invalid_bytes() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.push(b"data: a\xffb\n\n");
    assert_eq!(frames, vec!["data: a\u{FFFD}b".to_string()]);
}

#[test]
fn decoder_finish_returns_unterminated_tail() {
    let mut decoder = FrameDecoder::new();
    decoder.push(b"data: {\"answer\":\"first\"}\n\nevent: message\ndata: {\"answer\":\"tail\"}");
    let tail = decoder.finish().unwrap();

    let event = StreamEvent::from_raw(&parse_frame(&tail).unwrap());
    assert_eq!(event.kind, EventKind::AnswerDelta("tail".into()));
}

#[test]
fn decoder_finish_ignores_blank_tail() {
    let mut decoder = FrameDecoder::new();
    decoder.push(b"data: [DONE]\n\n\n");
    assert_eq!(decoder.finish(), None);
}
