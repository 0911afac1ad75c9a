//! Unit tests for the kitty remote-control framing and `ls` interpretation.

use agent_conductor::models::health::ActivityProbe;
use agent_conductor::terminal::kitty_protocol::{
    activity_from_ls, KittyCodec, KittyCommand, FRAME_PREFIX, FRAME_SUFFIX, MAX_FRAME_BYTES,
};
use agent_conductor::AppError;
use bytes::BytesMut;
use serde_json::{json, Value};
use tokio_util::codec::{Decoder, Encoder};

fn encode(command: KittyCommand) -> Vec<u8> {
    let mut buf = BytesMut::new();
    KittyCodec::new().encode(command, &mut buf).expect("encode");
    buf.to_vec()
}

fn body(frame: &[u8]) -> Value {
    assert!(frame.starts_with(FRAME_PREFIX));
    assert!(frame.ends_with(FRAME_SUFFIX));
    serde_json::from_slice(&frame[FRAME_PREFIX.len()..frame.len() - FRAME_SUFFIX.len()]).expect("json body")
}

#[test]
fn send_text_payload_is_base64() {
    let json = body(&encode(KittyCommand::send_text("hi\n")));
    assert_eq!(json["cmd"], "send-text");
    assert_eq!(json["version"], json!([0, 26, 0]));
    assert_eq!(json["no_response"], false);
    assert_eq!(json["payload"]["data"], "base64:aGkK");
}

#[test]
fn send_key_and_close_window_frames() {
    let key = body(&encode(KittyCommand::send_key("enter")));
    assert_eq!(key["cmd"], "send-key");
    assert_eq!(key["payload"]["keys"], json!(["enter"]));

    let close = body(&encode(KittyCommand::close_window()));
    assert_eq!(close["cmd"], "close-window");
    assert_eq!(close["payload"], json!({}));
}

#[test]
fn decoder_waits_for_complete_frame() {
    let mut codec = KittyCodec::new();
    let mut buf = BytesMut::from(&b"\x1bP@kitty-cmd{\"ok\": tr"[..]);
    assert!(codec.decode(&mut buf).expect("partial").is_none());

    buf.extend_from_slice(b"ue}\x1b\\");
    let response = codec.decode(&mut buf).expect("decode").expect("frame");
    assert!(response.ok);
    assert!(buf.is_empty());
}

#[test]
fn decoder_skips_leading_noise() {
    let mut codec = KittyCodec::new();
    let mut buf = BytesMut::from(&b"\r\n\x1bP@kitty-cmd{\"ok\":false,\"error\":\"No matching windows\"}\x1b\\"[..]);
    let response = codec.decode(&mut buf).expect("decode").expect("frame");
    let err = response.into_result("close-window").expect_err("failed reply");
    assert!(matches!(err, AppError::Terminal(ref msg) if msg.contains("No matching windows")));
}

#[test]
fn decoder_rejects_malformed_json() {
    let mut codec = KittyCodec::new();
    let mut buf = BytesMut::from(&b"\x1bP@kitty-cmd{not json}\x1b\\"[..]);
    assert!(codec.decode(&mut buf).is_err());
}

#[test]
fn decoder_rejects_oversized_garbage() {
    let mut codec = KittyCodec::new();
    let mut buf = BytesMut::from(vec![b'x'; MAX_FRAME_BYTES + 1].as_slice());
    assert!(codec.decode(&mut buf).is_err());
}

#[test]
fn successful_reply_yields_data() {
    let mut codec = KittyCodec::new();
    let mut buf = BytesMut::from(&b"\x1bP@kitty-cmd{\"ok\":true,\"data\":\"[]\"}\x1b\\"[..]);
    let response = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(response.into_result("ls").expect("ok"), Some(json!("[]")));
}

fn ls_tree(flags: &[Option<bool>]) -> Value {
    let windows: Vec<Value> = flags
        .iter()
        .map(|flag| match flag {
            Some(at_prompt) => json!({ "id": 1, "at_prompt": at_prompt }),
            None => json!({ "id": 1 }),
        })
        .collect();
    json!([{ "id": 1, "tabs": [{ "id": 1, "windows": windows }] }])
}

#[test]
fn window_back_at_shell_prompt_means_worker_exited() {
    assert_eq!(activity_from_ls(&ls_tree(&[Some(true)])), ActivityProbe::Exited);
    assert_eq!(
        activity_from_ls(&ls_tree(&[Some(false), Some(true)])),
        ActivityProbe::Exited
    );
}

#[test]
fn running_worker_gives_no_activity_verdict() {
    assert_eq!(activity_from_ls(&ls_tree(&[Some(false)])), ActivityProbe::Unsupported);
}

#[test]
fn missing_flag_is_unsupported() {
    assert_eq!(activity_from_ls(&ls_tree(&[None])), ActivityProbe::Unsupported);
    assert_eq!(activity_from_ls(&ls_tree(&[])), ActivityProbe::Unsupported);
    assert_eq!(activity_from_ls(&json!({})), ActivityProbe::Unsupported);
}

#[test]
fn ls_data_as_json_string_is_parsed() {
    let raw = Value::String(ls_tree(&[Some(true)]).to_string());
    assert_eq!(activity_from_ls(&raw), ActivityProbe::Exited);
    assert_eq!(activity_from_ls(&json!("not json")), ActivityProbe::Unsupported);
}
