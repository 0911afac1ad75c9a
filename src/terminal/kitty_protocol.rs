//! Kitty remote-control wire format.
//!
//! Each message is a DCS escape sequence wrapping one JSON object:
//!
//! ```text
//! ESC P @kitty-cmd {"cmd":"send-text","version":[0,26,0],...} ESC \
//! ```
//!
//! Responses use the same framing and carry `{"ok": bool, "data": ..., "error": ...}`.
//! [`KittyCodec`] frames both directions for use with
//! [`tokio_util::codec::FramedRead`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::codec::{Decoder, Encoder};

use crate::models::health::ActivityProbe;
use crate::{AppError, Result};

/// Frame opener.
pub const FRAME_PREFIX: &[u8] = b"\x1bP@kitty-cmd";
/// Frame terminator (ESC backslash).
pub const FRAME_SUFFIX: &[u8] = b"\x1b\\";
/// Protocol version announced in every command.
pub const PROTOCOL_VERSION: [u32; 3] = [0, 26, 0];
/// Largest response frame accepted: 4 MiB.
///
/// `ls` output for a single-window instance is a few kilobytes.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// One remote-control command.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KittyCommand {
    /// Command name, e.g. `send-text`.
    pub cmd: &'static str,
    /// Protocol version.
    pub version: [u32; 3],
    /// Whether kitty should skip the response.
    pub no_response: bool,
    /// Command-specific arguments.
    pub payload: Value,
}

impl KittyCommand {
    fn new(cmd: &'static str, payload: Value) -> Self {
        Self {
            cmd,
            version: PROTOCOL_VERSION,
            no_response: false,
            payload,
        }
    }

    /// Type `text` into the window. The payload is base64 encoded so control
    /// characters and non-ASCII text survive the JSON envelope.
    #[must_use]
    pub fn send_text(text: &str) -> Self {
        Self::new(
            "send-text",
            json!({ "data": format!("base64:{}", STANDARD.encode(text.as_bytes())) }),
        )
    }

    /// Press a named key, e.g. `enter`.
    #[must_use]
    pub fn send_key(key: &str) -> Self {
        Self::new("send-key", json!({ "keys": [key] }))
    }

    /// Close the window.
    #[must_use]
    pub fn close_window() -> Self {
        Self::new("close-window", json!({}))
    }

    /// List OS windows, tabs and windows.
    #[must_use]
    pub fn ls() -> Self {
        Self::new("ls", json!({}))
    }
}

/// Reply to a command.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KittyResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Command output; `ls` returns its tree here, sometimes as a JSON string.
    #[serde(default)]
    pub data: Option<Value>,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
}

impl KittyResponse {
    /// Turn a failed reply into `AppError::Terminal`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Terminal` carrying kitty's error text when `ok` is false.
    pub fn into_result(self, cmd: &str) -> Result<Option<Value>> {
        if self.ok {
            Ok(self.data)
        } else {
            Err(AppError::Terminal(format!(
                "kitty {cmd} failed: {}",
                self.error.as_deref().unwrap_or("no error text")
            )))
        }
    }
}

/// DCS framing codec for the kitty control socket.
#[derive(Debug, Default)]
pub struct KittyCodec;

impl KittyCodec {
    /// Create a codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<KittyCommand> for KittyCodec {
    type Error = AppError;

    fn encode(&mut self, item: KittyCommand, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)?;
        dst.reserve(FRAME_PREFIX.len() + body.len() + FRAME_SUFFIX.len());
        dst.put_slice(FRAME_PREFIX);
        dst.put_slice(&body);
        dst.put_slice(FRAME_SUFFIX);
        Ok(())
    }
}

impl Decoder for KittyCodec {
    type Item = KittyResponse;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(start) = find(src, FRAME_PREFIX) else {
            if src.len() > MAX_FRAME_BYTES {
                return Err(AppError::Terminal("kitty response without frame start".into()));
            }
            return Ok(None);
        };

        let body_start = start + FRAME_PREFIX.len();
        let Some(body_len) = find(&src[body_start..], FRAME_SUFFIX) else {
            if src.len() - start > MAX_FRAME_BYTES {
                return Err(AppError::Terminal(format!(
                    "kitty response exceeded {MAX_FRAME_BYTES} bytes"
                )));
            }
            return Ok(None);
        };

        src.advance(body_start);
        let body = src.split_to(body_len);
        src.advance(FRAME_SUFFIX.len());

        let response = serde_json::from_slice(&body)
            .map_err(|err| AppError::Terminal(format!("malformed kitty response: {err}")))?;
        Ok(Some(response))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Derive the activity probe from `ls` output.
///
/// The worker runs in the foreground of the window's shell, so kitty reports
/// `at_prompt` only once it has exited: that maps to
/// [`ActivityProbe::Exited`]. While it runs kitty cannot tell thinking from
/// waiting, which is [`ActivityProbe::Unsupported`]; so is a window without
/// the `at_prompt` field (older kitty builds).
#[must_use]
pub fn activity_from_ls(data: &Value) -> ActivityProbe {
    let parsed;
    let tree = match data {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(_) => return ActivityProbe::Unsupported,
        },
        other => other,
    };

    let mut windows = tree
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|os_window| os_window.get("tabs")?.as_array())
        .flatten()
        .filter_map(|tab| tab.get("windows")?.as_array())
        .flatten();

    if windows.any(|window| window.get("at_prompt").and_then(Value::as_bool) == Some(true)) {
        ActivityProbe::Exited
    } else {
        ActivityProbe::Unsupported
    }
}
