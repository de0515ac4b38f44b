//! Newline-delimited JSON framing.
//!
//! A byte stream is cut into records at each `\n`. [`LineBuffer`] holds the
//! partial tail between reads so callers can feed it whatever chunk sizes the
//! transport hands them. An optional `\r` before the newline is dropped.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Longest record accepted from a peer, terminator excluded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The record is not valid JSON or does not match any known message kind.
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer sent more than `MAX_LINE_LEN` bytes without a newline.
    #[error("line too long: {len} bytes (max {MAX_LINE_LEN})")]
    LineTooLong { len: usize },
}

/// Serializes `msg` as one newline-terminated record.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one record. Trailing line terminators are ignored.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, CodecError> {
    let record = line.trim_end_matches(['\r', '\n']);
    Ok(serde_json::from_str(record)?)
}

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Pops the next complete line without its terminator.
    ///
    /// Returns `Ok(None)` when no full line is buffered yet. Invalid UTF-8 is
    /// replaced rather than rejected here; such a line simply fails to decode.
    pub fn next_line(&mut self) -> Result<Option<String>, CodecError> {
        let Some(pos) = self.pending.iter().position(|&b| b == b'\n') else {
            if self.pending.len() > MAX_LINE_LEN {
                return Err(CodecError::LineTooLong {
                    len: self.pending.len(),
                });
            }
            return Ok(None);
        };

        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.len() > MAX_LINE_LEN {
            return Err(CodecError::LineTooLong { len: line.len() });
        }

        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Bytes received after the last complete line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
