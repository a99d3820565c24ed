//! Wire tokens exchanged between client and server.
//!
//! The protocol is a plain byte stream of UTF-8 text. Each token is one line;
//! peers may omit the trailing newline, so a single read can carry one bare
//! token, or several newline-separated tokens if writes were coalesced.
//! [`TokenDecoder`] reassembles lines that a read split in two.

use bytes::{Bytes, BytesMut};

use crate::constants::{MAX_LINE_LENGTH, PING, PONG};
use crate::error::{Error, Result};

/// A single decoded token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Liveness probe.
    Ping,
    /// Liveness reply.
    Pong,
    /// Any other text, relayed opaquely.
    Payload(String),
}

impl Token {
    /// Classify an already-trimmed line.
    pub fn from_line(line: &str) -> Self {
        match line {
            PING => Token::Ping,
            PONG => Token::Pong,
            other => Token::Payload(other.to_string()),
        }
    }

    /// Text form of the token (without line terminator).
    pub fn as_str(&self) -> &str {
        match self {
            Token::Ping => PING,
            Token::Pong => PONG,
            Token::Payload(text) => text,
        }
    }

    /// Encode the token as a newline-terminated line.
    pub fn encode(&self) -> Bytes {
        let text = self.as_str();
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        Bytes::from(line)
    }
}

/// Decode one read chunk into tokens.
///
/// Lines are trimmed and blank lines are skipped, so a chunk of pure
/// whitespace yields no tokens. Invalid UTF-8 is a codec error.
pub fn decode_chunk(chunk: &[u8]) -> Result<Vec<Token>> {
    let text = std::str::from_utf8(chunk).map_err(|e| Error::Codec {
        message: e.to_string(),
    })?;

    Ok(text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Token::from_line)
        .collect())
}

/// Per-connection decoder that keeps partial input between reads.
///
/// Until the peer sends its first newline every read is taken as complete
/// tokens, which is what bare `ping` writers need. From then on a trailing
/// partial line waits for the rest of its bytes. In both modes a UTF-8
/// sequence cut at the end of a read waits for the next one.
#[derive(Debug, Default)]
pub struct TokenDecoder {
    pending: BytesMut,
    line_framed: bool,
}

impl TokenDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read and return every token it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Token>> {
        self.pending.extend_from_slice(chunk);
        if !self.line_framed && chunk.contains(&b'\n') {
            self.line_framed = true;
        }

        let ready = if self.line_framed {
            match self.pending.iter().rposition(|b| *b == b'\n') {
                Some(end) => self.pending.split_to(end + 1),
                None => BytesMut::new(),
            }
        } else {
            let complete = complete_utf8_len(&self.pending)?;
            self.pending.split_to(complete)
        };

        if self.pending.len() > MAX_LINE_LENGTH {
            return Err(Error::Codec {
                message: format!("line longer than {MAX_LINE_LENGTH} bytes"),
            });
        }
        decode_chunk(&ready)
    }

    /// Bytes held back for the next read.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Length of the prefix that ends on a character boundary.
fn complete_utf8_len(bytes: &[u8]) -> Result<usize> {
    match std::str::from_utf8(bytes) {
        Ok(_) => Ok(bytes.len()),
        Err(e) if e.error_len().is_none() => Ok(e.valid_up_to()),
        Err(e) => Err(Error::Codec {
            message: e.to_string(),
        }),
    }
}
