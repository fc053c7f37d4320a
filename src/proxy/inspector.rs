use std::{borrow::Cow, sync::Arc};

use crate::{
    config::{Rewrite, RewriteMode},
    error::DecodeError,
    internal,
};

/// Bytes read from one direction in a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk(Vec<u8>);

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Chunk {
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Interpret the chunk as text.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the chunk is not valid UTF-8.
    pub fn text(&self) -> Result<&str, DecodeError> {
        Ok(std::str::from_utf8(&self.0)?)
    }

    /// Does this chunk start with `command`, ignoring ASCII case?
    pub fn starts_with_command(&self, command: &str) -> bool {
        self.0
            .get(..command.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(command.as_bytes()))
    }
}

/// Per-session protocol state, and the rewrite applied to server replies.
///
/// Client chunks decide what happens to the next server chunk: an `EHLO`
/// arms the rewrite, a `QUIT` marks the session as terminating. Each flag
/// only reflects the most recent client chunk.
#[derive(Debug)]
pub struct Inspector {
    rewrite: Arc<Rewrite>,
    awaiting_auth_rewrite: bool,
    terminating: bool,
    /// Server bytes held back until a whole reply is available.
    held: Option<Vec<u8>>,
}

impl Inspector {
    pub const fn new(rewrite: Arc<Rewrite>) -> Self {
        Self {
            rewrite,
            awaiting_auth_rewrite: false,
            terminating: false,
            held: None,
        }
    }

    pub const fn awaiting_auth_rewrite(&self) -> bool {
        self.awaiting_auth_rewrite
    }

    pub const fn is_terminating(&self) -> bool {
        self.terminating
    }

    pub const fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    /// Inspect a chunk on its way to the server. It is always forwarded as-is.
    pub fn client_chunk(&mut self, chunk: Vec<u8>) -> Vec<u8> {
        let chunk = Chunk::from(chunk);

        self.awaiting_auth_rewrite = chunk.starts_with_command("ehlo");
        self.terminating = chunk.starts_with_command("quit");

        chunk.into_bytes()
    }

    /// Inspect a chunk on its way to the client, returning what to forward.
    ///
    /// An empty result means the bytes are being held until the rest of the
    /// reply arrives.
    pub fn server_chunk(&mut self, chunk: Vec<u8>) -> Vec<u8> {
        match self.rewrite.mode {
            RewriteMode::Chunk => self.rewrite_chunk(chunk),
            RewriteMode::Reply => self.rewrite_reply(chunk),
        }
    }

    /// Give up on any held reply, returning it untouched.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        self.held.take()
    }

    fn rewrite_chunk(&mut self, chunk: Vec<u8>) -> Vec<u8> {
        if std::mem::take(&mut self.awaiting_auth_rewrite) {
            self.apply(Chunk::from(chunk))
        } else {
            chunk
        }
    }

    fn rewrite_reply(&mut self, chunk: Vec<u8>) -> Vec<u8> {
        let mut held = match self.held.take() {
            Some(held) => held,
            None if std::mem::take(&mut self.awaiting_auth_rewrite) => Vec::new(),
            None => return chunk,
        };

        held.extend_from_slice(&chunk);

        if is_complete_reply(&held) {
            return self.apply(Chunk::from(held));
        }

        if held.len() > self.rewrite.max_reply_buffer {
            internal!(
                level = DEBUG,
                "Reply exceeded {} bytes without completing, forwarding unmodified",
                self.rewrite.max_reply_buffer
            );
            return held;
        }

        self.held = Some(held);
        Vec::new()
    }

    fn apply(&self, chunk: Chunk) -> Vec<u8> {
        let rewritten = match chunk.text() {
            Ok(text) => match self.rewrite.apply(text) {
                Cow::Owned(rewritten) => Some(rewritten),
                Cow::Borrowed(_) => None,
            },
            Err(err) => {
                internal!(level = DEBUG, "{}, forwarding unmodified", err);
                None
            }
        };

        match rewritten {
            Some(rewritten) => {
                internal!(
                    level = DEBUG,
                    "Rewrote '{}' to '{}'",
                    self.rewrite.find,
                    self.rewrite.replace
                );
                rewritten.into_bytes()
            }
            None => chunk.into_bytes(),
        }
    }
}

/// Whether `reply` ends with the final line of an SMTP reply (`250 ...`).
fn is_complete_reply(reply: &[u8]) -> bool {
    let Some(body) = reply.strip_suffix(b"\n") else {
        return false;
    };

    let last = body
        .iter()
        .rposition(|&byte| byte == b'\n')
        .map_or(body, |newline| &body[newline + 1..]);

    last.len() >= 3
        && last[..3].iter().all(u8::is_ascii_digit)
        && last.get(3).map_or(true, |&separator| separator == b' ' || separator == b'\r')
}
