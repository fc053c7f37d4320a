use std::borrow::Cow;

use serde::Deserialize;

/// How server replies are framed before the capability rewrite is applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Rewrite the first chunk read from the server after an EHLO, as-is.
    ///
    /// A capability line split across two reads will not be rewritten.
    #[default]
    Chunk,
    /// Hold server bytes after an EHLO until the full reply has arrived,
    /// then rewrite it in one go.
    Reply,
}

/// The substitution applied to the EHLO reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rewrite {
    #[serde(default = "defaults::find")]
    pub find: String,

    #[serde(default = "defaults::replace")]
    pub replace: String,

    #[serde(default)]
    pub mode: RewriteMode,

    /// Upper bound on bytes held while waiting for a full reply.
    ///
    /// Only used in [`RewriteMode::Reply`]. Once exceeded the held bytes are
    /// forwarded untouched.
    #[serde(default = "defaults::max_reply_buffer")]
    pub max_reply_buffer: usize,
}

impl Default for Rewrite {
    fn default() -> Self {
        Self {
            find: defaults::find(),
            replace: defaults::replace(),
            mode: RewriteMode::default(),
            max_reply_buffer: defaults::max_reply_buffer(),
        }
    }
}

impl Rewrite {
    /// Replace the first exact occurrence of `find` in `text`.
    ///
    /// Returns [`Cow::Borrowed`] when there was nothing to replace.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.find.is_empty() || !text.contains(self.find.as_str()) {
            return Cow::Borrowed(text);
        }

        Cow::Owned(text.replacen(self.find.as_str(), &self.replace, 1))
    }
}

mod defaults {
    pub fn find() -> String {
        "250-AUTH PLAIN".to_string()
    }

    pub fn replace() -> String {
        "250-AUTH PLAIN LOGIN".to_string()
    }

    pub const fn max_reply_buffer() -> usize {
        64 * 1024
    }
}
