use super::token::PropagationToken;
use crate::common::{read_bytes_if_exists, remove_if_exists, write_exclusive};
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use std::path::{Path, PathBuf};

/// One-slot mailbox holding at most one pending propagation token.
///
/// Backed by a single text file whose content is the base64 form of the token. Absence of
/// the file means "no pending token", which is also the consumption signal the outer
/// participant waits for.
///
/// # Discipline
/// - The outer participant is the only writer; [`TokenChannel::publish`] rejects a second
///   token while one is pending.
/// - The inner participant is the only reader and clearer.
/// - Clearing an empty channel is a no-op.
#[derive(Debug, Clone)]
pub struct TokenChannel {
    path: PathBuf,
}

impl TokenChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenChannel { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a token file is present, whatever its content.
    pub fn is_occupied(&self) -> HandoffResult<bool> {
        Ok(self.path.try_exists()?)
    }

    /// Writes `token` into the empty channel.
    ///
    /// The file appears with its full content in one step.
    ///
    /// # Errors
    /// `ChannelOccupied` if a token is already pending.
    pub fn publish(&self, token: &PropagationToken) -> HandoffResult<()> {
        let text = token.to_base64();
        if !write_exclusive(&self.path, text.as_bytes())? {
            log::error!(
                "Token channel {} already holds a pending token",
                self.path.display()
            );
            return Err(HandoffError::new(
                &format!(
                    "Token channel {} already holds a pending token",
                    self.path.display()
                ),
                ErrorKind::ChannelOccupied,
            ));
        }
        log::info!(
            "Wrote propagation token {} to {}",
            text,
            self.path.display()
        );
        Ok(())
    }

    /// Reads the pending token, if any, without consuming it.
    ///
    /// Blank content counts as no token.
    ///
    /// # Errors
    /// `TokenDecodeError` if the content is not a valid encoded token.
    pub fn peek(&self) -> HandoffResult<Option<PropagationToken>> {
        let text = match self.read_text()? {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Ok(None),
        };
        PropagationToken::from_base64(&text).map(Some).map_err(|e| {
            HandoffError::new_with_cause(
                &format!(
                    "Token channel {} holds malformed content",
                    self.path.display()
                ),
                ErrorKind::TokenDecodeError,
                e,
            )
        })
    }

    /// Empties the channel. Returns whether a token file was removed.
    pub fn clear(&self) -> HandoffResult<bool> {
        let removed = remove_if_exists(&self.path)?;
        if removed {
            log::debug!("Cleared token channel {}", self.path.display());
        }
        Ok(removed)
    }

    /// Empties the channel only while it still holds `token`.
    ///
    /// A token published by someone else in the meantime is left untouched.
    pub fn clear_if_holds(&self, token: &PropagationToken) -> HandoffResult<bool> {
        match read_bytes_if_exists(&self.path)? {
            Some(bytes) if bytes.trim_ascii() == token.to_base64().as_bytes() => self.clear(),
            _ => Ok(false),
        }
    }

    fn read_text(&self) -> HandoffResult<Option<String>> {
        match read_bytes_if_exists(&self.path)? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                HandoffError::new(
                    &format!(
                        "Token channel {} holds binary content: {}",
                        self.path.display(),
                        e
                    ),
                    ErrorKind::TokenDecodeError,
                )
            }),
            None => Ok(None),
        }
    }
}
