use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt::{Debug, Formatter};

/// Opaque exported identity of an in-flight transaction.
///
/// Produced by a coordinator's export and consumed by its import; the bytes mean nothing
/// to the handoff protocol itself. Crosses the process boundary as base64 text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PropagationToken {
    bytes: Vec<u8>,
}

impl PropagationToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        PropagationToken { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Text representation written to the token channel.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Decodes the text representation read from the token channel.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    /// `TokenDecodeError` if the text is empty or not valid base64.
    pub fn from_base64(text: &str) -> HandoffResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(HandoffError::new(
                "Propagation token is empty",
                ErrorKind::TokenDecodeError,
            ));
        }
        let bytes = STANDARD.decode(trimmed)?;
        if bytes.is_empty() {
            return Err(HandoffError::new(
                "Propagation token decodes to no bytes",
                ErrorKind::TokenDecodeError,
            ));
        }
        Ok(PropagationToken { bytes })
    }
}

impl Debug for PropagationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PropagationToken({})", self.to_base64())
    }
}
