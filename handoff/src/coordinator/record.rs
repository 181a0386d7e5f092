//! Records the file coordinator persists under its address, and the payload carried inside
//! a propagation token.

use super::core::{IsolationLevel, TransactionOutcome, Vote};
use crate::common::TOKEN_FORMAT_VERSION;
use crate::errors::{ErrorKind, HandoffError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for token payload encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenCodecError {
    /// Encoding the payload failed
    #[error("Token payload serialization failed: {0}")]
    SerializationError(String),
    /// The bytes are not a token payload
    #[error("Token payload deserialization failed: {0}")]
    DeserializationError(String),
    /// The payload was written by an incompatible format version
    #[error("Unsupported token format version {0}")]
    UnsupportedVersion(u8),
}

impl From<TokenCodecError> for HandoffError {
    fn from(err: TokenCodecError) -> Self {
        HandoffError::new(&err.to_string(), ErrorKind::EncodingError)
    }
}

pub type TokenCodecResult<T> = Result<T, TokenCodecError>;

/// Upper bound on an encoded payload; a claimed length past it is rejected before allocating.
pub const TOKEN_PAYLOAD_LIMIT: usize = 4096;

/// What a propagation token says about its transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub version: u8,
    pub transaction_id: u128,
    pub address: String,
    pub isolation_level: IsolationLevel,
    pub deadline_millis: i64,
}

impl TokenPayload {
    pub fn new(
        transaction_id: Uuid,
        address: String,
        isolation_level: IsolationLevel,
        deadline: DateTime<Utc>,
    ) -> Self {
        TokenPayload {
            version: TOKEN_FORMAT_VERSION,
            transaction_id: transaction_id.as_u128(),
            address,
            isolation_level,
            deadline_millis: deadline.timestamp_millis(),
        }
    }

    pub fn transaction_id(&self) -> Uuid {
        Uuid::from_u128(self.transaction_id)
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.deadline_millis).single()
    }

    pub fn encode(&self) -> TokenCodecResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TokenCodecError::SerializationError(e.to_string()))
    }

    /// Decodes a payload, rejecting trailing bytes and unknown versions.
    pub fn decode(bytes: &[u8]) -> TokenCodecResult<Self> {
        let (payload, read): (TokenPayload, usize) =
            bincode::serde::decode_from_slice(
                bytes,
                bincode::config::standard().with_limit::<TOKEN_PAYLOAD_LIMIT>(),
            )
                .map_err(|e| TokenCodecError::DeserializationError(e.to_string()))?;
        if read != bytes.len() {
            return Err(TokenCodecError::DeserializationError(format!(
                "{} trailing bytes after payload",
                bytes.len() - read
            )));
        }
        if payload.version != TOKEN_FORMAT_VERSION {
            return Err(TokenCodecError::UnsupportedVersion(payload.version));
        }
        Ok(payload)
    }
}

/// Written once by the root when the transaction begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub isolation_level: IsolationLevel,
    pub timeout_millis: u64,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub root_pid: u32,
}

/// Written by a participant when it joins, rewritten when it votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: Uuid,
    pub pid: u32,
    pub joined_at: DateTime<Utc>,
    pub vote: Vote,
    pub voted_at: Option<DateTime<Utc>>,
}

/// The single, final decision. Created exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub outcome: TransactionOutcome,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub reason: String,
}
