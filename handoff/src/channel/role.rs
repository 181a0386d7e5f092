use super::token::PropagationToken;
use super::token_channel::TokenChannel;
use crate::errors::HandoffResult;
use std::fmt::{Display, Formatter};

/// Part a process plays in the handoff, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Originates the transaction and drives the final decision
    Outer,
    /// Joins an existing transaction through a propagation token
    Inner,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Outer => write!(f, "outer"),
            Role::Inner => write!(f, "inner"),
        }
    }
}

/// Result of role detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Outer,
    /// Carries the decoded token the inner participant must import
    Inner(PropagationToken),
}

impl Assignment {
    pub fn role(&self) -> Role {
        match self {
            Assignment::Outer => Role::Outer,
            Assignment::Inner(_) => Role::Inner,
        }
    }
}

/// Derives the role from token-channel occupancy.
///
/// A pure function of channel state: no side effects beyond the read, so detecting twice
/// without an intervening write gives the same answer.
///
/// # Errors
/// `TokenDecodeError` if the channel holds content that is not a valid token. The caller
/// cannot tell which transaction to join and must not proceed.
pub fn detect_role(channel: &TokenChannel) -> HandoffResult<Assignment> {
    let assignment = match channel.peek()? {
        Some(token) => {
            log::info!("Found propagation token {}", token.to_base64());
            Assignment::Inner(token)
        }
        None => Assignment::Outer,
    };
    log::info!(
        "Token channel {} selects the {} role",
        channel.path().display(),
        assignment.role()
    );
    Ok(assignment)
}
