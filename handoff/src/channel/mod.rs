//! Token channel: the one-slot mailbox shared by the two participants, the token it
//! carries, and the role detection built on its occupancy.

pub mod role;
pub mod token;
pub mod token_channel;

pub use role::{detect_role, Assignment, Role};
pub use token::PropagationToken;
pub use token_channel::TokenChannel;
