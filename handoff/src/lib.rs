//! # Handoff - Cross-process transaction handoff
//!
//! Handoff lets one process begin a distributed transaction and a second, independently
//! launched process join that same transaction. The two never talk directly: the first
//! writes a propagation token into a shared token file, the second picks it up, does its
//! work inside the transaction and clears the file. Both then agree on one outcome.
//!
//! ## Roles
//!
//! The role of a process is decided once, at startup, from the token file:
//!
//! - **Outer**: no token pending. Begins the transaction, performs its write, publishes the
//!   token, waits (bounded) for it to be consumed, marks its scope complete and disposes it,
//!   which decides the outcome.
//! - **Inner**: a token is pending. Resumes the transaction, performs its write, clears the
//!   token, votes, and waits for the outcome before exiting.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use handoff::{HandoffConfig, SessionDriver};
//!
//! let config = HandoffConfig::builder()
//!     .work_dir("/tmp/handoff")
//!     .build()?;
//! let report = SessionDriver::new(config).run()?;
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Module Organization
//!
//! - [`channel`] - Token channel, propagation token and role detection
//! - [`common`] - Constants and shared utilities
//! - [`coordinator`] - Coordinator contract and the file-backed coordinator
//! - [`errors`] - Error types and result definitions
//! - [`handoff_builder`] - Configuration builder
//! - [`handoff_config`] - Configuration
//! - [`session`] - Transaction sessions, completion waiter and notifier, session driver
//! - [`store`] - Data store contract, file-backed store and the resource operation

pub mod channel;
pub mod common;
pub mod coordinator;
pub mod errors;
pub mod handoff_builder;
pub mod handoff_config;
pub mod session;
pub mod store;

pub use handoff_builder::HandoffBuilder;
pub use handoff_config::HandoffConfig;
pub use session::{RunReport, SessionDriver};
