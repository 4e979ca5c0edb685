//! Remote command channel for operant panel nodes.
//!
//! Everything the reconciler knows about the outside world goes through
//! [`RemoteChannel::execute`]: run one shell command on one host, get its
//! stdout lines and exit status back.
//!
//! - [`SshChannel`] reaches nodes with `ssh`, either directly or by hopping
//!   through a gateway host ([`Topology`]).
//! - [`InMemoryChannel`] simulates a fleet for tests and dry runs.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod channel;
pub mod error;
pub mod memory;
pub mod quote;
pub mod ssh;

pub use channel::{CommandOutput, RemoteChannel};
pub use error::{RemoteError, Result};
pub use memory::{InMemoryChannel, SimProcess};
pub use quote::shell_quote;
pub use ssh::{SshChannel, SshOptions, Topology};
