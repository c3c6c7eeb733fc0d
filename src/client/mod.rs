//! The line client.
//!
//! - Connects to the server, optionally waiting for it to come up
//! - Reads lines typed by the operator
//! - Sends each line and prints the server's reply

pub mod session;
pub mod socket;

pub use session::{Outcome, Session};
pub use socket::Connection;
