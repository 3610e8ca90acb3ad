//! Daemon subsystem: main loop, signal handling and the shared state file.

#[cfg(feature = "daemon")]
pub mod loop_main;
#[cfg(feature = "daemon")]
pub mod signals;
pub mod state;
