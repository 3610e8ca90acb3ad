//! Activity logging: JSONL writer plus the background logger thread.

pub mod activity;
pub mod jsonl;
