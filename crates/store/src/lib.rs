//! Relational persistence for the zipsa runtime.
//!
//! One SQLite database holds sessions, chat history, the summary cache,
//! checkpoints, and long-term conversation memories. The `Store` is the
//! single connection owner; callers share it behind an `Arc`.

mod checkpoints;
mod db;
mod memories;
mod messages;
mod schema;
mod sessions;

pub use checkpoints::CheckpointRow;
pub use db::Store;
pub use memories::MemoryRow;
pub use messages::MessageRow;
pub use sessions::SessionRow;
