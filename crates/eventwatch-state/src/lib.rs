//! eventwatch-state — persisted function status history.
//!
//! Backed by [redb](https://docs.rs/redb). Every reconciliation pass
//! appends one `StatusRecord` per live function; the newest row per
//! function is its latest status and older rows are kept as history
//! until the function disappears from the live set.
//!
//! # Layout
//!
//! Rows are JSON-serialized into a single `&str → &[u8]` table. Keys are
//! `{function}\0{timestamp_ms:020}\0{seq:020}` (timestamp with its sign
//! bit flipped so pre-1970 rows still sort first), so a prefix range scan
//! returns one function's history in timestamp order and the last entry
//! of that range is the latest record.
//!
//! Function names must not contain NUL.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{StateStore, StatusStore};
