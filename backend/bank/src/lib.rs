//! # Bank
//!
//! Everything the server and the seeder share.
//!
//! ## Collections
//! - `users`: one [`accounts::Account`] per registered user, keyed by uid
//! - `surveys`: [`surveys::Survey`] documents, keyed by a random id
//! - `credentials` / `sessions`: owned by the server's auth module
//!
//! ## Flow
//! Reads and writes go straight to the [`store::Database`]. The UI re-reads or
//! subscribes to see the result. There is no queueing or batching beyond what
//! a single store call does atomically.
pub mod accounts;
pub mod payloads;
pub mod plans;
pub mod seed;
pub mod store;
pub mod surveys;

pub use payloads::get_answer_from_bytes;
