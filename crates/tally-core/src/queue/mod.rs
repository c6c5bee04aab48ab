//! In-memory message queue: entry state, retry backoff and dead-lettering.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::{DeadLetter, InMemoryMessageQueue};
pub use record::EntryRecord;
pub use retry::RetryPolicy;
pub use state::EntryState;
