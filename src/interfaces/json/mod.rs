//! JSON wire formats used at the process boundary.

pub mod outbox;
pub mod queue_batch;
pub mod stream_batch;
