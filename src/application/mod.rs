//! Application layer containing the voucher authorization workflow.
//!
//! A voucher table change is routed by the `ChangeDispatcher` either to the
//! authorization queue, consumed by the `AuthorizationWorker`, or to the status
//! topic through the `NotificationPublisher`. The `batch` module wraps both
//! consumers with partial-batch failure reporting.

pub mod batch;
pub mod dispatcher;
pub mod publisher;
pub mod worker;
