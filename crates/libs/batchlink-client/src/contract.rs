use batchlink_protocol::{Batch, ErrorReport, Lambda, LogEntry};

use crate::error::ClientError;
use crate::feed::Subscription;
use crate::status::ClientStatus;

/// What a host process can do with a connection to the distribution service.
///
/// Submissions never block and never fail from the caller's side: they are
/// stamped with the next sequence number and queued for the connection's
/// driver. Failures surface on [`on_error`](Client::on_error) and
/// [`on_status`](Client::on_status).
pub trait Client: Send + Sync {
    /// Queue a produced batch for the service.
    fn submit_batch(&self, batch: Batch);

    /// Queue a lambda failure report.
    fn submit_error(&self, error: ErrorReport);

    fn submit_log_entry(&self, entry: LogEntry);

    /// Batches pushed by the service.
    fn on_batch(&self) -> Subscription<Batch>;

    fn on_error(&self) -> Subscription<ClientError>;

    /// Programs pushed by the service.
    fn on_lambda(&self) -> Subscription<Lambda>;

    /// Status transitions, starting with the current status.
    fn on_status(&self) -> Subscription<ClientStatus>;

    fn status(&self) -> ClientStatus;

    /// Tear the connection down. Only the first call has any effect.
    fn close(&self);
}
