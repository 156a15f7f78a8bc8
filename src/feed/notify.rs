use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Success,
    Failure,
}

/// Fire-and-forget user notifications (toasts).
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotifyKind, title: &str, message: &str);
}

/// Notifier that writes to the log; used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotifyKind, title: &str, message: &str) {
        match kind {
            NotifyKind::Success => info!(title, message, "notification"),
            NotifyKind::Failure => warn!(title, message, "notification"),
        }
    }
}
