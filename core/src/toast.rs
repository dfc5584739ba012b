use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{Toast, ToastVariant};

/// Oldest notifications are dropped past this many.
pub const TOAST_LIMIT: usize = 5;

#[derive(Default)]
struct ToastQueue {
    next_id: u64,
    toasts: Vec<Toast>,
}

/// Shared queue of user-visible notifications.
///
/// Cloning yields another handle to the same queue, so both views and the
/// shell rendering them see one list. At most [`TOAST_LIMIT`] are kept.
#[derive(Clone, Default)]
pub struct Toaster {
    inner: Arc<Mutex<ToastQueue>>,
}

impl Toaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, ToastQueue> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, title: &str, description: String, variant: ToastVariant) -> Toast {
        let mut queue = self.queue();
        queue.next_id += 1;
        let toast = Toast {
            id: queue.next_id,
            title: title.to_string(),
            description,
            variant,
        };
        queue.toasts.push(toast.clone());
        let overflow = queue.toasts.len().saturating_sub(TOAST_LIMIT);
        queue.toasts.drain(..overflow);
        toast
    }

    pub fn success(&self, title: &str, description: impl Into<String>) -> Toast {
        self.push(title, description.into(), ToastVariant::Default)
    }

    pub fn error(&self, title: &str, description: impl Into<String>) -> Toast {
        self.push(title, description.into(), ToastVariant::Destructive)
    }

    /// Report a failed remote call. The description is the full error chain.
    pub fn failure(&self, title: &str, err: &anyhow::Error) -> Toast {
        tracing::debug!(error = %format!("{err:#}"), "{title}");
        self.error(title, format!("{err:#}"))
    }

    /// Dismiss one toast. Returns false when it was already gone.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut queue = self.queue();
        let before = queue.toasts.len();
        queue.toasts.retain(|t| t.id != id);
        queue.toasts.len() != before
    }

    #[must_use]
    pub fn pending(&self) -> Vec<Toast> {
        self.queue().toasts.clone()
    }

    /// Take every pending toast, leaving the queue empty.
    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut self.queue().toasts)
    }
}
