//! Listener dispatch: per-stream and global listener sets, executed in
//! registration order, with isolation between listeners — a panicking
//! listener never stops the rest from running.

use kei_stream_core::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type ListenerFn = dyn Fn(&Frame) + Send + Sync + 'static;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ListenerEntry {
    pub id: u64,
    pub func: Arc<ListenerFn>,
}

impl ListenerEntry {
    pub fn new(func: Arc<ListenerFn>) -> Self {
        Self {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            func,
        }
    }
}

/// Invoke `entries` in registration order; a listener that panics is caught
/// and logged, and does not prevent the remaining listeners from running.
pub(crate) fn dispatch_to(entries: &[ListenerEntry], frame: &Frame) {
    for entry in entries {
        let func = entry.func.clone();
        let frame_ref = frame;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| func(frame_ref)));
        if let Err(panic) = result {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "listener panicked".to_string());
            tracing::warn!(listener_id = entry.id, error = %msg, "listener panicked; remaining listeners still run");
        }
    }
}

/// Scoped handle returned by listener registration. Dropping it removes the
/// listener (and prunes the owning set if it becomes empty) via a
/// fire-and-forget command to the owning client actor.
pub struct ListenerHandle {
    pub(crate) id: u64,
    pub(crate) remove: Box<dyn FnOnce(u64) + Send>,
    pub(crate) armed: bool,
}

impl ListenerHandle {
    pub(crate) fn new(id: u64, remove: impl FnOnce(u64) + Send + 'static) -> Self {
        Self {
            id,
            remove: Box::new(remove),
            armed: true,
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.armed {
            let remove = std::mem::replace(&mut self.remove, Box::new(|_| {}));
            remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kei_stream_core::FrameKind;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listener_panic_does_not_block_others() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let entries = vec![
            ListenerEntry::new(Arc::new(move |_f: &Frame| panic!("boom"))),
            ListenerEntry::new(Arc::new(move |_f: &Frame| {
                ran2.fetch_add(1, Ordering::SeqCst);
            })),
        ];
        let frame = Frame::new(FrameKind::Status, "s1");
        dispatch_to(&entries, &frame);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_drop_invokes_removal() {
        let removed = Arc::new(AtomicUsize::new(0));
        let removed2 = removed.clone();
        {
            let _handle = ListenerHandle::new(7, move |id| {
                assert_eq!(id, 7);
                removed2.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }
}
