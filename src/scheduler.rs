//! Frame-batched event delivery.
//!
//! Every store shares one pending queue. The first emit after a flush asks the
//! host for a frame; the host calls [`EventScheduler::flush`] when that frame
//! arrives. Whatever was enqueued in between is delivered in one pass, in
//! enqueue order. Events emitted by consumers during a flush wait for the
//! following frame.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::event::ChangeEvent;
use crate::registry::SubscriptionRegistry;

type FrameRequester = Box<dyn Fn()>;

struct Queued {
    registry: Weak<SubscriptionRegistry>,
    event: ChangeEvent,
}

#[derive(Default)]
pub struct EventScheduler {
    queue: RefCell<VecDeque<Queued>>,
    frame_pending: Cell<bool>,
    requester: RefCell<Option<FrameRequester>>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the callback that asks the host for the next frame.
    ///
    /// Without one, frames are driven entirely by calling `flush` (tests,
    /// headless rendering).
    pub fn set_frame_requester<F>(&self, requester: F)
    where
        F: Fn() + 'static,
    {
        *self.requester.borrow_mut() = Some(Box::new(requester));
    }

    pub fn emit(&self, registry: &Rc<SubscriptionRegistry>, event: ChangeEvent) {
        trace!(path = %event.path, kind = ?event.kind, "enqueue");
        self.queue.borrow_mut().push_back(Queued {
            registry: Rc::downgrade(registry),
            event,
        });

        if !self.frame_pending.replace(true) {
            if let Some(request) = self.requester.borrow().as_ref() {
                request();
            }
        }
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending.get()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Drain the queue once. Returns the number of events delivered.
    pub fn flush(&self) -> usize {
        self.frame_pending.set(false);
        let batch = std::mem::take(&mut *self.queue.borrow_mut());
        if batch.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for Queued { registry, event } in batch {
            // registry discarded by a torn-down component
            let Some(registry) = registry.upgrade() else {
                continue;
            };
            registry.notify(&event);
            delivered += 1;
        }
        debug!(delivered, deferred = self.pending_len(), "flush");
        delivered
    }
}
