//! Readiness multiplexer over many result channels.
//!
//! The coordinator registers one read end per worker and then repeatedly
//! calls [`Multiplexer::select`], which suspends until *some* channel has
//! resolved and hands back exactly one [`Ready`] for it. A resolved channel
//! leaves the watch set immediately, whether it delivered a record or failed,
//! so the loop ends once every channel has resolved:
//!
//! ```text
//! Idle -> Waiting --(a channel resolves)--> Dispatching -> Idle
//!   ^                                                       |
//!   +-------------------- watch set non-empty --------------+
//! ```
//!
//! Each read end is polled by its own future inside a [`FuturesUnordered`], so
//! a channel that becomes readable while another is being dispatched stays
//! ready until it is consumed on a later `select`.

use super::channel::{ChannelReadEnd, Delivery, Failure};
use futures::{
    StreamExt,
    future::BoxFuture,
    stream::FuturesUnordered,
};
use trisum_core::types::WorkerId;

/// One resolved channel.
#[derive(Debug)]
pub struct Ready {
    pub worker_id: WorkerId,
    pub delivery: Delivery,
}

/// The set of read ends still awaiting a result.
#[derive(Default)]
pub struct Multiplexer {
    watch: FuturesUnordered<BoxFuture<'static, Ready>>,
    registered: usize,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `worker_id`'s read end to the watch set.
    pub fn register(&mut self, worker_id: WorkerId, read_end: ChannelReadEnd) {
        self.registered += 1;
        self.watch.push(Box::pin(async move {
            let delivery = match read_end.read_record().await {
                Delivery::Record(result) if result.worker_id != worker_id => {
                    Delivery::Failed(Failure::WrongWorker(result.worker_id))
                }
                delivery => delivery,
            };
            Ready {
                worker_id,
                delivery,
            }
        }));
    }

    /// Waits until any registered channel resolves.
    ///
    /// There is no timeout: a worker that neither writes nor closes its
    /// channel blocks this call forever. Returns `None` once the watch set is
    /// empty.
    pub async fn select(&mut self) -> Option<Ready> {
        self.watch.next().await
    }

    /// Channels that have not resolved yet.
    pub fn pending(&self) -> usize {
        self.watch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watch.is_empty()
    }

    /// Channels registered over the multiplexer's lifetime.
    pub const fn registered(&self) -> usize {
        self.registered
    }
}
