use super::{
    channel::Delivery,
    multiplexer::{Multiplexer, Ready},
};
use crate::engine::{
    service::aggregator::{Aggregator, Summary},
    telemetry::increment_worker_failures,
};

/// Drains `mux` into `aggregator` until every channel has resolved.
///
/// Successful records are forwarded to the aggregator. A channel that closes
/// early or delivers a malformed record is logged and counted as resolved
/// without contributing to the total. The loop ends on watch-set exhaustion
/// alone, so the number of successful results never decides termination.
pub async fn collect(mux: &mut Multiplexer, mut aggregator: Aggregator) -> Summary {
    while let Some(Ready {
        worker_id,
        delivery,
    }) = mux.select().await
    {
        match delivery {
            Delivery::Record(result) => {
                tracing::debug!(
                    worker_id,
                    partial_sum = result.partial_sum,
                    pending = mux.pending(),
                    "Worker reported"
                );
                aggregator.record(result);
            }
            Delivery::Failed(failure) => {
                tracing::warn!(worker_id, %failure, "Worker failed, excluding it from the total");
                increment_worker_failures();
                aggregator.fail(worker_id);
            }
        }
    }

    if !aggregator.is_complete() {
        tracing::error!(
            remaining = aggregator.remaining(),
            "Watch set exhausted with unresolved workers"
        );
    }

    aggregator.finish()
}
