use crate::{
    accumulator::Shared,
    batch::{Batch, Singleton, match_outputs},
    error::Error,
    handler::BatchHandler,
};
use std::sync::Arc;

/// Runs one closed batch through the handler and settles all its requests.
///
/// - On success, every request resolves with the output of its own item.
/// - On a handler error or contract violation, either every request is
///   rejected with that error, or, with fallback enabled, each distinct item
///   is retried alone and settles only its own requests.
///
/// There is no retry at the batch level and a failed singleton is final.
pub(crate) async fn process_batch<H: BatchHandler>(shared: Arc<Shared<H>>, batch: Batch<H>) {
    let outcome = match shared.handler.handle(batch.items()).await {
        Ok(outputs) => batch.match_outputs(outputs),
        Err(err) => Err(Error::handler(err)),
    };

    let err = match outcome {
        Ok(outputs) => {
            batch.resolve(outputs);
            return;
        }
        Err(err) => err,
    };

    shared.stats.record_batch_failure();

    if !shared.options.fallback_to_single_on_error {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            size = batch.len(),
            contract_violation = err.is_contract_violation(),
            "Batch failed, rejecting all requests"
        );
        batch.reject(&err);
        return;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        size = batch.len(),
        contract_violation = err.is_contract_violation(),
        "Batch failed, retrying items one by one"
    );
    drop(err);

    process_by_single_item(shared, batch).await;
}

/// Retries every item of a failed batch concurrently, each in its own task so
/// that one singleton cannot affect the outcome of another.
async fn process_by_single_item<H: BatchHandler>(shared: Arc<Shared<H>>, batch: Batch<H>) {
    let handles: Vec<_> = batch
        .into_singletons()
        .map(|singleton| tokio::spawn(process_singleton(Arc::clone(&shared), singleton)))
        .collect();

    for _res in futures::future::join_all(handles).await {
        // A panicking handler drops the singleton's responders, which its
        // submitters observe as a channel error.
        #[cfg(feature = "tracing")]
        if let Err(e) = _res {
            tracing::warn!("Singleton retry task failed: {e}");
        }
    }
}

async fn process_singleton<H: BatchHandler>(shared: Arc<Shared<H>>, singleton: Singleton<H>) {
    let items = core::slice::from_ref(&singleton.item);
    let outcome = match shared.handler.handle(items).await {
        Ok(mut outputs) => {
            match_outputs::<H>(items, &mut outputs).map(|mut v| v.swap_remove(0))
        }
        Err(err) => Err(Error::handler(err)),
    };

    if outcome.is_err() {
        shared.stats.record_singleton_failure();
    }
    singleton.settle(outcome);
}
