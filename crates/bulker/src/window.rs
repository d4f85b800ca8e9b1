//! Size- and time-triggered batch formation.
//!
//! [`BatchWindow`] is the open batch as a plain state machine. It is owned by
//! exactly one [`window_loop`] task, which is the only place requests are
//! appended and batches are closed, so both operations are atomic relative
//! to each other without any locking.

use crate::{
    accumulator::Shared,
    batch::Batch,
    dispatch::process_batch,
    error::Error,
    handler::BatchHandler,
    request::Request,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

/// The currently open batch and the deadline it closes at.
pub(crate) struct BatchWindow<R> {
    open: Vec<R>,
    deadline: Option<Instant>,
    max_batch_size: usize,
    window: Duration,
}

impl<R> BatchWindow<R> {
    pub(crate) fn new(max_batch_size: usize, window: Duration) -> Self {
        Self {
            open: Vec::with_capacity(max_batch_size),
            deadline: None,
            max_batch_size,
            window,
        }
    }

    /// Appends a request to the open batch.
    ///
    /// The first request starts the window timer. Returns the closed batch
    /// when this request fills it, leaving a fresh empty batch open.
    pub(crate) fn push(&mut self, request: R, now: Instant) -> Option<Vec<R>> {
        if self.open.is_empty() {
            self.deadline = Some(now + self.window);
        }
        self.open.push(request);

        if self.open.len() >= self.max_batch_size {
            self.take()
        } else {
            None
        }
    }

    /// Closes the open batch. Returns `None` if it is empty.
    pub(crate) fn take(&mut self) -> Option<Vec<R>> {
        self.deadline = None;
        if self.open.is_empty() {
            return None;
        }
        Some(core::mem::replace(
            &mut self.open,
            Vec::with_capacity(self.max_batch_size),
        ))
    }

    /// When the open batch is due, or `None` while it is empty.
    pub(crate) const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.open.len()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => core::future::pending().await,
    }
}

type HandlerRequest<H> =
    Request<<H as BatchHandler>::Input, <H as BatchHandler>::Output, <H as BatchHandler>::Error>;

/// Owner task of the open batch.
///
/// Receives requests until `shutdown` is cancelled or every sender is gone.
/// Closed batches are handed to their own dispatch task so that new batches
/// keep forming while earlier ones are processed. On exit, every request that
/// was not dispatched is rejected with [`Error::Shutdown`].
pub(crate) async fn window_loop<H: BatchHandler>(
    mut rx: mpsc::UnboundedReceiver<HandlerRequest<H>>,
    shared: Arc<Shared<H>>,
    shutdown: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Batch window started");

    let mut window = BatchWindow::new(
        shared.options.max_batch_size,
        shared.options.window,
    );

    loop {
        let deadline = window.deadline();

        // The timer is polled before the queue so a steady stream of
        // arrivals can never starve the time trigger.
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Batch window received shutdown signal");
                break;
            }
            () = sleep_until_deadline(deadline) => {
                if let Some(requests) = window.take() {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(size = requests.len(), "Window elapsed, closing batch");
                    dispatch(&shared, requests);
                }
            }
            msg = rx.recv() => match msg {
                Some(request) => {
                    if let Some(requests) = window.push(request, Instant::now()) {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(size = requests.len(), "Batch full, closing batch");
                        dispatch(&shared, requests);
                    }
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("All accumulator handles dropped");
                    break;
                }
            },
        }
    }

    // Nothing new can be enqueued past this point; settle what is left.
    rx.close();
    let mut rejected = 0_u64;
    if let Some(requests) = window.take() {
        for request in requests {
            request.reject(Error::Shutdown);
            rejected += 1;
        }
    }
    // `recv` only reports the end once no send is still in flight.
    while let Some(request) = rx.recv().await {
        request.reject(Error::Shutdown);
        rejected += 1;
    }
    shared.stats.record_rejected_on_shutdown(rejected);

    #[cfg(feature = "tracing")]
    tracing::debug!(rejected, "Batch window stopped");
}

fn dispatch<H: BatchHandler>(shared: &Arc<Shared<H>>, requests: Vec<HandlerRequest<H>>) {
    let batch = Batch::new(requests);
    shared.stats.record_batch(batch.len());
    tokio::spawn(process_batch(Arc::clone(shared), batch));
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn first_push_starts_the_timer() {
        let now = Instant::now();
        let mut window = BatchWindow::new(3, WINDOW);
        assert_eq!(window.deadline(), None);

        assert!(window.push(1, now).is_none());
        assert_eq!(window.deadline(), Some(now + WINDOW));

        // Later arrivals do not extend the window.
        assert!(window.push(2, now + Duration::from_millis(10)).is_none());
        assert_eq!(window.deadline(), Some(now + WINDOW));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn closes_when_full_and_reopens_empty() {
        let now = Instant::now();
        let mut window = BatchWindow::new(2, WINDOW);

        assert!(window.push('a', now).is_none());
        assert_eq!(window.push('b', now), Some(vec!['a', 'b']));
        assert_eq!(window.len(), 0);
        assert_eq!(window.deadline(), None);

        let later = now + Duration::from_millis(5);
        assert!(window.push('c', later).is_none());
        assert_eq!(window.deadline(), Some(later + WINDOW));
    }

    #[test]
    fn take_on_empty_window_is_none() {
        let mut window = BatchWindow::<u8>::new(4, WINDOW);
        assert_eq!(window.take(), None);
        assert_eq!(window.deadline(), None);
    }

    #[test]
    fn take_closes_partial_batch() {
        let now = Instant::now();
        let mut window = BatchWindow::new(4, WINDOW);
        window.push(1, now);
        window.push(2, now);
        assert_eq!(window.take(), Some(vec![1, 2]));
        assert_eq!(window.take(), None);
    }

    #[test]
    fn batch_size_of_one_dispatches_every_push() {
        let now = Instant::now();
        let mut window = BatchWindow::new(1, WINDOW);
        assert_eq!(window.push(1, now), Some(vec![1]));
        assert_eq!(window.push(2, now), Some(vec![2]));
        assert_eq!(window.deadline(), None);
    }
}
