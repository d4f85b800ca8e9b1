//! The caller-facing accumulator.
//!
//! An [`Accumulator`] owns a background window task that groups submissions
//! into batches, and hands each closed batch to its own dispatch task. The
//! only state shared between callers is the sending half of the window's
//! queue, so [`Accumulator::submit`] never blocks and never waits for a
//! batch to complete.

use crate::{
    error::{Error, OptionsError},
    handler::BatchHandler,
    options::AccumulatorOptions,
    request::{Request, Submission},
    stats::{AccumulatorStats, StatsSnapshot},
    window::window_loop,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;


/// State shared by the window task and every dispatch task.
pub(crate) struct Shared<H> {
    pub(crate) handler: H,
    pub(crate) options: AccumulatorOptions,
    pub(crate) stats: AccumulatorStats,
}

struct Inner<H: BatchHandler> {
    tx: mpsc::UnboundedSender<Request<H::Input, H::Output, H::Error>>,
    shared: Arc<Shared<H>>,
    shutdown: CancellationToken,
    window_task: Mutex<Option<JoinHandle<()>>>,
}

/// Coalesces single-item submissions into batched calls to a
/// [`BatchHandler`].
///
/// Cloning an `Accumulator` is cheap and every clone feeds the same batch
/// window. When the last clone is dropped, the window stops and any request
/// that was not dispatched yet is rejected with [`Error::Shutdown`].
///
/// # Example
///
/// ```
/// use bulker::{Accumulator, AccumulatorOptions, BatchHandler, Outputs};
/// use std::time::Duration;
///
/// struct Lookup;
///
/// impl BatchHandler for Lookup {
///     type Input = u64;
///     type Output = String;
///     type Error = std::io::Error;
///
///     async fn handle(&self, ids: &[u64]) -> Result<Outputs<u64, String>, Self::Error> {
///         Ok(ids.iter().map(|id| (*id, format!("user-{id}"))).collect())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = AccumulatorOptions::new()
///     .with_max_batch_size(32)
///     .with_window(Duration::from_millis(5));
/// let accumulator = Accumulator::new(Lookup, options)?;
///
/// let (a, b) = tokio::join!(accumulator.submit(1), accumulator.submit(2));
/// assert_eq!(a?, "user-1");
/// assert_eq!(b?, "user-2");
/// # Ok(())
/// # }
/// ```
pub struct Accumulator<H: BatchHandler> {
    inner: Arc<Inner<H>>,
}

impl<H: BatchHandler> Clone for Accumulator<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: BatchHandler> Accumulator<H> {
    /// Creates an accumulator and spawns its batch window task.
    ///
    /// # Errors
    ///
    /// Returns an [`OptionsError`] if `options` has a zero batch size or a
    /// zero window.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new(handler: H, options: AccumulatorOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self::spawn(handler, options))
    }

    /// Creates an accumulator with [`AccumulatorOptions::default`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn with_defaults(handler: H) -> Self {
        Self::spawn(handler, AccumulatorOptions::default())
    }

    fn spawn(handler: H, options: AccumulatorOptions) -> Self {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            max_batch_size = options.max_batch_size,
            window_ms = options.window.as_millis() as u64,
            fallback = options.fallback_to_single_on_error,
            "Starting accumulator"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            handler,
            options,
            stats: AccumulatorStats::default(),
        });

        let window_task = tokio::spawn(window_loop(rx, Arc::clone(&shared), shutdown.clone()));

        Self {
            inner: Arc::new(Inner {
                tx,
                shared,
                shutdown,
                window_task: Mutex::new(Some(window_task)),
            }),
        }
    }

    /// Submits one item and returns the future of its output.
    ///
    /// The item is enqueued before this method returns; the returned
    /// [`Submission`] only waits for the batch it ends up in.
    pub fn submit(&self, item: H::Input) -> Submission<H::Output, H::Error> {
        self.enqueue(item, None)
    }

    /// Like [`submit`](Self::submit), but the wait ends with
    /// [`Error::Cancelled`] as soon as `cancel` fires.
    ///
    /// Cancelling does not withdraw the item: it is still processed as part
    /// of its batch and sibling requests are unaffected.
    pub fn submit_with_cancel(
        &self,
        item: H::Input,
        cancel: CancellationToken,
    ) -> Submission<H::Output, H::Error> {
        self.enqueue(item, Some(cancel))
    }

    fn enqueue(
        &self,
        item: H::Input,
        cancel: Option<CancellationToken>,
    ) -> Submission<H::Output, H::Error> {
        if self.inner.shutdown.is_cancelled() {
            return Submission::rejected(Error::Shutdown);
        }

        let (request, submission) = Request::new(item, cancel);
        match self.inner.tx.send(request) {
            Ok(()) => self.inner.shared.stats.record_submitted(),
            // The window already stopped and will not drain this request.
            Err(mpsc::error::SendError(request)) => request.reject(Error::Shutdown),
        }
        submission
    }

    /// Stops the accumulator.
    ///
    /// New submissions resolve with [`Error::Shutdown`] right away, requests
    /// still waiting in the open batch are rejected with [`Error::Shutdown`],
    /// and batches that were already dispatched complete normally. Waits for
    /// the window task to finish; a concurrent second call returns without
    /// waiting.
    pub async fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        tracing::info!("Shutting down accumulator");
        self.inner.shutdown.cancel();

        let window_task = self.inner.window_task.lock().take();
        if let Some(handle) = window_task {
            if let Err(_e) = handle.await {
                #[cfg(feature = "tracing")]
                tracing::error!("Batch window task failed: {_e}");
            }
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Returns the options this accumulator was created with.
    pub fn options(&self) -> &AccumulatorOptions {
        &self.inner.shared.options
    }

    /// Returns the handler this accumulator dispatches to.
    pub fn handler(&self) -> &H {
        &self.inner.shared.handler
    }

    /// Returns a snapshot of this accumulator's counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.shared.stats.snapshot()
    }
}

/// A named interface over "submit one item, await its output".
///
/// Lets application code depend on the operation rather than on a concrete
/// [`Accumulator`] and its handler type, e.g. to substitute a test double.
pub trait Accumulate<I> {
    type Output;
    type Error;

    /// Enqueues `item` and returns the future of its output. `cancel`, when
    /// given, ends the wait early with [`Error::Cancelled`].
    fn execute(
        &self,
        item: I,
        cancel: Option<CancellationToken>,
    ) -> Submission<Self::Output, Self::Error>;
}

impl<H: BatchHandler> Accumulate<H::Input> for Accumulator<H> {
    type Output = H::Output;
    type Error = H::Error;

    fn execute(
        &self,
        item: H::Input,
        cancel: Option<CancellationToken>,
    ) -> Submission<Self::Output, Self::Error> {
        self.enqueue(item, cancel)
    }
}
