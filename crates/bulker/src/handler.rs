use core::hash::Hash;
use std::{collections::HashMap, future::Future, sync::Arc};

/// Outputs of one handler call, keyed by the input item they belong to.
pub type Outputs<I, O> = HashMap<I, O>;

/// User-supplied bulk operation run by an [`Accumulator`](crate::Accumulator).
///
/// The handler receives the distinct items of one batch in arrival order and
/// must return exactly one output per item. Returning fewer or more entries,
/// or entries for items that were not submitted, is a contract violation and
/// fails the batch like a handler error would.
///
/// The same handler is called again with single-item slices when a batch
/// fails and the accumulator is configured to fall back to per-item
/// processing.
///
/// # Example
///
/// ```
/// use bulker::{BatchHandler, Outputs};
///
/// struct Square;
///
/// impl BatchHandler for Square {
///     type Input = u32;
///     type Output = u64;
///     type Error = std::convert::Infallible;
///
///     async fn handle(&self, items: &[u32]) -> Result<Outputs<u32, u64>, Self::Error> {
///         Ok(items.iter().map(|&x| (x, u64::from(x) * u64::from(x))).collect())
///     }
/// }
/// ```
pub trait BatchHandler: Send + Sync + 'static {
    /// The per-request input. Outputs are matched back to requests by value.
    type Input: Eq + Hash + Clone + Send + Sync + 'static;
    /// The per-request output. Cloned when several requests carry equal
    /// items.
    type Output: Clone + Send + 'static;
    /// The error raised when a batch cannot be processed.
    type Error: Send + Sync + 'static;

    /// Processes one batch of items.
    fn handle(
        &self,
        items: &[Self::Input],
    ) -> impl Future<Output = Result<Outputs<Self::Input, Self::Output>, Self::Error>> + Send;
}

impl<H: BatchHandler> BatchHandler for Arc<H> {
    type Input = H::Input;
    type Output = H::Output;
    type Error = H::Error;

    fn handle(
        &self,
        items: &[Self::Input],
    ) -> impl Future<Output = Result<Outputs<Self::Input, Self::Output>, Self::Error>> + Send {
        (**self).handle(items)
    }
}
