use crate::error::{Error, Result};
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use pin_project_lite::pin_project;
use std::future::Future;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Sending half of a request's single-assignment result slot.
pub(crate) type Responder<O, E> = oneshot::Sender<Result<O, E>>;

/// A submitted item together with the slot its result is delivered to.
///
/// A request enters exactly one batch and its responder is consumed exactly
/// once, either by the bulk call of that batch or by its singleton retry.
pub(crate) struct Request<I, O, E> {
    pub(crate) item: I,
    pub(crate) responder: Responder<O, E>,
}

impl<I, O, E> Request<I, O, E> {
    /// Creates a request and the future its submitter waits on.
    pub(crate) fn new(item: I, cancel: Option<CancellationToken>) -> (Self, Submission<O, E>) {
        let (responder, rx) = oneshot::channel();
        (Self { item, responder }, Submission::new(rx, cancel))
    }

    /// Rejects the request with `err`.
    pub(crate) fn reject(self, err: Error<E>) {
        // The submitter may have stopped waiting; nothing to report then.
        let _ = self.responder.send(Err(err));
    }
}

pin_project! {
    /// The pending result of one [`Accumulator::submit`] call.
    ///
    /// Resolves with the output the batch handler produced for the submitted
    /// item, with the [`Error`] that failed it, or with [`Error::Cancelled`]
    /// once the cancellation token given at submission fires. Cancelling (or
    /// dropping) a `Submission` only stops the wait: the item stays in its
    /// batch and is still handed to the handler.
    ///
    /// [`Accumulator::submit`]: crate::Accumulator::submit
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Submission<O, E> {
        #[pin]
        rx: oneshot::Receiver<Result<O, E>>,
        #[pin]
        cancelled: Option<WaitForCancellationFutureOwned>,
    }
}

impl<O, E> Submission<O, E> {
    fn new(rx: oneshot::Receiver<Result<O, E>>, cancel: Option<CancellationToken>) -> Self {
        Self {
            rx,
            cancelled: cancel.map(CancellationToken::cancelled_owned),
        }
    }

    /// A submission that is already settled with `err`.
    pub(crate) fn rejected(err: Error<E>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(rx, None)
    }
}

impl<O, E> Future for Submission<O, E> {
    type Output = Result<O, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        // A delivered result wins over a cancellation that fired at the same
        // time.
        if let Poll::Ready(res) = this.rx.poll(cx) {
            return Poll::Ready(res.unwrap_or_else(|_| {
                Err(Error::ChannelError {
                    context: "result slot dropped before the request was settled".to_string(),
                })
            }));
        }

        if let Some(cancelled) = this.cancelled.as_pin_mut() {
            if cancelled.poll(cx).is_ready() {
                return Poll::Ready(Err(Error::Cancelled));
            }
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_with_sent_value() {
        let (req, submission) = Request::<u32, &str, ()>::new(1, None);
        assert_eq!(req.item, 1);
        req.responder.send(Ok("one")).unwrap();
        assert_eq!(submission.await.unwrap(), "one");
    }

    #[tokio::test]
    async fn dropped_responder_is_a_channel_error() {
        let (req, submission) = Request::<u32, u32, ()>::new(1, None);
        drop(req);
        assert!(matches!(
            submission.await,
            Err(Error::ChannelError { .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait() {
        let token = CancellationToken::new();
        let (req, submission) = Request::<u32, u32, ()>::new(1, Some(token.clone()));
        token.cancel();
        assert!(matches!(submission.await, Err(Error::Cancelled)));

        // The request itself is untouched and can still be settled.
        req.reject(Error::Shutdown);
    }

    #[tokio::test]
    async fn settled_result_wins_over_cancellation() {
        let token = CancellationToken::new();
        let (req, submission) = Request::<u32, u32, ()>::new(1, Some(token.clone()));
        req.responder.send(Ok(7)).unwrap();
        token.cancel();
        assert_eq!(submission.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn rejected_submission_is_ready() {
        let submission = Submission::<u32, ()>::rejected(Error::Shutdown);
        assert!(matches!(submission.await, Err(Error::Shutdown)));
    }
}
