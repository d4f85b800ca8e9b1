use crate::{
    error::Error,
    handler::{BatchHandler, Outputs},
    request::{Request, Responder},
};
use std::collections::HashMap;

type Resp<H> = Responder<<H as BatchHandler>::Output, <H as BatchHandler>::Error>;
type HandlerError<H> = Error<<H as BatchHandler>::Error>;

/// A closed batch of requests, grouped by item value.
///
/// `items` holds each distinct item once, in order of first arrival, and
/// `waiters[i]` holds the responders of every request that carried
/// `items[i]`. The handler only ever sees `items`, so requests with equal
/// items are processed once and share the output.
pub(crate) struct Batch<H: BatchHandler> {
    items: Vec<H::Input>,
    waiters: Vec<Vec<Resp<H>>>,
    requests: usize,
}

impl<H: BatchHandler> Batch<H> {
    pub(crate) fn new(requests: Vec<Request<H::Input, H::Output, H::Error>>) -> Self {
        let total = requests.len();
        let mut index: HashMap<H::Input, usize> = HashMap::with_capacity(total);
        let mut items = Vec::with_capacity(total);
        let mut waiters: Vec<Vec<Resp<H>>> = Vec::with_capacity(total);

        for Request { item, responder } in requests {
            match index.get(&item) {
                Some(&slot) => waiters[slot].push(responder),
                None => {
                    index.insert(item.clone(), items.len());
                    items.push(item);
                    waiters.push(vec![responder]);
                }
            }
        }

        Self {
            items,
            waiters,
            requests: total,
        }
    }

    /// The distinct items handed to the handler.
    pub(crate) fn items(&self) -> &[H::Input] {
        &self.items
    }

    /// Number of requests in the batch, duplicates included.
    pub(crate) const fn len(&self) -> usize {
        self.requests
    }

    /// Maps `outputs` back onto the items of this batch.
    ///
    /// Nothing is resolved here, so a contract violation leaves every request
    /// pending for the failure path.
    pub(crate) fn match_outputs(
        &self,
        mut outputs: Outputs<H::Input, H::Output>,
    ) -> Result<Vec<H::Output>, HandlerError<H>> {
        match_outputs::<H>(&self.items, &mut outputs)
    }

    /// Resolves every request with the output at the same position as its
    /// item.
    pub(crate) fn resolve(self, outputs: Vec<H::Output>) {
        for (waiters, output) in self.waiters.into_iter().zip(outputs) {
            settle_group::<H>(waiters, Ok(output));
        }
    }

    /// Rejects every request with the same error.
    pub(crate) fn reject(self, err: &HandlerError<H>) {
        for waiters in self.waiters {
            settle_group::<H>(waiters, Err(err.clone()));
        }
    }

    /// Splits the batch into one singleton per distinct item.
    pub(crate) fn into_singletons(self) -> impl Iterator<Item = Singleton<H>> {
        self.items
            .into_iter()
            .zip(self.waiters)
            .map(|(item, waiters)| Singleton { item, waiters })
    }
}

/// One item of a failed batch, retried on its own.
pub(crate) struct Singleton<H: BatchHandler> {
    pub(crate) item: H::Input,
    waiters: Vec<Resp<H>>,
}

impl<H: BatchHandler> Singleton<H> {
    pub(crate) fn settle(self, res: Result<H::Output, HandlerError<H>>) {
        settle_group::<H>(self.waiters, res);
    }
}

/// Checks the handler's output against `items` and orders it like `items`.
pub(crate) fn match_outputs<H: BatchHandler>(
    items: &[H::Input],
    outputs: &mut Outputs<H::Input, H::Output>,
) -> Result<Vec<H::Output>, HandlerError<H>> {
    if outputs.len() != items.len() {
        return Err(Error::OutputCountMismatch {
            expected: items.len(),
            actual: outputs.len(),
        });
    }

    items
        .iter()
        .map(|item| outputs.remove(item).ok_or(Error::MissingOutput))
        .collect()
}

fn settle_group<H: BatchHandler>(
    mut waiters: Vec<Resp<H>>,
    res: Result<H::Output, HandlerError<H>>,
) {
    let Some(last) = waiters.pop() else {
        return;
    };
    for responder in waiters {
        let _ = responder.send(res.clone());
    }
    let _ = last.send(res);
}
