//! QMI Client Gateway (spec §4, component table: "thin façade over the
//! transport"). Generic over the transport implementation the same way the
//! teacher's `Runner<'d, AT: AtatClient, ...>` is generic over its AT client,
//! rather than a boxed trait object - the set of transports is closed per
//! process and static dispatch avoids the allocation async trait objects need.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::error::Error;
use crate::qmi::{Indication, Request, Response, Token};

/// The raw QMI transport this core sits above (spec §1: framing, message
/// serialization and service client allocation are out of scope - only this
/// interface is).
pub trait Transport: Send + Sync {
    /// Issue a request and await its response. Resolves only once the
    /// transport has a result for this exact call; does not itself enforce a
    /// timeout - that is the gateway's job.
    fn call(&self, req: Request) -> impl Future<Output = Result<Response, Error>> + Send;

    /// A broadcast stream of every indication the transport delivers,
    /// independent of which request (if any) triggered it.
    fn subscribe(&self) -> broadcast::Receiver<Indication>;
}

pub struct ClientGateway<T: Transport> {
    transport: T,
    next_token: AtomicU32,
}

impl<T: Transport> ClientGateway<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_token: AtomicU32::new(1),
        }
    }

    /// Allocate the next 32-bit correlation token. Tokens are never reused for
    /// distinct in-flight requests against the same client (spec §5).
    pub fn next_token(&self) -> Token {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Issue a request with a timeout, delivering a typed response (spec §4.1
    /// "issue a request with a timeout").
    pub async fn request(&self, req: Request, timeout: Duration) -> Result<Response, Error> {
        tokio::time::timeout(timeout, self.transport.call(req))
            .await
            .map_err(|_| Error::aborted("timed out waiting for response"))?
    }

    /// Subscribe to the indication stream (spec §4.1 "subscribe to a named
    /// indication on a given client").
    pub fn subscribe(&self) -> broadcast::Receiver<Indication> {
        self.transport.subscribe()
    }
}
