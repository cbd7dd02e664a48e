//! Operation Engine (spec §4.1): the generic driver every multi-step control
//! operation is built on. Each operation is an `async fn` that chains calls
//! into this engine - the "single cooperative task that awaits at each QMI
//! exchange" form spec §9's design notes call out as an equally valid
//! alternative to a hand-rolled step-record/dispatcher, and the one Rust's
//! `async`/`.await` gives for free.

use tokio::time::Duration;

use crate::error::Error;
use crate::gateway::{ClientGateway, Transport};
use crate::qmi::{Indication, ProtocolError, Request, Response, Token};

/// Default per-step timeout used when a caller doesn't need a different one.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// The outcome of waiting for a correlated indication.
pub enum IndicationOutcome<I> {
    Received(I),
    /// The indication never arrived, but the step was run in
    /// `timeout-is-success` mode (spec §4.1 "silent reboot").
    TimedOutAsSuccess,
}

impl<I> IndicationOutcome<I> {
    pub fn received(self) -> Option<I> {
        match self {
            IndicationOutcome::Received(i) => Some(i),
            IndicationOutcome::TimedOutAsSuccess => None,
        }
    }
}

/// Drives request/response and request/indication dialogs for one in-flight
/// operation. Stateless beyond the gateway reference - "deterministic
/// teardown" falls out of normal Rust scoping: the indication subscription and
/// the timeout future are both dropped together when `request_with_indication`
/// returns, on every path (spec §4.1).
pub struct OperationEngine<'g, T: Transport> {
    gateway: &'g ClientGateway<T>,
}

impl<'g, T: Transport> OperationEngine<'g, T> {
    pub fn new(gateway: &'g ClientGateway<T>) -> Self {
        Self { gateway }
    }

    /// Allocate a token for a request this operation is about to correlate by
    /// indication (spec §4.1 "a 32-bit token the engine allocates").
    pub fn next_token(&self) -> Token {
        self.gateway.next_token()
    }

    /// A plain request/response step with a timeout, no indication involved.
    pub async fn request(&self, req: Request, timeout: Duration) -> Result<Response, Error> {
        self.gateway.request(req, timeout).await
    }

    /// Subscribe to the indication stream directly, for dialogs that must
    /// correlate more than one outstanding token at a time (spec §4.5 "Get-Config-Info").
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Indication> {
        self.gateway.subscribe()
    }

    /// A request that must be followed by a token-correlated indication
    /// before the step completes (spec §4.1, §5).
    ///
    /// `extract` is tried against every indication arriving on the bus;
    /// indications that don't carry a matching token are ignored silently
    /// (spec §8 invariant 5) rather than ending the wait.
    pub async fn request_with_indication<I>(
        &self,
        req: Request,
        timeout: Duration,
        token: Token,
        extract: impl Fn(Indication) -> Option<I>,
        timeout_is_success: bool,
    ) -> Result<IndicationOutcome<I>, Error> {
        // Subscribe before issuing the request: the subscription must be in
        // place before the timer is armed (spec §4.1).
        let mut indications = self.gateway.subscribe();
        self.gateway.request(req, timeout).await?;

        let wait_for_indication = async {
            loop {
                match indications.recv().await {
                    Ok(ind) if ind.token() == Some(token) => {
                        if let Some(out) = extract(ind) {
                            return out;
                        }
                        // Matching token, wrong shape: keep waiting rather
                        // than erroring - a protocol-layer mismatch, not a
                        // timeout.
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        std::future::pending::<()>().await;
                        unreachable!()
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait_for_indication).await {
            Ok(out) => Ok(IndicationOutcome::Received(out)),
            Err(_) if timeout_is_success => Ok(IndicationOutcome::TimedOutAsSuccess),
            Err(_) => Err(Error::aborted("timed out waiting for correlated indication")),
        }
        // `indications` (the subscription) and the timeout future are both
        // dropped here, on every path - deterministic teardown.
    }
}

/// Resolve a protocol error against the special-case recovery rules shared by
/// several operations (spec §6, §7): `no-effect` is treated as idempotent
/// success by Set-Technology-Preference and the GPS service-state calls.
pub fn is_no_effect(err: &Error) -> bool {
    matches!(err, Error::Protocol(ProtocolError::NoEffect))
}

/// `not-provisioned` means the default/built-in state is in use - an
/// empty-state success, not a failure (spec §7).
pub fn is_not_provisioned(err: &Error) -> bool {
    matches!(err, Error::Protocol(ProtocolError::NotProvisioned))
}

/// `not-supported` triggers the Carrier Config / Assistance Inject fallback
/// dialog (spec §7).
pub fn is_not_supported(err: &Error) -> bool {
    matches!(err, Error::Protocol(ProtocolError::NotSupported))
}
