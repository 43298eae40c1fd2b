//! Client half of a streaming delivery session.
//!
//! [`ObjectSession::open`] starts one `GetObjectStream` call and splits it
//! into a [`SessionSender`] and a [`SessionReceiver`] so identifiers can be
//! pushed while responses are drained on another task. Both halves share one
//! [`SessionState`]; whichever half observes a failure closes the session for
//! the other.

use futures::{FutureExt, StreamExt};
use objwire_core::{
    Error, Result, SessionEvent, SessionPhase, SessionState,
    proto::{ObjectIdentifier, ObjectResponse, object_accessor_client::ObjectAccessorClient},
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Status, Streaming, transport::Channel};

/// Outcome of a non-blocking receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveStatus {
    /// The next response, in request order.
    Received { response: ObjectResponse },
    /// Nothing buffered yet; the session is still live.
    Pending,
    /// End-of-stream was observed or the session aborted.
    Closed,
}

#[derive(Clone, Debug, Default)]
struct SharedState(Arc<Mutex<SessionState>>);

impl SharedState {
    fn apply(&self, event: SessionEvent) -> Result<SessionPhase> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(event)
    }

    fn snapshot(&self) -> SessionState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort(&self) {
        let _ = self.apply(SessionEvent::Aborted);
    }
}

pub struct ObjectSession;

impl ObjectSession {
    /// Opens a streaming call on `client`.
    ///
    /// `buffer` bounds how many identifiers may be queued ahead of the
    /// transport before [`SessionSender::send`] waits.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`Status`] if the server rejects the call.
    pub async fn open(
        client: &mut ObjectAccessorClient<Channel>,
        buffer: usize,
    ) -> Result<(SessionSender, SessionReceiver)> {
        let (req_tx, req_rx) = mpsc::channel::<ObjectIdentifier>(buffer.max(1));
        let inbound = client
            .get_object_stream(ReceiverStream::new(req_rx))
            .await?
            .into_inner();

        let state = SharedState::default();
        Ok((
            SessionSender {
                req_tx: Some(req_tx),
                state: state.clone(),
            },
            SessionReceiver { inbound, state },
        ))
    }
}

/// Request side of a session.
#[derive(Debug)]
pub struct SessionSender {
    req_tx: Option<mpsc::Sender<ObjectIdentifier>>,
    state: SharedState,
}

impl SessionSender {
    /// Queues one identifier.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] after [`Self::close_send`] or once the
    ///   session has aborted.
    /// - [`Error::StreamAborted`] if the transport dropped the request stream;
    ///   the session is closed afterwards.
    pub async fn send(&mut self, identifier: ObjectIdentifier) -> Result<()> {
        let Some(req_tx) = &self.req_tx else {
            return Err(Error::SessionClosed);
        };
        self.state.apply(SessionEvent::IdentifierReceived)?;

        if req_tx.send(identifier).await.is_err() {
            self.state.abort();
            self.req_tx = None;
            return Err(Error::stream_aborted("request stream closed by transport"));
        }
        Ok(())
    }

    /// Signals end-of-input. Identifiers already sent are still answered.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] if input was already closed or the session
    /// aborted.
    pub fn close_send(&mut self) -> Result<()> {
        let res = self.state.apply(SessionEvent::EndOfInput);
        self.req_tx = None;
        res.map(|_| ())
    }

    pub fn state(&self) -> SessionState {
        self.state.snapshot()
    }
}

/// Response side of a session.
pub struct SessionReceiver {
    inbound: Streaming<ObjectResponse>,
    state: SharedState,
}

impl SessionReceiver {
    /// Returns the next response if one is already buffered.
    ///
    /// # Errors
    ///
    /// Same as [`Self::receive`].
    pub fn try_receive(&mut self) -> Result<ReceiveStatus> {
        if self.state.snapshot().is_closed() {
            return Ok(ReceiveStatus::Closed);
        }

        match self.inbound.next().now_or_never() {
            None => Ok(ReceiveStatus::Pending),
            Some(next) => Ok(match self.observe(next.transpose())? {
                Some(response) => ReceiveStatus::Received { response },
                None => ReceiveStatus::Closed,
            }),
        }
    }

    /// Waits for the next response. `None` marks end-of-stream, after which
    /// the session is closed.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] once the session is closed.
    /// - [`Error::StreamAborted`] (or [`Error::ContentUnavailable`]) when the
    ///   server terminated the call with an error status.
    /// - [`Error::ProtocolViolation`] when responses outnumber identifiers, or
    ///   the stream ends with identifiers unanswered.
    pub async fn receive(&mut self) -> Result<Option<ObjectResponse>> {
        if self.state.snapshot().is_closed() {
            return Err(Error::SessionClosed);
        }
        let next = self.inbound.next().await.transpose();
        self.observe(next)
    }

    pub fn state(&self) -> SessionState {
        self.state.snapshot()
    }

    fn observe(
        &mut self,
        next: core::result::Result<Option<ObjectResponse>, Status>,
    ) -> Result<Option<ObjectResponse>> {
        let event = match &next {
            Ok(Some(_)) => SessionEvent::ResponseSent,
            Ok(None) => SessionEvent::Flushed,
            Err(_) => SessionEvent::Aborted,
        };

        if let Err(e) = self.state.apply(event) {
            self.state.abort();
            return Err(e);
        }

        next.map_err(|status| match Error::from(status) {
            e @ (Error::ContentUnavailable { .. } | Error::StreamAborted { .. }) => e,
            e => Error::stream_aborted(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_state_is_visible_to_both_halves() -> Result<()> {
        let state = SharedState::default();
        let other = state.clone();

        state.apply(SessionEvent::IdentifierReceived)?;
        assert_eq!(other.snapshot().requested(), 1);

        other.abort();
        assert!(state.snapshot().is_closed());
        assert!(matches!(
            state.apply(SessionEvent::IdentifierReceived),
            Err(Error::SessionClosed)
        ));
        Ok(())
    }
}
