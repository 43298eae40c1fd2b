//! gRPC service implementation for object delivery.
//!
//! This module defines [`ObjectService`], the concrete implementation of the
//! [`ObjectAccessor`] gRPC service. It exposes a unary endpoint answering one
//! identifier with one object, and a bidirectional streaming endpoint that
//! multiplexes many identifier/object pairs over a single call.
//!
//! ## Responsibilities
//!
//! - Resolve every identifier to the single served snapshot.
//! - Spawn one session task per streaming call via [`serve_session`].
//! - Log caller addresses in verbose mode.
//! - Emit request, session and byte telemetry.

use crate::server::{
    content::ContentSource,
    streaming::session::serve_session,
    telemetry::{
        decrement_sessions_inflight, increment_bytes_served, increment_requests,
        increment_session_errors, increment_sessions_inflight, record_objects_per_session,
        record_session_duration,
    },
};
use core::pin::Pin;
use futures::TryStreamExt;
use objwire_core::proto::{
    ObjectIdentifier, ObjectResponse, object_accessor_server::ObjectAccessor,
};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

/// gRPC service delivering the shared snapshot.
///
/// Cloning is cheap: every clone shares the same [`ContentSource`].
#[derive(Clone, Debug)]
pub struct ObjectService {
    source: ContentSource,
    stream_buffer_size: usize,
    verbose: bool,
}

impl ObjectService {
    pub fn new(source: ContentSource, stream_buffer_size: usize, verbose: bool) -> Self {
        Self {
            source,
            stream_buffer_size,
            verbose,
        }
    }
}

#[tonic::async_trait]
impl ObjectAccessor for ObjectService {
    type GetObjectStreamStream =
        Pin<Box<dyn Stream<Item = Result<ObjectResponse, Status>> + Send>>;

    /// Answers one identifier with the served object.
    ///
    /// Fails with `FAILED_PRECONDITION` if the content cannot be produced.
    #[cfg_attr(feature = "otel", tracing::instrument(skip_all, fields(name = %req.get_ref().name)))]
    async fn get_object(
        &self,
        req: Request<ObjectIdentifier>,
    ) -> Result<Response<ObjectResponse>, Status> {
        if self.verbose {
            if let Some(addr) = req.remote_addr() {
                tracing::info!("Unary: remote addr: {addr}");
            }
        }
        increment_requests("unary");

        let snapshot = self.source.snapshot().await?;
        increment_bytes_served(snapshot.len() as u64);
        Ok(Response::new(snapshot.to_response()))
    }

    /// Opens a streaming session.
    ///
    /// The session runs on its own task; responses flow back through a
    /// bounded buffer of `stream_buffer_size` messages, so a client that stops
    /// reading exerts backpressure on the session instead of growing memory.
    async fn get_object_stream(
        &self,
        req: Request<Streaming<ObjectIdentifier>>,
    ) -> Result<Response<Self::GetObjectStreamStream>, Status> {
        if self.verbose {
            if let Some(addr) = req.remote_addr() {
                tracing::info!("Streaming: remote addr: {addr}");
            }
        }
        increment_requests("stream");
        increment_sessions_inflight();

        let start = std::time::Instant::now();
        let inbound = req.into_inner();
        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<ObjectResponse, Status>>(self.stream_buffer_size);

        let fut = serve_and_record(inbound, self.source.clone(), resp_tx, start);
        #[cfg(feature = "otel")]
        let fut = {
            use tracing::Instrument;
            fut.instrument(tracing::info_span!("session"))
        };
        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|response| increment_bytes_served(response.content.len() as u64));

        Ok(Response::new(Box::pin(stream)))
    }
}

async fn serve_and_record(
    inbound: Streaming<ObjectIdentifier>,
    source: ContentSource,
    resp_tx: mpsc::Sender<Result<ObjectResponse, Status>>,
    start: std::time::Instant,
) {
    match serve_session(inbound, source, resp_tx).await {
        Ok(state) => {
            tracing::debug!(answered = state.answered(), "Session closed");
            record_objects_per_session(state.answered() as f64);
        }
        Err(e) => {
            tracing::warn!("Session aborted: {e}");
            increment_session_errors();
        }
    }
    decrement_sessions_inflight();
    record_session_duration(start.elapsed().as_millis() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use objwire_core::{ObjectSnapshot, snapshot::fingerprint, types::MEDIA_TYPE};
    use std::time::UNIX_EPOCH;
    use tonic::Code;

    fn service(source: ContentSource) -> ObjectService {
        ObjectService::new(source, 4, true)
    }

    #[tokio::test]
    async fn unary_returns_snapshot_for_any_identifier() -> Result<(), Status> {
        let snapshot = ObjectSnapshot::from_parts(&b"0123456789"[..], UNIX_EPOCH);
        let svc = service(ContentSource::from_snapshot(snapshot.clone()));

        let a = svc
            .get_object(Request::new(ObjectIdentifier::benchmark()))
            .await?
            .into_inner();
        let b = svc
            .get_object(Request::new(ObjectIdentifier::new("other", "scope", "name")))
            .await?
            .into_inner();

        assert_eq!(a, b);
        assert_eq!(a.media_type, MEDIA_TYPE);
        assert_eq!(a.mtime, snapshot.mtime());
        assert_eq!(a.fingerprint, fingerprint(&a.content));
        Ok(())
    }

    #[tokio::test]
    async fn unary_reports_unavailable_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = service(ContentSource::lazy(dir.path().join("missing")));

        let status = svc
            .get_object(Request::new(ObjectIdentifier::benchmark()))
            .await
            .expect_err("content is missing");
        assert_eq!(status.code(), Code::FailedPrecondition);
    }
}
