use crate::server::content::ContentSource;
use futures::{Stream, StreamExt};
use objwire_core::{
    Error, SessionEvent, SessionState,
    proto::{ObjectIdentifier, ObjectResponse},
};
use tokio::sync::mpsc;
use tonic::Status;

/// Drives the server side of one streaming session.
///
/// Reads identifiers from `inbound` and answers each one with exactly one
/// [`ObjectResponse`] on `resp_tx` before reading the next, so responses leave
/// in the order their identifiers arrived. When the client half-closes, the
/// session drains (everything received has already been answered) and closes;
/// dropping `resp_tx` on return is the end-of-output signal.
///
/// # Behavior
///
/// - A transport error on the inbound leg aborts the session: the client is
///   sent a final `ABORTED` status (best effort) and
///   [`Error::StreamAborted`] is returned.
/// - If the content cannot be produced, the client receives
///   `FAILED_PRECONDITION` and the session closes with
///   [`Error::ContentUnavailable`].
/// - If the client stops receiving (outbound channel closed), the session
///   closes without further work.
///
/// Returns the final [`SessionState`], whose counters record how many
/// identifiers were answered.
pub async fn serve_session<S>(
    mut inbound: S,
    source: ContentSource,
    resp_tx: mpsc::Sender<Result<ObjectResponse, Status>>,
) -> objwire_core::Result<SessionState>
where
    S: Stream<Item = Result<ObjectIdentifier, Status>> + Unpin,
{
    let mut state = SessionState::new();

    while let Some(item) = inbound.next().await {
        let identifier = match item {
            Ok(identifier) => identifier,
            Err(status) => {
                let err = Error::stream_aborted(format!(
                    "receive failed ({:?}): {}",
                    status.code(),
                    status.message()
                ));
                return abort(&mut state, &resp_tx, err).await;
            }
        };
        state.apply(SessionEvent::IdentifierReceived)?;
        tracing::trace!(
            namespace = %identifier.namespace,
            scope = %identifier.scope,
            name = %identifier.name,
            "Identifier received"
        );

        let response = match source.snapshot().await {
            Ok(snapshot) => snapshot.to_response(),
            Err(err) => return abort(&mut state, &resp_tx, err).await,
        };

        if resp_tx.send(Ok(response)).await.is_err() {
            state.apply(SessionEvent::Aborted)?;
            return Err(Error::stream_aborted("client stopped receiving responses"));
        }
        state.apply(SessionEvent::ResponseSent)?;
    }

    state.apply(SessionEvent::EndOfInput)?;
    tracing::debug!(outstanding = state.outstanding(), "Client finished sending, draining");
    state.apply(SessionEvent::Flushed)?;

    Ok(state)
}

/// Closes the session after `err`, surfacing it to the client if it is still
/// listening.
async fn abort(
    state: &mut SessionState,
    resp_tx: &mpsc::Sender<Result<ObjectResponse, Status>>,
    err: Error,
) -> objwire_core::Result<SessionState> {
    state.apply(SessionEvent::Aborted)?;

    let status = match &err {
        Error::ContentUnavailable { reason } => Status::failed_precondition(reason.clone()),
        other => Status::aborted(other.to_string()),
    };
    if let Err(_e) = resp_tx.send(Err(status)).await {
        tracing::debug!("Client gone before abort status could be delivered");
    }

    Err(err)
}
