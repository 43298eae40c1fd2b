//! State machine for one streaming session.
//!
//! A session multiplexes many identifier requests and object responses over a
//! single bidirectional gRPC call. Both ends track the same lifecycle:
//!
//! ```text
//!   Open ──EndOfInput──▶ Draining ──Flushed──▶ Closed
//!    │                      │                    ▲
//!    └──────────Aborted─────┴────────────────────┘
//! ```
//!
//! - `Open`: identifiers are accepted; each one is answered before the next is
//!   processed.
//! - `Draining`: the client finished sending; identifiers already received are
//!   still answered, then end-of-output is signalled.
//! - `Closed`: terminal. Every further event is rejected with
//!   [`Error::SessionClosed`].
//!
//! Besides the lifecycle, the state tracks how many identifiers were sent and
//! answered so strict FIFO pairing can be checked: responses can never
//! outnumber requests, and the session can only flush once every request has
//! been answered.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Open,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// An identifier entered the session.
    IdentifierReceived,
    /// The response to the oldest unanswered identifier left the session.
    ResponseSent,
    /// The client signalled it will send no more identifiers.
    EndOfInput,
    /// The end-of-output signal was emitted or observed.
    Flushed,
    /// A transport failure terminated the session.
    Aborted,
}

/// Lifecycle and pairing counters of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    phase: SessionPhase,
    requested: u64,
    answered: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub const fn new() -> Self {
        Self {
            phase: SessionPhase::Open,
            requested: 0,
            answered: 0,
        }
    }

    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub const fn requested(&self) -> u64 {
        self.requested
    }

    pub const fn answered(&self) -> u64 {
        self.answered
    }

    /// Identifiers received but not yet answered.
    pub const fn outstanding(&self) -> u64 {
        self.requested - self.answered
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Applies `event`, returning the resulting phase.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] for any event other than `Aborted` once the
    ///   session is closed, and for `IdentifierReceived` or `EndOfInput` after
    ///   end-of-input.
    /// - [`Error::ProtocolViolation`] when a response has no matching request,
    ///   or when the session flushes with requests still unanswered.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase> {
        use SessionEvent::*;
        use SessionPhase::*;

        self.phase = match (self.phase, event) {
            (_, Aborted) => Closed,
            (Closed, _) => return Err(Error::SessionClosed),
            (Open, IdentifierReceived) => {
                self.requested += 1;
                Open
            }
            (Draining, IdentifierReceived | EndOfInput) => return Err(Error::SessionClosed),
            (phase, ResponseSent) => {
                if self.answered >= self.requested {
                    return Err(Error::ProtocolViolation {
                        expected: self.requested,
                        observed: self.answered + 1,
                    });
                }
                self.answered += 1;
                phase
            }
            (Open, EndOfInput) => Draining,
            (Open | Draining, Flushed) => {
                if self.answered != self.requested {
                    return Err(Error::ProtocolViolation {
                        expected: self.requested,
                        observed: self.answered,
                    });
                }
                Closed
            }
        };

        Ok(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_pairs_every_request() -> Result<()> {
        let mut state = SessionState::new();
        for _ in 0..3 {
            state.apply(SessionEvent::IdentifierReceived)?;
        }
        state.apply(SessionEvent::ResponseSent)?;
        assert_eq!(state.apply(SessionEvent::EndOfInput)?, SessionPhase::Draining);
        assert_eq!(state.outstanding(), 2);

        state.apply(SessionEvent::ResponseSent)?;
        state.apply(SessionEvent::ResponseSent)?;
        assert_eq!(state.apply(SessionEvent::Flushed)?, SessionPhase::Closed);
        assert_eq!(state.requested(), 3);
        assert_eq!(state.answered(), 3);
        Ok(())
    }

    #[test]
    fn closed_session_rejects_everything_but_abort() -> Result<()> {
        let mut state = SessionState::new();
        state.apply(SessionEvent::EndOfInput)?;
        state.apply(SessionEvent::Flushed)?;

        for event in [
            SessionEvent::IdentifierReceived,
            SessionEvent::ResponseSent,
            SessionEvent::EndOfInput,
            SessionEvent::Flushed,
        ] {
            assert!(matches!(state.apply(event), Err(Error::SessionClosed)));
        }
        assert_eq!(state.apply(SessionEvent::Aborted)?, SessionPhase::Closed);
        Ok(())
    }

    #[test]
    fn draining_rejects_new_identifiers() -> Result<()> {
        let mut state = SessionState::new();
        state.apply(SessionEvent::EndOfInput)?;
        assert!(matches!(
            state.apply(SessionEvent::IdentifierReceived),
            Err(Error::SessionClosed)
        ));
        Ok(())
    }

    #[test]
    fn unsolicited_response_is_a_violation() {
        let mut state = SessionState::new();
        assert!(matches!(
            state.apply(SessionEvent::ResponseSent),
            Err(Error::ProtocolViolation {
                expected: 0,
                observed: 1
            })
        ));
    }

    #[test]
    fn flush_with_unanswered_requests_is_a_violation() -> Result<()> {
        let mut state = SessionState::new();
        state.apply(SessionEvent::IdentifierReceived)?;
        state.apply(SessionEvent::IdentifierReceived)?;
        state.apply(SessionEvent::ResponseSent)?;
        state.apply(SessionEvent::EndOfInput)?;
        assert!(matches!(
            state.apply(SessionEvent::Flushed),
            Err(Error::ProtocolViolation {
                expected: 2,
                observed: 1
            })
        ));
        Ok(())
    }

    #[test]
    fn abort_closes_from_any_phase() -> Result<()> {
        let mut open = SessionState::new();
        assert_eq!(open.apply(SessionEvent::Aborted)?, SessionPhase::Closed);

        let mut draining = SessionState::new();
        draining.apply(SessionEvent::EndOfInput)?;
        assert_eq!(draining.apply(SessionEvent::Aborted)?, SessionPhase::Closed);
        assert!(draining.is_closed());
        Ok(())
    }
}
