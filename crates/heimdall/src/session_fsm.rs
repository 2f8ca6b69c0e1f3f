//! Session state machine using rust-fsm.
//!
//! The machine has no side effects. The effect pipeline and the refresh step
//! of the authenticated client feed it inputs; everything else only reads it.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐   LoadSession   ┌─────────────────┐
//! │    Anonymous    │ ──────────────► │     Loading     │
//! └────────┬────────┘ ◄────────────── └────────┬────────┘
//!          │           TokenAbsent             │ TokenFound
//!          │ TokenFound                        ▼
//!          │                          ┌─────────────────┐
//!          └────────────────────────► │  Authenticated  │ ◄──┐
//!                                     └────────┬────────┘    │
//!                                              │ Unauthorized│ RefreshSucceeded
//!                                              ▼             │
//!                                     ┌─────────────────┐    │
//!                                     │ RefreshingToken │ ───┘
//!                                     └────────┬────────┘
//!                                              │ RefreshFailed
//!                                              ▼
//!  any state ──── Logout ───────────► ┌─────────────────┐
//!                                     │    LoggedOut    │ ── Login ──► Anonymous
//!                                     └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Anonymous)

    Anonymous => {
        LoadSession => Loading,
        // A token issued or handed over without a restore in between
        TokenFound => Authenticated,
        TokenCleared => Anonymous,
        Login => Anonymous,
        Logout => LoggedOut
    },
    Loading => {
        TokenFound => Authenticated,
        TokenAbsent => Anonymous,
        TokenCleared => Anonymous,
        Logout => LoggedOut
    },
    Authenticated => {
        TokenFound => Authenticated,
        TokenCleared => Anonymous,
        Unauthorized => RefreshingToken,
        Logout => LoggedOut
    },
    RefreshingToken => {
        // Late 401s from other requests while the refresh is in flight
        Unauthorized => RefreshingToken,
        RefreshSucceeded => Authenticated,
        RefreshFailed => LoggedOut,
        Logout => LoggedOut
    },
    LoggedOut => {
        Login => Anonymous,
        Logout => LoggedOut
    }
}

pub use session_machine::Input as SessionInput;
pub use session_machine::State as SessionState;
pub use session_machine::StateMachine as SessionMachine;

/// Pure transition function: the state reached by applying `input` in
/// `state`, or `None` when the transition is not legal.
pub fn transition(state: &SessionState, input: &SessionInput) -> Option<SessionState> {
    <session_machine::Impl as StateMachineImpl>::transition(state, input)
}

/// Session state as exposed to UI and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No token.
    Anonymous,
    /// Session restore in flight.
    Loading,
    /// Valid token; user info may or may not be loaded.
    Authenticated,
    /// A 401 triggered a refresh attempt.
    RefreshingToken,
    /// Session ended; only an explicit login leaves this state.
    LoggedOut,
}

impl SessionStatus {
    /// Returns true if requests can be made with the current credential.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated)
    }

    /// Returns true if the state is waiting on an outstanding operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionStatus::Loading | SessionStatus::RefreshingToken)
    }
}

impl From<&SessionState> for SessionStatus {
    fn from(state: &SessionState) -> Self {
        match state {
            SessionState::Anonymous => SessionStatus::Anonymous,
            SessionState::Loading => SessionStatus::Loading,
            SessionState::Authenticated => SessionStatus::Authenticated,
            SessionState::RefreshingToken => SessionStatus::RefreshingToken,
            SessionState::LoggedOut => SessionStatus::LoggedOut,
        }
    }
}
