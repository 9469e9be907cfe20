//! Session state machine
//!
//! Phases: LOADING → {AUTHENTICATED | UNAUTHENTICATED}, then back and forth
//! through login, logout and expiry. The machine is pure: it records the
//! transition and says what the sync engine must do about it, and the
//! caller carries that out.

use std::fmt;

use dromio_model::User;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Startup; the probe has not answered yet
    Loading,
    Unauthenticated,
    Authenticated(User),
}

/// State without the user, for logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Unauthenticated,
    Authenticated,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Loading => write!(f, "loading"),
            SessionPhase::Unauthenticated => write!(f, "unauthenticated"),
            SessionPhase::Authenticated => write!(f, "authenticated"),
        }
    }
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Loading => SessionPhase::Loading,
            SessionState::Unauthenticated => SessionPhase::Unauthenticated,
            SessionState::Authenticated(_) => SessionPhase::Authenticated,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ProbeSucceeded(User),
    ProbeFailed,
    LoginSucceeded(User),
    /// Server message, shown verbatim
    LoginFailed(String),
    LoggedOut,
    /// A 401 seen by a fetch or mutation
    Expired,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::ProbeSucceeded(_) => "probe_succeeded",
            SessionEvent::ProbeFailed => "probe_failed",
            SessionEvent::LoginSucceeded(_) => "login_succeeded",
            SessionEvent::LoginFailed(_) => "login_failed",
            SessionEvent::LoggedOut => "logged_out",
            SessionEvent::Expired => "expired",
        }
    }
}

/// Where the UI has to go next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    ToLogin,
}

/// What the sync engine must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    None,
    /// Start fetching every subscribed collection now
    Resume,
    /// Another user signed in over a live session: drop and refetch
    Restart,
    /// Stop all fetching and drop cached data
    Suspend,
    SuspendAndNavigate(Navigation),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session transition: {event} while {from}")]
    InvalidTransition {
        from: SessionPhase,
        event: &'static str,
    },
}

#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    last_error: Option<String>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Loading,
            last_error: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == SessionPhase::Authenticated
    }

    /// Message from the last failed login, cleared by the next success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionEffect, SessionError> {
        let from = self.phase();
        let name = event.name();
        let invalid = SessionError::InvalidTransition { from, event: name };

        let (next, effect) = match (from, event) {
            (SessionPhase::Loading, SessionEvent::ProbeSucceeded(user)) => {
                (SessionState::Authenticated(user), SessionEffect::Resume)
            }
            (SessionPhase::Loading, SessionEvent::ProbeFailed) => {
                (SessionState::Unauthenticated, SessionEffect::Suspend)
            }
            (_, SessionEvent::ProbeSucceeded(_)) | (_, SessionEvent::ProbeFailed) => {
                return Err(invalid)
            }

            (SessionPhase::Authenticated, SessionEvent::LoginSucceeded(user)) => {
                self.last_error = None;
                (SessionState::Authenticated(user), SessionEffect::Restart)
            }
            (_, SessionEvent::LoginSucceeded(user)) => {
                self.last_error = None;
                (SessionState::Authenticated(user), SessionEffect::Resume)
            }

            (phase, SessionEvent::LoginFailed(message)) => {
                self.last_error = Some(message);
                let next = match phase {
                    SessionPhase::Loading => SessionState::Unauthenticated,
                    _ => self.state.clone(),
                };
                (next, SessionEffect::None)
            }

            (_, SessionEvent::LoggedOut) => (
                SessionState::Unauthenticated,
                SessionEffect::SuspendAndNavigate(Navigation::ToLogin),
            ),

            (SessionPhase::Authenticated, SessionEvent::Expired) => {
                (SessionState::Unauthenticated, SessionEffect::Suspend)
            }
            (_, SessionEvent::Expired) => return Err(invalid),
        };

        self.state = next;
        tracing::info!(
            from = %from,
            to = %self.phase(),
            event = name,
            user = self.user().map(|u| u.username.as_str()).unwrap_or("-"),
            "Session transition"
        );
        Ok(effect)
    }
}
