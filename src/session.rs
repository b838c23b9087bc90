//! Session and turn state machine.
//!
//! The machine never talks to the network itself. Callers build requests from
//! it, perform the round-trip, and hand the outcome back through
//! [`SessionMachine::apply_start`] or [`SessionMachine::apply_turn`]. Every
//! transition returns the ordered list of [`UiEvent`]s the view has to render.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::{StartReply, TurnReply, TurnRequest};
use crate::error::{ParleyError, Result};
use crate::settings::InputMode;

pub const READY_MESSAGE: &str = "Session ready. Click Start when you are ready.";
pub const START_FAILED_MESSAGE: &str = "Failed to start session. Is the server running?";
pub const UNREACHABLE_MESSAGE: &str = "Failed to reach server.";
pub const SCORE_PLACEHOLDER: &str = "--";
pub const SCORE_NOTE_PENDING: &str = "Score updates after the session ends.";

/// One step of a scripted scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub title: String,
    pub prompt: String,
    /// 1-based position within the scenario.
    pub index: u32,
    pub total: u32,
}

impl Stage {
    fn regresses_from(&self, current: &Self) -> bool {
        self.index < current.index || self.total < current.total
    }
}

/// Who a transcript bubble belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Agent,
    Coach,
}

/// Session status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    Active,
    Complete,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "Idle",
            Self::Loading => "Loading",
            Self::Active => "Active",
            Self::Complete => "Complete",
        })
    }
}

/// Instructions for the view layer, in render order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Bubble { role: Role, text: String },
    /// Read text aloud (only emitted when text-to-speech is enabled).
    Speak(String),
    Status(Status),
    Stage(Stage),
    Score(String),
    ScoreNote(String),
    InputEnabled(bool),
    ClearTranscript,
    /// Voice panel status line.
    Notice(String),
    Mode(InputMode),
}

impl UiEvent {
    fn bubble(role: Role, text: impl Into<String>) -> Self {
        Self::Bubble {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub stage: Stage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Active(Session),
    Complete(Session),
}

#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
}

impl SessionMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        match self.state {
            SessionState::Idle => Status::Idle,
            SessionState::Active(_) => Status::Active,
            SessionState::Complete(_) => Status::Complete,
        }
    }

    /// Whether a turn may be submitted right now.
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::Active(s) | SessionState::Complete(s) => Some(&s.id),
        }
    }

    #[must_use]
    pub const fn stage(&self) -> Option<&Stage> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::Active(s) | SessionState::Complete(s) => Some(&s.stage),
        }
    }

    /// Events to show while a start request is in flight.
    #[must_use]
    pub fn begin_start(&self) -> Vec<UiEvent> {
        vec![UiEvent::Status(Status::Loading)]
    }

    /// Install the outcome of a start request.
    ///
    /// Success always yields a fresh `Active` session. Failure leaves the
    /// machine `Idle`.
    pub fn apply_start(&mut self, result: Result<StartReply>) -> Vec<UiEvent> {
        match result {
            Ok(reply) => {
                tracing::info!(
                    "session {} started at stage {}/{}",
                    reply.session_id,
                    reply.stage.index,
                    reply.stage.total
                );
                let prompt = format!("Coach: {}", reply.stage.prompt);
                let stage = reply.stage.clone();
                self.state = SessionState::Active(Session {
                    id: reply.session_id,
                    stage: reply.stage,
                });
                vec![
                    UiEvent::Stage(stage),
                    UiEvent::Status(Status::Active),
                    UiEvent::bubble(Role::Coach, prompt),
                ]
            }
            Err(e) => {
                tracing::warn!("failed to start session: {e}");
                self.state = SessionState::Idle;
                let text = match e {
                    ParleyError::ServerRejected(msg) => msg,
                    ParleyError::NetworkUnreachable(_) => START_FAILED_MESSAGE.to_string(),
                    other => other.to_string(),
                };
                vec![
                    UiEvent::bubble(Role::Agent, text),
                    UiEvent::Status(Status::Idle),
                ]
            }
        }
    }

    /// Build the request for a user turn plus the events to render before the
    /// round-trip. `None` when the text is blank or no session is active, in
    /// which case nothing must be sent.
    #[must_use]
    pub fn begin_turn(&self, text: &str) -> Option<(TurnRequest, Vec<UiEvent>)> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let SessionState::Active(session) = &self.state else {
            tracing::debug!("turn ignored in state {}", self.status());
            return None;
        };

        let request = TurnRequest {
            session_id: session.id.clone(),
            text: text.to_string(),
        };
        Some((request, vec![UiEvent::bubble(Role::User, text)]))
    }

    /// Merge the server's reaction to a turn.
    pub fn apply_turn(&mut self, result: Result<TurnReply>) -> Vec<UiEvent> {
        let reply = match result {
            Ok(reply) => reply,
            Err(ParleyError::ServerRejected(msg)) => {
                tracing::warn!("turn rejected: {msg}");
                return vec![UiEvent::bubble(Role::Agent, msg)];
            }
            Err(e) => {
                tracing::warn!("turn failed: {e}");
                return vec![UiEvent::bubble(Role::Agent, UNREACHABLE_MESSAGE)];
            }
        };

        let mut session = match std::mem::take(&mut self.state) {
            SessionState::Active(session) => session,
            other => {
                tracing::warn!("turn reply arrived with no active session, ignoring");
                self.state = other;
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if let Some(text) = reply.sarah {
            events.push(UiEvent::bubble(Role::Agent, text.clone()));
            events.push(UiEvent::Speak(text));
        }
        if let Some(text) = reply.system {
            events.push(UiEvent::bubble(Role::Coach, text));
        }
        let has_coach_prompt = reply.coach_prompt.is_some();
        if let Some(text) = reply.coach_prompt {
            events.push(UiEvent::bubble(Role::Coach, text));
        }
        if let Some(text) = reply.success_message {
            events.push(UiEvent::bubble(Role::Agent, text.clone()));
            events.push(UiEvent::Speak(text));
        }
        let has_evaluation = reply.evaluation.is_some();
        if let Some(text) = reply.evaluation {
            events.push(UiEvent::bubble(Role::Coach, text));
        }

        let score = reply.score.map(|s| s.to_string());
        if let Some(ref score) = score {
            events.push(UiEvent::Score(score.clone()));
        }
        if let Some(rank) = reply.final_rank {
            events.push(UiEvent::ScoreNote(format!("Final rank: {rank}")));
        }

        if let Some(stage) = reply.stage {
            if stage.regresses_from(&session.stage) {
                tracing::warn!(
                    "server moved stage backwards from {}/{} to {}/{}, keeping current stage",
                    session.stage.index,
                    session.stage.total,
                    stage.index,
                    stage.total
                );
            } else {
                tracing::debug!("stage now {}/{}", stage.index, stage.total);
                if !reply.completed && !has_coach_prompt {
                    events.push(UiEvent::bubble(
                        Role::Coach,
                        format!("Coach: {}", stage.prompt),
                    ));
                }
                session.stage = stage.clone();
                events.push(UiEvent::Stage(stage));
            }
        }

        if reply.completed {
            if !has_evaluation {
                events.push(UiEvent::bubble(
                    Role::Coach,
                    format!(
                        "The conversation has ended. Your final score is {}.",
                        score.as_deref().unwrap_or(SCORE_PLACEHOLDER)
                    ),
                ));
            }
            tracing::info!("session {} complete", session.id);
            self.state = SessionState::Complete(session);
            events.push(UiEvent::Status(Status::Complete));
            events.push(UiEvent::InputEnabled(false));
        } else {
            self.state = SessionState::Active(session);
        }

        events
    }

    /// Drop any session and return to `Idle`, whatever the current state.
    pub fn reset(&mut self) -> Vec<UiEvent> {
        if let Some(id) = self.session_id() {
            tracing::info!("resetting session {id}");
        }
        self.state = SessionState::Idle;
        vec![
            UiEvent::ClearTranscript,
            UiEvent::Status(Status::Idle),
            UiEvent::bubble(Role::Agent, READY_MESSAGE),
            UiEvent::Score(SCORE_PLACEHOLDER.to_string()),
            UiEvent::ScoreNote(SCORE_NOTE_PENDING.to_string()),
            UiEvent::InputEnabled(true),
        ]
    }
}
