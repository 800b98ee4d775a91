//! Session state — the serializable snapshot the controller drives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{Action, Event, EventId, Observation, Payload, Source};

/// Where the controller currently is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Init,
    Thinking,
    Acting,
    Waiting,
    Completed,
    Error,
}

/// The full per-session state. Reconstructed on session open and
/// checkpointed after each observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub session_id: String,
    pub agent_state: AgentState,
    pub history: Vec<Event>,
    /// Free-form per-session scratch data.
    #[serde(default)]
    pub outputs: serde_json::Map<String, Value>,
    /// The next event id to allocate. Ids are strictly increasing.
    #[serde(default = "default_next_id")]
    next_event_id: EventId,
}

fn default_next_id() -> EventId {
    1
}

impl State {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            agent_state: AgentState::Init,
            history: Vec::new(),
            outputs: serde_json::Map::new(),
            next_event_id: 1,
        }
    }

    /// Rebuild state from a persisted event log.
    pub fn from_events(session_id: impl Into<String>, events: Vec<Event>) -> Self {
        let next_event_id = events.iter().map(|e| e.id + 1).max().unwrap_or(1);
        Self {
            session_id: session_id.into(),
            agent_state: AgentState::Init,
            history: events,
            outputs: serde_json::Map::new(),
            next_event_id,
        }
    }

    fn next_id(&mut self) -> EventId {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    /// Append an action to the history, allocating its id.
    pub fn record_action(&mut self, source: Source, action: Action) -> Event {
        let event = Event::action(self.next_id(), source, action);
        self.history.push(event.clone());
        event
    }

    /// Append an observation to the history, allocating its id.
    pub fn record_observation(&mut self, source: Source, observation: Observation) -> Event {
        let event = Event::observation(self.next_id(), source, observation);
        self.history.push(event.clone());
        event
    }

    /// The id of the most recently appended action, if any.
    pub fn last_action_id(&self) -> Option<EventId> {
        self.history
            .iter()
            .rev()
            .find(|e| matches!(e.payload, Payload::Action(_)))
            .map(|e| e.id)
    }

    /// The content of the most recent agent message, if any.
    pub fn last_agent_message(&self) -> Option<&str> {
        self.history.iter().rev().find_map(|e| match &e.payload {
            Payload::Action(Action::Message { content, .. }) if e.source == Source::Agent => {
                Some(content.as_str())
            }
            _ => None,
        })
    }

    /// Discard history from (and including) the most recent user turn.
    ///
    /// Used when the user edits an in-flight query: the superseded turn and
    /// everything it produced are dropped before the new message is
    /// appended. Ids keep increasing; dropped ids are never reused.
    pub fn clear_from_last_user(&mut self) {
        let last_user = self.history.iter().rposition(|e| {
            matches!(
                e.payload,
                Payload::Observation(Observation::UserMessage { .. })
            )
        });
        if let Some(idx) = last_user {
            self.history.truncate(idx);
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.outputs.clear();
        self.agent_state = AgentState::Init;
    }
}
