//! The agent controller — the state/action/observation loop.
//!
//! A single cooperative task per session drives: build snapshot → agent →
//! action → tool manager → observation → next turn, bounded by `max_turns`
//! and the per-call tool timeout. Cancellation is level-triggered and
//! checked before every suspension point; every tool failure reaches the
//! agent as a failed observation rather than an error.

use std::sync::Arc;
use std::time::Duration;

use axon_domain::config::MAX_TOOL_TIMEOUT_SEC;
use axon_domain::event::FailureKind;
use axon_domain::trace::TraceEvent;
use axon_domain::{Action, AgentState, Observation, Result, Source, State};
use axon_tools::{CancelToken, ToolManager};

use crate::agent::Agent;
use crate::prompts::{AGENT_INTERRUPT_MESSAGE, MAX_TURNS_MESSAGE};
use crate::sink::EventSink;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Configuration and outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub max_turns: u32,
    /// Ceiling for any tool dispatch; a tool's own timeout may lower it.
    pub tool_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_turns: 200,
            tool_timeout: Duration::from_secs(MAX_TOOL_TIMEOUT_SEC),
        }
    }
}

/// How one run of the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The agent finished; the final answer is surfaced to the user.
    Completed { final_answer: String },
    /// The agent asked the user something and is waiting for the reply.
    Waiting,
    /// The cancel signal stopped the loop; cleared by the next message.
    Interrupted,
    /// The turn bound tripped before completion.
    MaxTurnsExceeded,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Controller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentController {
    agent: Agent,
    tools: Arc<ToolManager>,
    sink: EventSink,
    cancel: CancelToken,
    config: ControllerConfig,
    pub state: State,
}

impl AgentController {
    pub fn new(
        agent: Agent,
        tools: Arc<ToolManager>,
        sink: EventSink,
        cancel: CancelToken,
        config: ControllerConfig,
        state: State,
    ) -> Self {
        Self {
            agent,
            tools,
            sink,
            cancel,
            config,
            state,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Accept a user message: clears the cancel signal, appends the
    /// UserMessage observation, and arms the loop.
    pub fn submit_user_message(&mut self, text: &str, files: Vec<String>) {
        self.cancel.clear();
        self.tools.reset();
        // A completed session passes back through INIT before thinking.
        if self.state.agent_state == AgentState::Completed {
            self.set_state(AgentState::Init);
        }
        let event = self.state.record_observation(
            Source::User,
            Observation::UserMessage {
                content: text.to_owned(),
                files,
            },
        );
        self.sink.publish(&event);
        self.set_state(AgentState::Thinking);
    }

    /// Discard history from (and including) the most recent user turn.
    /// Used by the edit-query flow before the replacement message lands.
    pub fn clear_from_last_user(&mut self) {
        self.state.clear_from_last_user();
    }

    /// Drive the loop until completion, interruption, waiting, or the turn
    /// bound. LLM errors that survive the retry policy propagate as `Err`
    /// after the error event is recorded.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        for _ in 0..self.config.max_turns {
            if self.cancel.is_cancelled() {
                return Ok(self.interrupted_between_turns());
            }

            // ── Think ────────────────────────────────────────────────
            self.set_state(AgentState::Thinking);
            let action = match self.agent.step(&self.state).await {
                Ok(action) => action,
                Err(e) => {
                    self.record_error(format!("Agent error: {e}"));
                    return Err(e);
                }
            };

            // An empty completion inherits the most recent agent message as
            // its final answer before anything is recorded.
            let action = match action {
                Action::Complete { final_answer } if final_answer.is_empty() => {
                    Action::Complete {
                        final_answer: self
                            .state
                            .last_agent_message()
                            .unwrap_or("Task completed")
                            .to_owned(),
                    }
                }
                other => other,
            };

            let action_event = self.state.record_action(Source::Agent, action.clone());
            self.sink.publish(&action_event);

            // ── Act ──────────────────────────────────────────────────
            match action {
                Action::Complete { final_answer } => {
                    return Ok(self.finish(final_answer));
                }

                Action::Message {
                    wait_for_response, ..
                } => {
                    if wait_for_response {
                        self.set_state(AgentState::Waiting);
                        return Ok(RunOutcome::Waiting);
                    }
                    // Emit and keep thinking.
                    continue;
                }

                runnable => {
                    self.set_state(AgentState::Acting);
                    let observation = self.dispatch(&runnable, action_event.id).await;
                    let was_interrupted =
                        matches!(observation, Observation::Interruption { .. });

                    let obs_event = self
                        .state
                        .record_observation(Source::Environment, observation);
                    self.sink.publish(&obs_event);
                    self.sink.checkpoint(&self.state);

                    if self.tools.should_stop() {
                        let answer = self.tools.final_answer();
                        return Ok(self.finish(answer));
                    }
                    if was_interrupted {
                        self.set_state(AgentState::Thinking);
                        return Ok(RunOutcome::Interrupted);
                    }
                    self.set_state(AgentState::Thinking);
                }
            }
        }

        // ── Turn bound tripped ──────────────────────────────────────
        self.record_error(MAX_TURNS_MESSAGE.to_owned());
        Ok(RunOutcome::MaxTurnsExceeded)
    }

    // ── Helpers ────────────────────────────────────────────────────

    /// Dispatch a runnable action with the timeout ceiling applied.
    async fn dispatch(&self, action: &Action, cause: u64) -> Observation {
        let timeout = self
            .tools
            .timeout_for(action)
            .unwrap_or(self.config.tool_timeout)
            .min(self.config.tool_timeout);

        match tokio::time::timeout(timeout, self.tools.handle_action(action, Some(cause))).await
        {
            Ok(observation) => observation,
            Err(_) => {
                let (tool_name, tool_call_id) = action
                    .as_tool_call()
                    .map(|inv| (inv.tool_name, inv.tool_call_id))
                    .unwrap_or_default();
                let message = format!(
                    "tool '{tool_name}' exceeded its {}s timeout",
                    timeout.as_secs()
                );
                Observation::ToolResult {
                    tool_name,
                    tool_call_id,
                    content: format!("Error: {message}"),
                    success: false,
                    error_message: Some(message),
                    error_kind: Some(FailureKind::Timeout),
                    cause: Some(cause),
                    metadata: None,
                }
            }
        }
    }

    fn interrupted_between_turns(&mut self) -> RunOutcome {
        let event = self.state.record_observation(
            Source::Environment,
            Observation::Interruption {
                content: AGENT_INTERRUPT_MESSAGE.to_owned(),
                cause: None,
            },
        );
        self.sink.publish(&event);
        self.sink.checkpoint(&self.state);
        self.set_state(AgentState::Thinking);
        RunOutcome::Interrupted
    }

    fn finish(&mut self, final_answer: String) -> RunOutcome {
        self.set_state(AgentState::Completed);
        self.sink.checkpoint(&self.state);
        TraceEvent::TurnFinished {
            session_id: self.state.session_id.clone(),
            turns: self.state.history.len() as u32,
            agent_state: "completed".into(),
        }
        .emit();
        RunOutcome::Completed { final_answer }
    }

    fn record_error(&mut self, message: String) {
        let event = self
            .state
            .record_observation(Source::Environment, Observation::RuntimeError {
                content: message,
            });
        self.sink.publish(&event);
        self.set_state(AgentState::Error);
        self.sink.checkpoint(&self.state);
    }

    /// Mutate the state-machine position and notify remote observers
    /// without growing the durable log.
    fn set_state(&mut self, agent_state: AgentState) {
        if self.state.agent_state == agent_state {
            return;
        }
        self.state.agent_state = agent_state;
        let notice = axon_domain::Event::observation(
            self.state.history.last().map(|e| e.id).unwrap_or(0),
            Source::Environment,
            Observation::AgentStateChanged { agent_state },
        );
        self.sink.publish_transient(&notice);
    }
}
