//! End-to-end scenarios for the controller loop, driven by a scripted
//! provider and fake tools. Covers the full state machine: completion,
//! tool dispatch, error recovery, context overflow, cancellation, and the
//! max-turns guard, plus the event-log invariants.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::broadcast;

use axon_context::{count_messages, project_events, ContextManager};
use axon_core::{Agent, AgentController, ControllerConfig, EventSink, RunOutcome};
use axon_domain::event::FailureKind;
use axon_domain::tool::{ToolCall, ToolOutput};
use axon_domain::usage::LlmUsage;
use axon_domain::{Action, AgentState, Error, Observation, Payload, Result, State};
use axon_providers::retry::RetryConfig;
use axon_providers::{AssistantBlock, ChatRequest, ChatResponse, LlmClient, LlmProvider};
use axon_sessions::SessionStore;
use axon_tools::{Tool, ToolContext, ToolManager, ToolRegistry};

const SENTINEL: &str = "ALL_WORK_FINISHED";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ScriptedProvider {
    script: Mutex<VecDeque<ChatResponse>>,
    /// Returned once the script runs out; `None` means an empty response
    /// (which the agent treats as completion).
    repeat: Option<ChatResponse>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn repeating(response: ChatResponse) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(req.clone());
        if let Some(next) = self.script.lock().pop_front() {
            return Ok(next);
        }
        if let Some(repeat) = &self.repeat {
            return Ok(repeat.clone());
        }
        Ok(empty_response())
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

fn empty_response() -> ChatResponse {
    ChatResponse {
        blocks: Vec::new(),
        usage: LlmUsage::default(),
        model: "scripted-model".into(),
        finish_reason: Some("stop".into()),
    }
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        blocks: vec![AssistantBlock::Text(text.into())],
        usage: LlmUsage::default(),
        model: "scripted-model".into(),
        finish_reason: Some("stop".into()),
    }
}

fn tool_response(call_id: &str, name: &str, input: Value) -> ChatResponse {
    ChatResponse {
        blocks: vec![AssistantBlock::ToolCall(ToolCall {
            tool_call_id: call_id.into(),
            tool_name: name.into(),
            tool_input: input,
        })],
        usage: LlmUsage::default(),
        model: "scripted-model".into(),
        finish_reason: Some("tool_calls".into()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fake tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `file_read` stub that always returns fixed contents.
struct StubFileRead;

#[async_trait::async_trait]
impl Tool for StubFileRead {
    fn name(&self) -> &str {
        "file_read"
    }
    fn description(&self) -> &str {
        "stub reader"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })
    }
    async fn run(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        Ok(ToolOutput::Text("contents".into()))
    }
}

/// `cmd_run` stub: fails on the command "banned", succeeds otherwise.
struct StubCmdRun {
    calls: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl Tool for StubCmdRun {
    fn name(&self) -> &str {
        "cmd_run"
    }
    fn description(&self) -> &str {
        "stub shell"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command"]
        })
    }
    async fn run(&self, input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let command = input["command"].as_str().unwrap_or_default();
        if command == "banned" {
            return Err(Error::ToolExecution("banned".into()));
        }
        Ok(ToolOutput::Text("ok".into()))
    }
}

/// Sleeps for ten seconds unless the cancel signal aborts it first.
struct SlowTool {
    dispatches: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow_tool"
    }
    fn description(&self) -> &str {
        "sleeps"
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn run(&self, _input: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        for _ in 0..200 {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled("slow_tool aborted".into()));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(ToolOutput::Text("slept".into()))
    }
}

struct NoopTool;

#[async_trait::async_trait]
impl Tool for NoopTool {
    fn name(&self) -> &str {
        "noop"
    }
    fn description(&self) -> &str {
        "does nothing"
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn run(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        Ok(ToolOutput::Text("noop".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    controller: AgentController,
    _dir: TempDir,
}

fn build_harness(
    provider: Arc<ScriptedProvider>,
    registry: ToolRegistry,
    max_turns: u32,
    token_budget: usize,
) -> Harness {
    build_harness_with_state(provider, registry, max_turns, token_budget, State::new("s1"))
}

fn build_harness_with_state(
    provider: Arc<ScriptedProvider>,
    registry: ToolRegistry,
    max_turns: u32,
    token_budget: usize,
    state: State,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SessionStore::new(&dir.path().join("state")).unwrap());
    store.resolve_or_create("s1", dir.path()).unwrap();

    let retry = RetryConfig::default()
        .with_max_retries(0)
        .with_base_delay(Duration::from_millis(1));
    let llm = Arc::new(LlmClient::with_retry(provider, retry));

    let ctx = ToolContext::new("s1", dir.path());
    let cancel = ctx.cancel.clone();
    let tools = Arc::new(ToolManager::new(Arc::new(registry), ctx));

    let agent = Agent::new(
        llm,
        "You are a test agent.",
        tools.definitions(),
        ContextManager::truncating(token_budget),
        4_096,
        None,
        SENTINEL,
        None,
    );

    let (remote, _) = broadcast::channel(64);
    let sink = EventSink::new("s1", store, remote, 64);

    let controller = AgentController::new(
        agent,
        tools,
        sink,
        cancel,
        ControllerConfig {
            max_turns,
            tool_timeout: Duration::from_secs(30),
        },
        state,
    );

    Harness {
        controller,
        _dir: dir,
    }
}

fn event_kinds(state: &State) -> Vec<&'static str> {
    state
        .history
        .iter()
        .map(|e| match &e.payload {
            Payload::Observation(Observation::UserMessage { .. }) => "user_message",
            Payload::Observation(Observation::ToolResult { success, .. }) => {
                if *success {
                    "tool_result"
                } else {
                    "tool_result_failed"
                }
            }
            Payload::Observation(Observation::FileReadResult { .. }) => "file_read_result",
            Payload::Observation(Observation::CmdOutput { .. }) => "cmd_output",
            Payload::Observation(Observation::Interruption { .. }) => "interruption",
            Payload::Observation(Observation::RuntimeError { .. }) => "runtime_error",
            Payload::Observation(_) => "observation",
            Payload::Action(Action::Message { .. }) => "message",
            Payload::Action(Action::Complete { .. }) => "complete",
            Payload::Action(Action::FileRead { .. }) => "file_read",
            Payload::Action(Action::CmdRun { .. }) => "cmd_run",
            Payload::Action(_) => "action",
        })
        .collect()
}

/// Event-log invariants that must hold for every session (monotonic ids,
/// causality).
fn assert_log_invariants(state: &State) {
    let mut last_id = 0;
    for event in &state.history {
        assert!(event.id > last_id, "ids must be strictly increasing");
        last_id = event.id;
    }
    for event in &state.history {
        if let Payload::Observation(obs) = &event.payload {
            if let Some(cause) = obs.cause() {
                let action = state
                    .history
                    .iter()
                    .find(|e| e.id == cause)
                    .unwrap_or_else(|| panic!("cause {cause} missing from log"));
                assert!(matches!(action.payload, Payload::Action(_)));
                assert!(action.id < event.id, "cause must precede its observation");
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S1 — no-op
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s1_plain_text_answer_completes() {
    let provider = ScriptedProvider::new(vec![text_response("hi")]);
    let mut h = build_harness(provider, ToolRegistry::new(), 200, 100_000);

    h.controller.submit_user_message("hello", Vec::new());
    let outcome = h.controller.run().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed { final_answer: "hi".into() }
    );
    assert_eq!(h.controller.state.agent_state, AgentState::Completed);
    assert_eq!(
        event_kinds(&h.controller.state),
        vec!["user_message", "message", "complete"]
    );
    assert_log_invariants(&h.controller.state);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S2 — single tool call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s2_single_tool_call_roundtrip() {
    let provider = ScriptedProvider::new(vec![
        tool_response("tc_1", "file_read", json!({ "path": "x" })),
        text_response("done"),
    ]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StubFileRead));
    let mut h = build_harness(provider, registry, 200, 100_000);

    h.controller.submit_user_message("read file x", Vec::new());
    let outcome = h.controller.run().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed { final_answer: "done".into() }
    );
    assert_eq!(
        event_kinds(&h.controller.state),
        vec![
            "user_message",
            "file_read",
            "file_read_result",
            "message",
            "complete"
        ]
    );

    // The call id pairs the observation with its action.
    let call_id = h.controller.state.history[1]
        .as_action()
        .unwrap()
        .tool_call_id()
        .unwrap()
        .to_owned();
    let result_id = h.controller.state.history[2]
        .as_observation()
        .unwrap()
        .tool_call_id()
        .unwrap()
        .to_owned();
    assert_eq!(call_id, result_id);

    // The observation carries the tool's output and the causing action.
    let obs = h.controller.state.history[2].as_observation().unwrap();
    assert_eq!(obs.content(), "contents");
    assert_eq!(obs.cause(), Some(h.controller.state.history[1].id));
    assert_log_invariants(&h.controller.state);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S3 — tool error, agent retries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s3_failed_tool_call_is_retried_by_the_agent() {
    let provider = ScriptedProvider::new(vec![
        tool_response("tc_1", "cmd_run", json!({ "command": "banned" })),
        tool_response("tc_2", "cmd_run", json!({ "command": "echo ok" })),
        text_response("ran it"),
    ]);
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StubCmdRun { calls: calls.clone() }));
    let mut h = build_harness(provider, registry, 200, 100_000);

    h.controller.submit_user_message("run a command", Vec::new());
    let outcome = h.controller.run().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(h.controller.state.agent_state, AgentState::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let kinds = event_kinds(&h.controller.state);
    assert_eq!(
        kinds,
        vec![
            "user_message",
            "cmd_run",
            "tool_result_failed",
            "cmd_run",
            "cmd_output",
            "message",
            "complete"
        ]
    );

    // The failed observation carries the error message.
    match h.controller.state.history[2].as_observation().unwrap() {
        Observation::ToolResult { error_message, error_kind, .. } => {
            assert_eq!(error_message.as_deref(), Some("tool execution: banned"));
            assert_eq!(*error_kind, Some(FailureKind::ToolExecution));
        }
        other => panic!("unexpected observation: {other:?}"),
    }
    assert_log_invariants(&h.controller.state);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S4 — context overflow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s4_oversized_history_is_brought_under_budget() {
    let budget = 2_000;

    // Seed a 50-turn history far over the budget.
    let mut state = State::new("s1");
    for i in 0..25 {
        state.record_observation(
            axon_domain::Source::User,
            Observation::UserMessage {
                content: format!("question {i} {}", "x".repeat(600)),
                files: vec![],
            },
        );
        state.record_action(
            axon_domain::Source::Agent,
            Action::Message {
                content: format!("answer {i} {}", "y".repeat(600)),
                wait_for_response: false,
            },
        );
    }
    let seeded = project_events(&state.history).project_for_llm();
    assert!(count_messages(&seeded) > 2 * budget, "seed must overflow");

    let provider = ScriptedProvider::new(vec![text_response("summary reply")]);
    let mut h =
        build_harness_with_state(provider.clone(), ToolRegistry::new(), 200, budget, state);

    h.controller.submit_user_message("what now?", Vec::new());
    let outcome = h.controller.run().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    // The LLM saw at most the budget.
    let request = provider.last_request().expect("LLM must have been called");
    assert!(
        count_messages(&request.messages) <= budget,
        "request exceeded budget: {}",
        count_messages(&request.messages)
    );
    // The current question survived truncation.
    let texts: Vec<String> = request
        .messages
        .iter()
        .map(|m| m.content.extract_all_text())
        .collect();
    assert!(texts.iter().any(|t| t.contains("what now?")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S5 — cancellation mid-tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s5_cancellation_interrupts_and_edit_replaces_the_turn() {
    let dispatches = Arc::new(AtomicU32::new(0));
    let provider = ScriptedProvider::new(vec![
        tool_response("tc_1", "slow_tool", json!({})),
        // Script for the second run, after the edit:
        text_response("second answer"),
    ]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SlowTool { dispatches: dispatches.clone() }));
    let mut h = build_harness(provider, registry, 200, 100_000);

    h.controller.submit_user_message("long task", Vec::new());
    let cancel = h.controller.cancel_token();

    let runner = tokio::spawn(async move {
        let outcome = h.controller.run().await;
        (outcome, h)
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let (outcome, mut h) = runner.await.unwrap();
    assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);
    assert_eq!(dispatches.load(Ordering::SeqCst), 1);

    // The interruption observation answers the in-flight action.
    let kinds = event_kinds(&h.controller.state);
    assert_eq!(kinds, vec!["user_message", "action", "interruption"]);

    // Edit-query: truncate the superseded turn, append the new message.
    h.controller.clear_from_last_user();
    assert!(h.controller.state.history.is_empty());
    h.controller.submit_user_message("new task", Vec::new());
    assert_eq!(h.controller.state.agent_state, AgentState::Thinking);

    let outcome = h.controller.run().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed { final_answer: "second answer".into() }
    );
    assert_log_invariants(&h.controller.state);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S6 — max-turns guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn s6_max_turns_guard_halts_the_loop() {
    let provider =
        ScriptedProvider::repeating(tool_response("tc_loop", "noop", json!({})));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(NoopTool));
    let mut h = build_harness(provider, registry, 3, 100_000);

    h.controller.submit_user_message("loop forever", Vec::new());
    let outcome = h.controller.run().await.unwrap();

    assert_eq!(outcome, RunOutcome::MaxTurnsExceeded);
    assert_eq!(h.controller.state.agent_state, AgentState::Error);

    // Three acting turns, then the error event.
    let kinds = event_kinds(&h.controller.state);
    let dispatched = kinds.iter().filter(|k| **k == "tool_result").count();
    assert_eq!(dispatched, 3);
    assert_eq!(kinds.last(), Some(&"runtime_error"));
    assert_log_invariants(&h.controller.state);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Property checks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cancellation liveness: with the signal already raised, the controller
/// emits no further tool dispatches before observing the interruption.
#[tokio::test]
async fn cancel_before_run_short_circuits_dispatch() {
    let dispatches = Arc::new(AtomicU32::new(0));
    let provider = ScriptedProvider::new(vec![tool_response("tc_1", "slow_tool", json!({}))]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SlowTool { dispatches: dispatches.clone() }));
    let mut h = build_harness(provider, registry, 200, 100_000);

    h.controller.submit_user_message("task", Vec::new());
    h.controller.cancel_token().cancel();

    let outcome = h.controller.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Interrupted);
    assert_eq!(dispatches.load(Ordering::SeqCst), 0, "tool must not run");
    assert!(h
        .controller
        .state
        .history
        .iter()
        .any(|e| matches!(
            e.payload,
            Payload::Observation(Observation::Interruption { .. })
        )));
}

/// Termination: an empty-script provider (empty responses forever) halts
/// immediately with a completion.
#[tokio::test]
async fn empty_llm_response_terminates() {
    let provider = ScriptedProvider::new(vec![]);
    let mut h = build_harness(provider, ToolRegistry::new(), 200, 100_000);
    h.controller.submit_user_message("anything", Vec::new());
    let outcome = h.controller.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
}

/// The completion sentinel in plain text converts into a completion.
#[tokio::test]
async fn sentinel_text_completes_directly() {
    let provider =
        ScriptedProvider::new(vec![text_response(&format!("{SENTINEL}: everything passed"))]);
    let mut h = build_harness(provider, ToolRegistry::new(), 200, 100_000);
    h.controller.submit_user_message("check", Vec::new());
    let outcome = h.controller.run().await.unwrap();
    match outcome {
        RunOutcome::Completed { final_answer } => {
            assert!(final_answer.contains(SENTINEL));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    // Sentinel completion is a single Complete event, no Message.
    assert_eq!(
        event_kinds(&h.controller.state),
        vec!["user_message", "complete"]
    );
}

/// Unknown tools fail the action; the agent sees the failure and recovers.
#[tokio::test]
async fn unknown_tool_fails_the_action_only() {
    let provider = ScriptedProvider::new(vec![
        tool_response("tc_1", "imaginary_tool", json!({})),
        text_response("recovered"),
    ]);
    let mut h = build_harness(provider, ToolRegistry::new(), 200, 100_000);
    h.controller.submit_user_message("try it", Vec::new());
    let outcome = h.controller.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    match h.controller.state.history[2].as_observation().unwrap() {
        Observation::ToolResult { success, error_kind, .. } => {
            assert!(!success);
            assert_eq!(*error_kind, Some(FailureKind::UnknownTool));
        }
        other => panic!("unexpected observation: {other:?}"),
    }
}

/// A completion tool invocation stops the loop with its argument.
#[tokio::test]
async fn completion_tool_stops_the_loop() {
    let provider = ScriptedProvider::new(vec![tool_response(
        "tc_1",
        "complete",
        json!({ "final_answer": "shipped" }),
    )]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(axon_tools::builtin::control::CompleteTool));
    let mut h = build_harness(provider, registry, 200, 100_000);

    h.controller.submit_user_message("finish up", Vec::new());
    let outcome = h.controller.run().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed { final_answer: "shipped".into() }
    );
    assert_eq!(h.controller.state.agent_state, AgentState::Completed);
}

/// LLM failures that survive the retry policy surface as errors after the
/// error event is recorded.
#[tokio::test]
async fn llm_invalid_request_propagates() {
    struct BrokenProvider;

    #[async_trait::async_trait]
    impl LlmProvider for BrokenProvider {
        async fn generate(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Err(Error::InvalidRequest("schema rejected".into()))
        }
        fn provider_id(&self) -> &str {
            "broken"
        }
        fn default_model(&self) -> &str {
            "broken"
        }
    }

    let dir = TempDir::new().unwrap();
    let store = Arc::new(SessionStore::new(&dir.path().join("state")).unwrap());
    store.resolve_or_create("s1", dir.path()).unwrap();
    let llm = Arc::new(LlmClient::with_retry(
        Arc::new(BrokenProvider),
        RetryConfig::default().with_max_retries(0),
    ));
    let ctx = ToolContext::new("s1", dir.path());
    let cancel = ctx.cancel.clone();
    let tools = Arc::new(ToolManager::new(Arc::new(ToolRegistry::new()), ctx));
    let agent = Agent::new(
        llm,
        "test",
        Vec::new(),
        ContextManager::truncating(100_000),
        4_096,
        None,
        SENTINEL,
        None,
    );
    let (remote, _) = broadcast::channel(16);
    let sink = EventSink::new("s1", store, remote, 16);
    let mut controller = AgentController::new(
        agent,
        tools,
        sink,
        cancel,
        ControllerConfig::default(),
        State::new("s1"),
    );

    controller.submit_user_message("hello", Vec::new());
    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(controller.state.agent_state, AgentState::Error);
    assert!(controller.state.history.iter().any(|e| matches!(
        e.payload,
        Payload::Observation(Observation::RuntimeError { .. })
    )));
}

/// Projection idempotence over a real session log.
#[tokio::test]
async fn projection_is_idempotent_over_a_session_log() {
    let provider = ScriptedProvider::new(vec![
        tool_response("tc_1", "file_read", json!({ "path": "x" })),
        text_response("done"),
    ]);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StubFileRead));
    let mut h = build_harness(provider, registry, 200, 100_000);
    h.controller.submit_user_message("go", Vec::new());
    h.controller.run().await.unwrap();

    let once = project_events(&h.controller.state.history).project_for_llm();
    let twice = axon_context::history::project_turns(&once);
    assert_eq!(
        serde_json::to_value(&once).unwrap(),
        serde_json::to_value(&twice).unwrap()
    );
}
