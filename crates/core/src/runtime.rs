//! Process-wide runtime state and per-session assembly.
//!
//! `CoreState` owns the shared pieces (config, LLM client, tool registries,
//! session store, cancel map, event buses); everything session-scoped —
//! tool manager, agent, sink, controller — is built per session so nothing
//! holds a back-pointer into the runtime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use axon_context::ContextManager;
use axon_domain::config::{Config, ContextStrategyName};
use axon_domain::{AgentState, Error, Event, Result, State};
use axon_providers::{LlmClient, ProviderRegistry};
use axon_sessions::SessionStore;
use axon_tools::manager::CompletionSpec;
use axon_tools::{ToolManager, ToolRegistry};

use crate::agent::{Agent, LlmSummarizer};
use crate::cancel::CancelMap;
use crate::controller::{AgentController, ControllerConfig};
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, REVIEWER_SYSTEM_PROMPT};
use crate::session::SessionHandle;
use crate::sink::EventSink;

/// Which of the two loop flavors a controller is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Main,
    Reviewer,
}

pub struct CoreState {
    pub config: Arc<Config>,
    pub llm: Arc<LlmClient>,
    pub main_registry: Arc<ToolRegistry>,
    pub reviewer_registry: Arc<ToolRegistry>,
    pub sessions: Arc<SessionStore>,
    pub cancel_map: Arc<CancelMap>,
    /// Model override from the CLI (`--model-name`).
    pub model: Option<String>,
    buses: Mutex<HashMap<String, broadcast::Sender<Event>>>,
    actors: Mutex<HashMap<String, SessionHandle>>,
}

impl CoreState {
    /// Boot the shared runtime: provider registry, tool registries, store.
    pub fn bootstrap(
        config: Arc<Config>,
        llm_client: Option<&str>,
        model: Option<String>,
    ) -> Result<Arc<Self>> {
        let providers = ProviderRegistry::from_config(&config.llm)?;
        let provider = providers.resolve(llm_client)?;
        tracing::info!(
            provider = provider.provider_id(),
            model = model.as_deref().unwrap_or(provider.default_model()),
            "LLM client ready"
        );
        let llm = Arc::new(LlmClient::new(provider, &config.llm));

        let sessions = Arc::new(SessionStore::new(&config.workspace.state_path)?);

        Ok(Arc::new(Self {
            config,
            llm,
            main_registry: Arc::new(axon_tools::builtin::default_registry()),
            reviewer_registry: Arc::new(axon_tools::builtin::reviewer_registry()),
            sessions,
            cancel_map: Arc::new(CancelMap::new()),
            model,
            buses: Mutex::new(HashMap::new()),
            actors: Mutex::new(HashMap::new()),
        }))
    }

    /// The broadcast bus feeding a session's websocket subscribers.
    pub fn bus(&self, session_id: &str) -> broadcast::Sender<Event> {
        self.buses
            .lock()
            .entry(session_id.to_owned())
            .or_insert_with(|| {
                broadcast::channel(self.config.server.event_queue_capacity.max(16)).0
            })
            .clone()
    }

    /// Fetch or spawn the actor serializing a session's user messages.
    pub fn session(self: &Arc<Self>, session_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.actors.lock().get(session_id) {
            return Ok(handle.clone());
        }
        let handle = crate::session::spawn_session(self.clone(), session_id)?;
        self.actors
            .lock()
            .insert(session_id.to_owned(), handle.clone());
        Ok(handle)
    }

    /// Tear down a session: cancel, forget the actor, delete the storage.
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        self.cancel_map.cancel(session_id);
        self.cancel_map.remove(session_id);
        self.actors.lock().remove(session_id);
        self.buses.lock().remove(session_id);
        self.sessions.delete(session_id)
    }

    /// The context manager for this deployment's strategy, with the LLM
    /// summarizer wired in when compaction is on.
    pub fn context_manager(&self) -> ContextManager {
        let summarizer = match self.config.context.strategy {
            ContextStrategyName::CompactifyMemory => Some(Arc::new(LlmSummarizer::new(
                self.llm.clone(),
                self.model.clone(),
            )) as Arc<dyn axon_context::Summarizer>),
            _ => None,
        };
        ContextManager::new(&self.config.context, summarizer)
    }

    /// Assemble a controller for a session, resuming from the stored event
    /// log when one exists.
    pub fn make_controller(
        &self,
        session_id: &str,
        workspace_root: &Path,
        kind: ControllerKind,
    ) -> Result<AgentController> {
        let (entry, _is_new) = self
            .sessions
            .resolve_or_create(session_id, workspace_root)?;
        let workspace: PathBuf = entry.workspace_root.clone();
        if !workspace.exists() {
            return Err(Error::Config(format!(
                "workspace root '{}' does not exist",
                workspace.display()
            )));
        }

        let (events, checkpoint) = self.sessions.load(session_id)?;
        let mut state = State::from_events(session_id, events);
        if let Some(saved) = checkpoint {
            // The log is the source of truth for history; the checkpoint
            // contributes the scratch outputs and last known position.
            state.outputs = saved.outputs;
            if saved.agent_state == AgentState::Completed {
                state.agent_state = AgentState::Completed;
            }
        }

        let cancel = self.cancel_map.token(session_id);
        let ctx = axon_tools::ToolContext::new(session_id, workspace).with_cancel(cancel.clone());

        let (registry, completions, system_prompt) = match kind {
            ControllerKind::Main => (
                self.main_registry.clone(),
                vec![
                    CompletionSpec::new("complete", "final_answer"),
                    CompletionSpec::new("return_control_to_user", "final_answer"),
                ],
                DEFAULT_SYSTEM_PROMPT,
            ),
            ControllerKind::Reviewer => (
                self.reviewer_registry.clone(),
                vec![CompletionSpec::new(
                    "return_control_to_general_agent",
                    "feedback",
                )],
                REVIEWER_SYSTEM_PROMPT,
            ),
        };

        let tools = Arc::new(
            ToolManager::new(registry, ctx)
                .with_completions(completions)
                .with_max_output_chars(self.config.runtime.max_tool_output_chars),
        );

        let agent = Agent::new(
            self.llm.clone(),
            system_prompt,
            tools.definitions(),
            self.context_manager(),
            self.config.runtime.max_output_tokens,
            self.config.runtime.temperature,
            self.config.runtime.completion_sentinel.clone(),
            self.model.clone(),
        );

        let sink = EventSink::new(
            session_id,
            self.sessions.clone(),
            self.bus(session_id),
            self.config.server.event_queue_capacity,
        );

        let controller_config = ControllerConfig {
            max_turns: self.config.runtime.max_turns,
            tool_timeout: self.config.runtime.tool_timeout(),
        };

        Ok(AgentController::new(
            agent,
            tools,
            sink,
            cancel,
            controller_config,
            state,
        ))
    }
}
