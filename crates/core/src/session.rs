//! Per-session actor: serializes user messages into the controller.
//!
//! One task owns each session's controller, so there is never more than
//! one run in flight per session. The edit-query flow rides on this:
//! raising the cancel signal stops the current run, and when the actor
//! picks up the replacement message it truncates the superseded turn
//! before appending the new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use axon_domain::{Error, Result};
use axon_tools::CancelToken;

use crate::controller::RunOutcome;
use crate::runtime::{ControllerKind, CoreState};

enum SessionCommand {
    UserMessage {
        text: String,
        files: Vec<String>,
        reply: oneshot::Sender<Result<RunOutcome>>,
    },
}

/// Cheap cloneable handle to a session's actor.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    tx: mpsc::Sender<SessionCommand>,
    cancel: CancelToken,
    busy: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Whether a run is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Raise the cancel signal for the in-flight run.
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    /// Queue a user message and wait for its run to finish.
    ///
    /// When a run is already in flight this is an edit-query: the current
    /// run is cancelled, the superseded turn is dropped, and this message
    /// takes its place.
    pub async fn send_user_message(
        &self,
        text: impl Into<String>,
        files: Vec<String>,
    ) -> Result<RunOutcome> {
        if self.is_busy() {
            self.interrupt();
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::UserMessage {
                text: text.into(),
                files,
                reply,
            })
            .await
            .map_err(|_| Error::Session(format!("session '{}' is gone", self.session_id)))?;
        rx.await
            .map_err(|_| Error::Session(format!("session '{}' dropped the reply", self.session_id)))?
    }
}

/// Spawn the actor for a session, resuming it from the store.
pub fn spawn_session(state: Arc<CoreState>, session_id: &str) -> Result<SessionHandle> {
    let workspace_root = state
        .sessions
        .get(session_id)
        .map(|entry| entry.workspace_root)
        .unwrap_or_else(|| state.config.workspace.path.clone());

    let mut controller = state.make_controller(session_id, &workspace_root, ControllerKind::Main)?;
    let cancel = controller.cancel_token();
    let busy = Arc::new(AtomicBool::new(false));

    let (tx, mut rx) = mpsc::channel::<SessionCommand>(8);
    let busy_in = busy.clone();
    let actor_session = session_id.to_owned();
    tokio::spawn(async move {
        let mut last_interrupted = false;
        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::UserMessage { text, files, reply } => {
                    if last_interrupted {
                        // The interrupted turn is superseded by this one.
                        controller.clear_from_last_user();
                    }
                    controller.submit_user_message(&text, files);

                    busy_in.store(true, Ordering::Release);
                    let outcome = controller.run().await;
                    busy_in.store(false, Ordering::Release);

                    last_interrupted = matches!(outcome, Ok(RunOutcome::Interrupted));
                    let _ = reply.send(outcome);
                }
            }
        }
        tracing::debug!(session_id = %actor_session, "session actor stopped");
    });

    Ok(SessionHandle {
        session_id: session_id.to_owned(),
        tx,
        cancel,
        busy,
    })
}
