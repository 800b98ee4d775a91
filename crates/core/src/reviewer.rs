//! Reviewer sub-loop — a second controller that critiques the main run.
//!
//! Runs sequentially after the main agent completes, over the same
//! workspace and tool set, with its own session log and its own completion
//! tool (`return_control_to_general_agent`). The feedback it returns
//! replaces the final answer surfaced to the user.

use std::path::Path;
use std::sync::Arc;

use crate::controller::RunOutcome;
use crate::prompts::review_instruction;
use crate::runtime::{ControllerKind, CoreState};

/// Review a completed run and return the feedback to surface.
pub async fn run_review(
    state: &Arc<CoreState>,
    session_id: &str,
    workspace_root: &Path,
    task: &str,
    result: &str,
) -> String {
    let review_session = format!("{session_id}-review-{}", uuid::Uuid::new_v4().as_simple());

    let mut controller =
        match state.make_controller(&review_session, workspace_root, ControllerKind::Reviewer) {
            Ok(c) => c,
            Err(e) => return format!("Review failed to start: {e}"),
        };

    let instruction = review_instruction(task, result, &workspace_root.display().to_string());
    controller.submit_user_message(&instruction, Vec::new());

    match controller.run().await {
        Ok(RunOutcome::Completed { final_answer }) => final_answer,
        Ok(RunOutcome::MaxTurnsExceeded) => {
            "ERROR: Review did not complete within maximum turns.".to_owned()
        }
        Ok(RunOutcome::Interrupted) => "[review interrupted]".to_owned(),
        Ok(RunOutcome::Waiting) => {
            // A reviewer has nobody to wait on; treat it as a failed review.
            "ERROR: Reviewer paused for input; no feedback produced.".to_owned()
        }
        Err(e) => format!("Review failed due to error: {e}"),
    }
}
