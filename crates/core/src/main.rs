use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use axon_core::cli::{Cli, Command};
use axon_core::controller::RunOutcome;
use axon_core::runtime::CoreState;
use axon_core::{reviewer, server};
use axon_domain::config::{Config, ConfigSeverity, ProviderConfig, ProviderKind};

/// Exit codes: 0 completed, 1 agent error, 2 invalid args, 130 interrupt.
const EXIT_OK: u8 = 0;
const EXIT_AGENT_ERROR: u8 = 1;
const EXIT_INVALID_ARGS: u8 = 2;
const EXIT_INTERRUPT: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match cli.resolve_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("axon: {e}");
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };
    ensure_default_providers(&mut config);

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        eprintln!("axon: configuration is invalid");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let state = match CoreState::bootstrap(
        Arc::new(config),
        cli.llm_client.as_deref(),
        cli.model_name.clone(),
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("axon: {e}");
            return ExitCode::from(EXIT_AGENT_ERROR);
        }
    };

    match &cli.command {
        Some(Command::Serve { bind }) => {
            let bind = bind.clone().unwrap_or_else(|| state.config.server.bind.clone());
            run_server(state, &bind).await
        }
        None => match &cli.prompt {
            Some(prompt) => run_one_shot(state, &cli, prompt).await,
            None => run_interactive(state, &cli).await,
        },
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// When no providers are configured, synthesize the conventional entries;
/// the registry skips any whose API key env var is missing.
fn ensure_default_providers(config: &mut Config) {
    if !config.llm.providers.is_empty() {
        return;
    }
    config.llm.providers = vec![
        ProviderConfig {
            id: "anthropic".into(),
            kind: ProviderKind::Anthropic,
            base_url: None,
            api_key_env: None,
            default_model: None,
            max_connections: 8,
            request_timeout_sec: 120,
        },
        ProviderConfig {
            id: "openai".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: None,
            api_key_env: None,
            default_model: None,
            max_connections: 8,
            request_timeout_sec: 120,
        },
    ];
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Modes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_server(state: Arc<CoreState>, bind: &str) -> ExitCode {
    tokio::select! {
        result = server::serve(state, bind) => match result {
            Ok(()) => ExitCode::from(EXIT_OK),
            Err(e) => {
                eprintln!("axon: server error: {e}");
                ExitCode::from(EXIT_AGENT_ERROR)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("axon: shutting down");
            ExitCode::from(EXIT_INTERRUPT)
        }
    }
}

async fn run_one_shot(state: Arc<CoreState>, cli: &Cli, prompt: &str) -> ExitCode {
    let session_id = cli
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let workspace = state.config.workspace.path.clone();
    if !workspace.exists() {
        eprintln!("axon: workspace '{}' does not exist", workspace.display());
        return ExitCode::from(EXIT_INVALID_ARGS);
    }
    if let Err(e) = state.sessions.resolve_or_create(&session_id, &workspace) {
        eprintln!("axon: {e}");
        return ExitCode::from(EXIT_AGENT_ERROR);
    }

    let handle = match state.session(&session_id) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("axon: {e}");
            return ExitCode::from(EXIT_AGENT_ERROR);
        }
    };

    let outcome = tokio::select! {
        outcome = handle.send_user_message(prompt, Vec::new()) => outcome,
        _ = tokio::signal::ctrl_c() => {
            handle.interrupt();
            eprintln!("axon: interrupted");
            return ExitCode::from(EXIT_INTERRUPT);
        }
    };

    match outcome {
        Ok(RunOutcome::Completed { final_answer }) => {
            let answer = if state.config.runtime.review {
                reviewer::run_review(&state, &session_id, &workspace, prompt, &final_answer).await
            } else {
                final_answer
            };
            println!("{answer}");
            ExitCode::from(EXIT_OK)
        }
        Ok(RunOutcome::Waiting) => {
            eprintln!(
                "axon: agent is waiting for input; continue with --session {session_id}"
            );
            ExitCode::from(EXIT_OK)
        }
        Ok(RunOutcome::Interrupted) => {
            eprintln!("axon: interrupted");
            ExitCode::from(EXIT_INTERRUPT)
        }
        Ok(RunOutcome::MaxTurnsExceeded) => {
            eprintln!("axon: max turns exceeded");
            ExitCode::from(EXIT_AGENT_ERROR)
        }
        Err(e) => {
            eprintln!("axon: {e}");
            ExitCode::from(EXIT_AGENT_ERROR)
        }
    }
}

async fn run_interactive(state: Arc<CoreState>, cli: &Cli) -> ExitCode {
    let session_id = cli
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let workspace = state.config.workspace.path.clone();
    if !workspace.exists() {
        eprintln!("axon: workspace '{}' does not exist", workspace.display());
        return ExitCode::from(EXIT_INVALID_ARGS);
    }
    if let Err(e) = state.sessions.resolve_or_create(&session_id, &workspace) {
        eprintln!("axon: {e}");
        return ExitCode::from(EXIT_AGENT_ERROR);
    }
    let handle = match state.session(&session_id) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("axon: {e}");
            return ExitCode::from(EXIT_AGENT_ERROR);
        }
    };

    // Keep stdout clean for agent output; the chrome goes to stderr.
    eprintln!("axon interactive session {session_id}");
    eprintln!("Type a task, /exit to quit, Ctrl+C twice to abort.");

    let mut rl = match rustyline::DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("axon: readline unavailable: {e}");
            return ExitCode::from(EXIT_AGENT_ERROR);
        }
    };

    let mut interrupts = 0u32;
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                interrupts = 0;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);
                if trimmed == "/exit" || trimmed == "/quit" {
                    return ExitCode::from(EXIT_OK);
                }

                let outcome = tokio::select! {
                    outcome = handle.send_user_message(trimmed, Vec::new()) => outcome,
                    _ = tokio::signal::ctrl_c() => {
                        handle.interrupt();
                        eprintln!("[interrupted]");
                        continue;
                    }
                };
                match outcome {
                    Ok(RunOutcome::Completed { final_answer }) => println!("{final_answer}"),
                    Ok(RunOutcome::Waiting) => eprintln!("[agent is waiting for your reply]"),
                    Ok(RunOutcome::Interrupted) => eprintln!("[interrupted]"),
                    Ok(RunOutcome::MaxTurnsExceeded) => eprintln!("[max turns exceeded]"),
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                interrupts += 1;
                if interrupts >= 2 {
                    return ExitCode::from(EXIT_INTERRUPT);
                }
                eprintln!("(press Ctrl+C again or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                return ExitCode::from(EXIT_OK);
            }
            Err(e) => {
                eprintln!("axon: readline error: {e}");
                return ExitCode::from(EXIT_AGENT_ERROR);
            }
        }
    }
}
