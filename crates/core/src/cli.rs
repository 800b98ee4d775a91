//! CLI surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use axon_domain::config::{Config, ContextStrategyName};
use axon_domain::Result;

/// axon — an agent execution core.
#[derive(Debug, Parser)]
#[command(name = "axon", version, about)]
pub struct Cli {
    /// Root for tool file I/O.
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// One-shot prompt; when absent, enter the interactive loop.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Model identifier sent to the provider (e.g. "claude-sonnet-4-20250514").
    #[arg(long)]
    pub model_name: Option<String>,

    /// Which configured LLM provider to use.
    #[arg(long)]
    pub llm_client: Option<String>,

    /// Context-budget strategy.
    #[arg(long, value_enum, default_value_t = MemoryTool::Simple)]
    pub memory_tool: MemoryTool,

    /// Maximum agent turns per user message.
    #[arg(long, default_value_t = 200)]
    pub max_turns: u32,

    /// Maximum tokens per LLM response.
    #[arg(long, default_value_t = 32_768)]
    pub max_output_tokens: u32,

    /// Reopen a stored session instead of starting a fresh one.
    #[arg(long)]
    pub session: Option<String>,

    /// Run the reviewer sub-loop after the agent completes.
    #[arg(long)]
    pub review: bool,

    /// Path to a config.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the session server (HTTP + websocket event streams).
    Serve {
        /// Bind address, e.g. 127.0.0.1:8791.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MemoryTool {
    /// Summarize the tail with the LLM, truncate as fallback.
    CompactifyMemory,
    /// No context management.
    None,
    /// Truncation only.
    Simple,
}

impl Cli {
    /// Load the config file (or defaults) and fold the flag overrides in.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(ws) = &self.workspace {
            config.workspace.path = ws.clone();
        }
        config.context.strategy = match self.memory_tool {
            MemoryTool::CompactifyMemory => ContextStrategyName::CompactifyMemory,
            MemoryTool::None => ContextStrategyName::None,
            MemoryTool::Simple => ContextStrategyName::Simple,
        };
        config.runtime.max_turns = self.max_turns;
        config.runtime.max_output_tokens = self.max_output_tokens;
        if self.review {
            config.runtime.review = true;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["axon"]);
        assert_eq!(cli.max_turns, 200);
        assert_eq!(cli.max_output_tokens, 32_768);
        assert_eq!(cli.memory_tool, MemoryTool::Simple);
        assert!(cli.prompt.is_none());
    }

    #[test]
    fn memory_tool_kebab_names_parse() {
        let cli = Cli::parse_from(["axon", "--memory-tool", "compactify-memory"]);
        assert_eq!(cli.memory_tool, MemoryTool::CompactifyMemory);
        let cli = Cli::parse_from(["axon", "--memory-tool", "none"]);
        assert_eq!(cli.memory_tool, MemoryTool::None);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "axon",
            "--max-turns",
            "7",
            "--memory-tool",
            "none",
            "--workspace",
            "/tmp",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.runtime.max_turns, 7);
        assert_eq!(config.context.strategy, ContextStrategyName::None);
        assert_eq!(config.workspace.path, PathBuf::from("/tmp"));
    }

    #[test]
    fn serve_subcommand_parses() {
        let cli = Cli::parse_from(["axon", "serve", "--bind", "0.0.0.0:9000"]);
        match cli.command {
            Some(Command::Serve { bind }) => assert_eq!(bind.as_deref(), Some("0.0.0.0:9000")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
