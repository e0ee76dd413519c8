//! Command line arguments

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use yprompt_core_types::ApiFamily;

#[derive(Parser, Debug)]
#[command(name = "yprompt")]
#[command(version, about = "Talk to OpenAI, Anthropic and Gemini models through one interface", long_about = None)]
pub struct Cli {
    /// Providers file (default: <config dir>/yprompt/providers.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// API key overriding the one in the providers file
    #[arg(long, env = "YPROMPT_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt and print the answer
    Chat {
        /// Provider id from the providers file
        #[arg(short, long)]
        provider: String,

        /// Model id
        #[arg(short, long)]
        model: String,

        /// System prompt sent before the user message
        #[arg(short, long)]
        system: Option<String>,

        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// Also print whether the answer asked to end the conversation
        #[arg(long)]
        detailed: bool,

        /// Prompt text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Detect connectivity and reasoning support of a model
    Probe {
        #[arg(short, long)]
        provider: String,

        #[arg(short, long)]
        model: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the models a provider advertises
    Models {
        #[arg(short, long)]
        provider: String,
    },

    /// Print provider templates in providers-file format
    Providers {
        /// Only print this family
        #[arg(value_enum)]
        family: Option<FamilyArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FamilyArg {
    Openai,
    Anthropic,
    Google,
    Custom,
}

impl From<FamilyArg> for ApiFamily {
    fn from(value: FamilyArg) -> Self {
        match value {
            FamilyArg::Openai => ApiFamily::OpenAi,
            FamilyArg::Anthropic => ApiFamily::Anthropic,
            FamilyArg::Google => ApiFamily::Google,
            FamilyArg::Custom => ApiFamily::Custom,
        }
    }
}
