use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "panel")]
#[command(about = "Employee task panel: gated step workflow with live sync")]
#[command(long_about = "Inspect the nine-step task workflow, run a complete task against the \
                       in-memory reference backend, or print the effective configuration. \
                       Start with 'panel steps' to see the branch table and its gates.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the workflow steps, their gates and the branch table
    Steps,
    /// Run one task from assignment to review on the in-memory backend
    Simulate {
        /// Create the task with the identity flow skipped
        #[arg(long, help = "Skip steps 3 to 6 by jumping from rating to the SMS code step")]
        skip_identity: bool,
        /// Decline the identity video at step 3
        #[arg(long, help = "Answer the identity-video dialog with 'not possible'")]
        decline: bool,
    },
    /// Print the effective configuration
    Config {
        /// Load from this file instead of the default layers
        #[arg(long, help = "Path to a TOML configuration file")]
        path: Option<String>,
    },
}
