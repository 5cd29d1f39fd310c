use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tekton-register",
    version,
    about = "Register Tekton components with the Hermes service registry"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Register a component and keep its heartbeat alive until interrupted
    Register {
        /// Component id to register
        #[arg(long)]
        component: String,
        /// Path to the component manifest (discovered under TEKTON_ROOT
        /// when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Registry endpoint (defaults to HERMES_URL)
        #[arg(long)]
        hermes_url: Option<String>,
    },
    /// Unregister a component
    Unregister {
        /// Component id to unregister
        #[arg(long)]
        component: String,
        /// Registry endpoint (defaults to HERMES_URL)
        #[arg(long)]
        hermes_url: Option<String>,
    },
    /// Show the registration status of a component
    Status {
        /// Component id to query
        #[arg(long)]
        component: String,
        /// Registry endpoint (defaults to HERMES_URL)
        #[arg(long)]
        hermes_url: Option<String>,
    },
    /// Generate a starter manifest for a new component
    Generate {
        /// Component id for the manifest
        #[arg(long)]
        component: String,
        /// Human-readable component name (defaults to the id)
        #[arg(long)]
        name: Option<String>,
        /// Port the component listens on
        #[arg(long, default_value_t = 8000)]
        port: u16,
        /// Output path (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List registered components
    List {
        /// Registry endpoint (defaults to HERMES_URL)
        #[arg(long)]
        hermes_url: Option<String>,
    },
}
