//! docdex CLI Module
//! Command-line interface for docdex projects

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docdex")]
#[command(author = "docdex contributors")]
#[command(version)]
#[command(about = "Typed secondary indexes and conjunctive queries over a key-value document store", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new docdex project in <project>/<name>
    Init {
        /// Project name
        #[arg(short, long)]
        name: String,

        /// Keep documents in memory only
        #[arg(long)]
        memory: bool,
    },

    /// Start local API server
    Serve {
        /// Port to listen on (defaults to the config value)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (defaults to the config value)
        #[arg(long)]
        host: Option<String>,
    },

    /// Replace the people entity's documents with the demo set
    Seed,

    /// Show project status
    Status,

    /// Rebuild index buckets from storage
    Reindex {
        /// Entity type (all when omitted)
        entity: Option<String>,
    },

    /// Check index buckets against storage
    Verify {
        /// Entity type (all when omitted)
        entity: Option<String>,
    },
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["docdex", "reindex", "people", "--format", "json", "-p", "/tmp/x"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.get_project_dir(), PathBuf::from("/tmp/x"));
        assert!(matches!(cli.command, Commands::Reindex { entity: Some(ref e) } if e == "people"));
    }

    #[test]
    fn test_serve_defaults_come_from_config() {
        let cli = Cli::parse_from(["docdex", "serve"]);
        assert!(matches!(cli.command, Commands::Serve { port: None, host: None }));
        assert_eq!(cli.format, OutputFormat::Text);
    }
}
