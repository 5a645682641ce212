//! CLI interface for gomod-branch-audit.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod branches;
pub mod comment;

pub use branches::BranchesCommand;
pub use comment::CommentCommand;

/// gomod-branch-audit: branch audit for go.mod dependencies
#[derive(Parser)]
#[command(name = "gomod-branch-audit")]
#[command(about = "Audits which branches contain the commits pinned in go.mod", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The main command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Main command categories
#[derive(Subcommand)]
pub enum Commands {
    /// Reports branch information for each go.mod dependency
    Branches(BranchesCommand),
    /// Posts review comments from a comments file onto a pull request
    Comment(CommentCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Branches(cmd) => cmd.execute().await,
            Commands::Comment(cmd) => cmd.execute().await,
        }
    }
}
