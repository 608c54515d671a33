//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Weave document assembly CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Config file name (default: weave.toml)
    #[arg(short = 'C', long, default_value = "weave.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared arguments for the Assemble command
#[derive(clap::Args, Debug, Clone)]
pub struct AssembleArgs {
    /// Template package path
    #[arg(short, long)]
    pub template: PathBuf,

    /// XML data source path
    #[arg(short, long)]
    pub data: PathBuf,

    /// Output package path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Exit non-zero if any error marker was produced
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub strict: Option<bool>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Merge a data source into a template package
    Assemble {
        #[command(flatten)]
        assemble_args: AssembleArgs,
    },

    /// List a template's content parts and directive counts
    Inspect {
        /// Template package path
        template: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_args_parse() {
        let cli = Cli::parse_from([
            "weave", "assemble", "-t", "t.zip", "-d", "d.xml", "-o", "out.zip", "--strict",
        ]);
        let Commands::Assemble { assemble_args } = cli.command else {
            panic!("expected assemble");
        };
        assert_eq!(assemble_args.template, PathBuf::from("t.zip"));
        assert_eq!(assemble_args.strict, Some(true));
    }

    #[test]
    fn inspect_takes_a_positional_template() {
        let cli = Cli::parse_from(["weave", "inspect", "t.zip"]);
        assert!(matches!(cli.command, Commands::Inspect { .. }));
    }
}
