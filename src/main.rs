//! Weave - merges XML data into marked-up document templates.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::Path;
use weave::cli::{AssembleArgs, Cli, Commands};
use weave::config::WeaveConfig;
use weave::package::Package;
use weave::transform::directive_count;
use weave::{XmlDocument, assemble_with_style, log};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Assemble { assemble_args } => run_assemble(assemble_args, &config),
        Commands::Inspect { template } => run_inspect(template),
    }
}

/// Load and validate configuration; a missing file means defaults.
fn load_config(cli: &Cli) -> Result<WeaveConfig> {
    let mut config = if cli.config.exists() {
        WeaveConfig::from_path(&cli.config)?
    } else {
        WeaveConfig::default()
    };
    config.update_with_cli(cli);
    Ok(config)
}

fn run_assemble(args: &AssembleArgs, config: &WeaveConfig) -> Result<()> {
    let template = fs::read(&args.template)
        .with_context(|| format!("failed to read template `{}`", args.template.display()))?;
    let data_bytes = fs::read(&args.data)
        .with_context(|| format!("failed to read data source `{}`", args.data.display()))?;
    let data = XmlDocument::parse(&data_bytes)
        .with_context(|| format!("data source `{}` is not well-formed", args.data.display()))?;

    let output = assemble_with_style(&template, &data, config.marker_style())?;
    fs::write(&args.output, &output.bytes)
        .with_context(|| format!("failed to write `{}`", args.output.display()))?;
    log!("assemble"; "wrote {}", args.output.display());

    if output.had_errors {
        log!("error"; "document contains error markers; search for `{}`",
            config.assembly.marker_prefix.trim_end());
        if config.assembly.strict {
            bail!("assembly finished with errors (strict mode)");
        }
    }
    Ok(())
}

fn run_inspect(template: &Path) -> Result<()> {
    let bytes = fs::read(template)
        .with_context(|| format!("failed to read template `{}`", template.display()))?;
    let package = Package::open(&bytes)?;

    for (index, part) in package.parts().iter().enumerate() {
        let directives = directive_count(package.read_tree(index));
        log!("inspect"; "{} ({}): {} directive(s)", part.name, part.kind, directives);
    }
    if package.has_tracked_revisions() {
        log!("error"; "template contains tracked revisions and cannot be assembled");
    }
    Ok(())
}
