//! cadtree CLI - export CAD assembly attributes into a container file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueHint};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use cadtree::config::ExportConfig;
use cadtree::container::{ChildRef, Container, GroupId, OpenMode};
use cadtree::export::{export_flat, export_tree, ExportReport};
use cadtree::extract::AttributeExtractor;
use cadtree::kernel::MeshKernel;
use cadtree::model::{self, Document};
use cadtree::Result;

/// Export CAD assembly trees (names, colors, mass properties) into a typed container
#[derive(Parser, Debug)]
#[command(name = "cadtree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the attribute tree of a document
    Tree {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
    },

    /// Hierarchical export: one group per node
    Export {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        output: PathBuf,
        #[command(flatten)]
        target: Target,
        /// JSON export settings
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
    },

    /// Flat export: Meta, Products, Properties and Colors tables
    Flat {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        output: PathBuf,
        #[command(flatten)]
        target: Target,
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
    },

    /// Print groups, attributes and arrays of a container
    Dump {
        #[arg(value_hint = ValueHint::FilePath)]
        container: PathBuf,
    },
}

/// What to do when the output file exists.
#[derive(clap::Args, Debug)]
#[group(multiple = false)]
struct Target {
    /// Replace an existing output file
    #[arg(short, long)]
    force: bool,
    /// Export into an existing output file
    #[arg(short, long)]
    update: bool,
}

impl Target {
    fn open(&self, path: &Path) -> Result<Container> {
        if self.update && path.exists() {
            Container::open(path, OpenMode::ReadWrite)
        } else {
            Container::create(path, self.force)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(&cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

fn load_config(path: Option<&Path>) -> Result<ExportConfig> {
    path.map_or_else(|| Ok(ExportConfig::default()), ExportConfig::load)
}

fn run(command: &Commands) -> Result<()> {
    match command {
        Commands::Tree { input } => cmd_tree(input),
        Commands::Export { input, output, target, config } => {
            let config = load_config(config.as_deref())?;
            let doc = model::parse(input)?;
            let mut container = target.open(output)?;
            let report = export_tree(&doc, &AttributeExtractor::new(MeshKernel), &mut container, &config.tree_options())?;
            container.close()?;
            print_report(output, &report);
            Ok(())
        }
        Commands::Flat { input, output, target, config } => {
            let config = load_config(config.as_deref())?;
            let mut options = config.flat_options();
            if options.meta.origin.is_empty() {
                options.meta.origin = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            let doc = model::parse(input)?;
            let mut container = target.open(output)?;
            let report = export_flat(&doc, &AttributeExtractor::new(MeshKernel), &mut container, &options)?;
            container.close()?;
            print_report(output, &report);
            Ok(())
        }
        Commands::Dump { container } => cmd_dump(container),
    }
}

fn print_report(output: &Path, report: &ExportReport) {
    println!("Exported to {}", output.display());
    println!("{report}");
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
}

fn cmd_tree(input: &Path) -> Result<()> {
    let doc = model::parse(input)?;
    let extractor = AttributeExtractor::new(MeshKernel);
    let (records, warnings) = extractor.extract_all(&doc, doc.root())?;
    for record in &records {
        println!("{record}");
    }
    println!();
    println!("{} nodes, {warnings} warnings", records.len());
    Ok(())
}

fn cmd_dump(path: &Path) -> Result<()> {
    let container = Container::open(path, OpenMode::ReadOnly)?;
    println!("{}", path.display());
    dump_group(&container, container.root(), 1)
}

fn dump_group(container: &Container, group: GroupId, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    for (name, value) in container.attributes(group)? {
        println!("{indent}@{name} = {value}");
    }
    for (name, child) in container.children(group)? {
        match child {
            ChildRef::Group(g) => {
                println!("{indent}{name}/");
                dump_group(container, g, depth + 1)?;
            }
            ChildRef::Array(a) => {
                let info = container.array_info(a)?;
                println!("{indent}{name}: {} {} (max {})", info.element, info.shape, info.max_shape);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["cadtree", "-vv", "export", "a.json", "b.ctree", "--force"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Export { target, config, .. } => {
                assert!(target.force && !target.update);
                assert!(config.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["cadtree", "flat", "a", "b", "--force", "--update"]).is_err());
    }
}
