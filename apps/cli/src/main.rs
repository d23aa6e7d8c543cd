//! fhirkit - convert and check FHIR resources
//!
//! ```text
//! fhirkit convert patient.json -o patient.xml --pretty
//! fhirkit check observation.xml
//! fhirkit types --kind resource
//! ```

mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fhirkit_format::Format;
use fhirkit_models::TypeKind;

use crate::commands::ConvertArgs;
use crate::config::Config;

#[derive(Parser)]
#[command(name = "fhirkit")]
#[command(about = "Convert and check FHIR resources")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./fhirkit.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// StructureDefinition bundle to load instead of the embedded R4 schema (repeatable)
    #[arg(long = "definitions", global = true, value_name = "FILE")]
    definitions: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a resource between JSON and XML
    Convert {
        /// Input file, or - for stdin
        input: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Input format (inferred from the extension or content when omitted)
        #[arg(long, value_parser = parse_format)]
        from: Option<Format>,
        /// Output format (defaults to the other format)
        #[arg(long, value_parser = parse_format)]
        to: Option<Format>,
        /// Indent the output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Decode a resource and report its type
    Check {
        /// Input file, or - for stdin
        input: PathBuf,
        #[arg(long, value_parser = parse_format)]
        from: Option<Format>,
        /// Decode as this resource type instead of reading the discriminator
        #[arg(long = "as", value_name = "TYPE")]
        resource_type: Option<String>,
    },
    /// List the types known to the registry
    Types {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Primitive,
    Element,
    Resource,
}

impl From<KindArg> for TypeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Primitive => TypeKind::Primitive,
            KindArg::Element => TypeKind::Element,
            KindArg::Resource => TypeKind::Resource,
        }
    }
}

fn parse_format(s: &str) -> Result<Format, String> {
    Format::parse(s).ok_or_else(|| format!("unknown format '{s}' (expected json or xml)"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    let definitions = if cli.definitions.is_empty() {
        config.codec.definitions.clone()
    } else {
        cli.definitions.clone()
    };
    let registry = commands::load_registry(&definitions)?;

    tracing::debug!(
        release = %registry.release(),
        types = registry.len(),
        "Type registry ready"
    );

    match cli.command {
        Command::Convert {
            input,
            output,
            from,
            to,
            pretty,
        } => commands::convert(
            &registry,
            ConvertArgs {
                input: &input,
                output: output.as_deref(),
                from,
                to,
                pretty: pretty || config.codec.pretty,
            },
        ),
        Command::Check {
            input,
            from,
            resource_type,
        } => {
            let summary = commands::check(&registry, &input, from, resource_type.as_deref())?;
            println!("{summary}");
            Ok(())
        }
        Command::Types { kind } => {
            for line in commands::list_types(&registry, kind.map(TypeKind::from)) {
                println!("{line}");
            }
            Ok(())
        }
    }
}
