//! Command-line arguments and the configuration derived from them.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use schemagraph_core::config::DEFAULT_INDENT;
use schemagraph_core::{LoadConfig, SaveConfig};

use crate::formatter::OutputFormat;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "schemagraph")]
#[command(version, about = "Inspect and normalize schema design project documents", long_about = None)]
pub struct Args {
    /// Fail on every unresolved reference, including lineage references.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Additional reference attributes whose misses are tolerated.
    #[arg(long = "optional-ref", value_name = "ATTRIBUTE", global = true)]
    pub optional_refs: Vec<String>,

    /// Indentation width of written documents.
    #[arg(long, default_value_t = DEFAULT_INDENT, global = true)]
    pub indent: usize,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Summarize the databases of a project.
    Inspect {
        /// Project document to read.
        file: PathBuf,

        /// Output format.
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,

        /// Print the whole node tree instead of per-database totals.
        #[arg(long)]
        tree: bool,
    },

    /// Load a project and write it back in canonical form.
    Resave {
        /// Project document to read.
        file: PathBuf,

        /// Output path. Defaults to overwriting the input.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Refuse to save while any subtree is still unpopulated.
        #[arg(long)]
        entire_source: bool,
    },

    /// Verify that a project survives load and save unchanged.
    Check {
        /// Project document to read.
        file: PathBuf,
    },
}

/// Configuration shared by the commands.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Options for reading documents.
    pub load: LoadConfig,
    /// Options for writing documents.
    pub save: SaveConfig,
}

impl Args {
    /// Convert command-line arguments to reader and writer configuration,
    /// handing back the command to run.
    pub fn into_config(self) -> (CliConfig, Command) {
        let mut load = if self.strict {
            LoadConfig::new().strict()
        } else {
            LoadConfig::new()
        };
        for attribute in self.optional_refs {
            load = load.with_optional_reference(attribute);
        }

        let entire_source = matches!(
            self.command,
            Command::Resave {
                entire_source: true,
                ..
            }
        );
        let save = SaveConfig::new()
            .with_indent(self.indent)
            .with_entire_source(entire_source);

        (CliConfig { load, save }, self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemagraph_core::config::DEFAULT_OPTIONAL_REFERENCE;

    #[test]
    fn test_default_config() {
        let args = Args::parse_from(["schemagraph", "check", "shop.architect"]);
        let (config, command) = args.into_config();

        assert!(config.load.is_optional(DEFAULT_OPTIONAL_REFERENCE));
        assert_eq!(config.save.indent, DEFAULT_INDENT);
        assert!(!config.save.save_entire_source);
        assert_eq!(
            command,
            Command::Check {
                file: PathBuf::from("shop.architect")
            }
        );
    }

    #[test]
    fn test_strict_with_extra_optional_reference() {
        let args = Args::parse_from([
            "schemagraph",
            "inspect",
            "shop.architect",
            "--strict",
            "--optional-ref",
            "table-ref",
        ]);
        let (config, _) = args.into_config();

        assert!(!config.load.is_optional(DEFAULT_OPTIONAL_REFERENCE));
        assert!(config.load.is_optional("table-ref"));
    }

    #[test]
    fn test_resave_entire_source() {
        let args = Args::parse_from([
            "schemagraph",
            "resave",
            "in.architect",
            "-o",
            "out.architect",
            "--entire-source",
            "--indent",
            "2",
        ]);
        let (config, command) = args.into_config();

        assert!(config.save.save_entire_source);
        assert!(matches!(command, Command::Resave { output: Some(_), .. }));
        assert_eq!(config.save.indent, 2);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = Args::try_parse_from(["schemagraph", "inspect", "x", "--format", "yaml"]);
        assert!(result.is_err());
    }
}
