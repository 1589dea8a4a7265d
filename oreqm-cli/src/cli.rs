use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use oreqm_core::SearchMode;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Inspect, diff and render oreqm requirement traces")]
pub struct Cli {
    /// Settings file (defaults to OREQM_SETTINGS_PATH or the user config dir)
    #[clap(long, global = true)]
    pub settings: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

/// How the search pattern is read
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    /// Regex over identifiers
    Id,
    /// Regex over the full record text
    Text,
    /// VQL expression
    Vql,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Id => SearchMode::IdOnly,
            ModeArg::Text => SearchMode::Text,
            ModeArg::Vql => SearchMode::Vql,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a selection of records as a Graphviz dot graph
    Render {
        /// The .oreqm file to render
        main: Option<PathBuf>,

        /// Reference .oreqm file to diff against
        #[clap(long, short = 'r')]
        reference: Option<PathBuf>,

        /// Search pattern selecting the records to show
        #[clap(long, short = 's')]
        search: Option<String>,

        /// How the search pattern is interpreted
        #[clap(long, value_enum, default_value = "text")]
        mode: ModeArg,

        /// Doctypes to leave out (comma separated)
        #[clap(long, value_delimiter = ',')]
        exclude_doctypes: Vec<String>,

        /// Record ids to leave out (comma separated)
        #[clap(long, value_delimiter = ',')]
        exclude_ids: Vec<String>,

        /// Only show direct neighbours of search hits
        #[clap(long)]
        limit_depth: bool,

        /// Write the graph here instead of stdout
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,

        /// Restore files, search and exclusions from a saved context
        #[clap(long)]
        context: Option<PathBuf>,

        /// Save the resulting context to this file
        #[clap(long)]
        save_context: Option<PathBuf>,
    },

    /// Render the doctype relationship graph
    Doctypes {
        /// The .oreqm file to analyse
        main: PathBuf,

        /// Split every doctype by safety class
        #[clap(long)]
        safety: bool,

        /// Write the graph here instead of stdout
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print the ids of the records matching a pattern
    Search {
        /// The .oreqm file to search
        main: PathBuf,

        /// How the pattern is interpreted
        #[clap(long, value_enum, default_value = "vql")]
        mode: ModeArg,

        /// The search pattern
        pattern: String,
    },

    /// Compare two snapshots
    Diff {
        /// The current .oreqm file
        main: PathBuf,

        /// The older .oreqm file
        reference: PathBuf,
    },

    /// Print the problems found while loading a file
    Problems {
        /// The .oreqm file to check
        main: PathBuf,
    },

    /// Check the safety rules in a settings file
    ValidateRules {
        /// Settings YAML file holding a safety_rules list
        file: PathBuf,
    },
}
