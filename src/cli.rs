use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bulk export and archive tool for HubSpot CRM", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ./hubtools.toml, then the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Set log level [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set log format, text or json [default: text]
    #[arg(long)]
    pub log_format: Option<String>,

    /// Increase verbosity
    #[arg(short, long)]
    pub verbose: bool,

    /// Private app access token (overrides config and environment)
    #[arg(long)]
    pub token: Option<String>,

    /// API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration file
    Init {
        /// Path to create the config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Don't prompt for input, use defaults
        #[arg(long)]
        no_prompt: bool,

        /// Force overwrite if config file exists
        #[arg(long)]
        force: bool,
    },

    /// Interactive menu (the default)
    Menu,

    /// List every object type in the portal
    Objects,

    /// Export property definitions to fields_<object>.csv
    Fields {
        /// Object type, e.g. contacts
        #[arg(required_unless_present = "all")]
        object: Option<String>,

        /// Export every object type
        #[arg(long, conflicts_with = "object")]
        all: bool,
    },

    /// Export a data sample to sample_<object>.csv
    Sample {
        /// Object type, e.g. companies
        #[arg(required_unless_present = "all")]
        object: Option<String>,

        /// Sample every object type
        #[arg(long, conflicts_with = "object")]
        all: bool,

        /// Records per sample
        #[arg(long)]
        size: Option<usize>,
    },

    /// Extract records without a parent association into chunked files
    Orphans {
        /// Object type, e.g. contacts
        object: String,

        /// Parent property that must be empty (default depends on the object)
        #[arg(long)]
        missing: Option<String>,

        /// Comma-separated properties to fetch (default: all)
        #[arg(long, value_delimiter = ',')]
        properties: Vec<String>,

        /// Resume from a cursor reported by an interrupted run
        #[arg(long)]
        after: Option<String>,

        /// Records per output file
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Archive the records listed in <object>.csv input files
    Delete {
        /// One input file; every CSV in the input folder when omitted
        file: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,

        /// Identifiers per archive call
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

impl Cli {
    /// Settings given on the command line, to merge over the loaded config
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else {
            self.log_level.clone()
        };
        let mut overrides = ConfigOverrides {
            token: self.token.clone(),
            base_url: self.base_url.clone(),
            log_level,
            log_format: self.log_format.clone(),
            ..ConfigOverrides::default()
        };

        match &self.command {
            Some(Commands::Sample { size, .. }) => overrides.sample_size = *size,
            Some(Commands::Orphans { chunk_size, .. }) => overrides.chunk_size = *chunk_size,
            Some(Commands::Delete { batch_size, .. }) => overrides.batch_size = *batch_size,
            _ => {}
        }
        overrides
    }
}
