//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lookbook",
    version,
    about = "Dual-modality clothing catalog with fused text and image search",
    long_about = "Lookbook keeps a text index and an image index of a clothing catalog consistent \
                  by product id, and answers queries by fusing similarity from both embedding \
                  spaces with an optional lexical rerank."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lookbook/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "visual", "strict")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest pre-embedded products from a JSON Lines file
    Ingest {
        /// Records file, one product per line
        file: PathBuf,

        /// Replace existing products instead of skipping them
        #[arg(long)]
        replace: bool,

        /// Maximum concurrent writes (defaults to ingest.max_concurrent)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Run a fusion search from a JSON query file
    Search {
        /// Query file holding text_embedding and image_embedding
        query_file: PathBuf,

        /// Number of results (raised to the configured floor)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Restrict results to one category
        #[arg(long)]
        category: Option<String>,

        /// Free text for the lexical rerank stage
        #[arg(short, long)]
        text: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete a product from both indexes
    Delete {
        /// Product id
        id: String,
    },

    /// Check whether a product is in the catalog
    Exists {
        /// Product id
        id: String,
    },

    /// Show catalog statistics
    Stats,

    /// Remove every product from both collections
    Drop {
        /// Confirm the drop
        #[arg(long)]
        yes: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "lookbook", "search", "q.json", "-k", "3", "--category", "dress", "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                top_k,
                category,
                json,
                text,
                ..
            } => {
                assert_eq!(top_k, Some(3));
                assert_eq!(category.as_deref(), Some("dress"));
                assert!(json);
                assert!(text.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_profile_after_subcommand() {
        let cli = Cli::try_parse_from(["lookbook", "stats", "--profile", "visual"]).unwrap();
        assert_eq!(cli.profile.as_deref(), Some("visual"));
    }
}
