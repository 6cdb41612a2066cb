use lookbook::catalog::Catalog;
use lookbook::cli::{Cli, Commands, ConfigAction};
use lookbook::config::{Config, ConfigValidator};
use lookbook::error::{LookbookError, Result};
use lookbook::ingest::{load_jsonl, IngestMode, IngestPipeline};
use lookbook::retrieval::{FusedMatch, FusionQuery};
use lookbook::storage::StorageStats;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let Cli {
        config,
        profile,
        verbose,
        command,
    } = Cli::parse_args();

    // Initialize logging
    init_logging(verbose);

    // Handle commands
    match command {
        Commands::Ingest {
            file,
            replace,
            concurrency,
        } => {
            let config = load_config(config, profile)?;
            cmd_ingest(&config, &file, replace, concurrency).await?;
        }
        Commands::Search {
            query_file,
            top_k,
            category,
            text,
            json,
        } => {
            let config = load_config(config, profile)?;
            cmd_search(&config, &query_file, top_k, category, text, json).await?;
        }
        Commands::Delete { id } => {
            let config = load_config(config, profile)?;
            cmd_delete(&config, &id)?;
        }
        Commands::Exists { id } => {
            let config = load_config(config, profile)?;
            cmd_exists(&config, &id)?;
        }
        Commands::Stats => {
            let config = load_config(config, profile)?;
            cmd_stats(&config)?;
        }
        Commands::Drop { yes } => {
            let config = load_config(config, profile)?;
            cmd_drop(&config, yes)?;
        }
        Commands::Config { action } => {
            cmd_config(config, profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "lookbook=debug" } else { "lookbook=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_ingest(
    config: &Config,
    file: &Path,
    replace: bool,
    concurrency: Option<usize>,
) -> Result<()> {
    let records = load_jsonl(file)?;
    tracing::info!("Loaded {} records from {}", records.len(), file.display());

    let mode = if replace || !config.ingest.skip_existing {
        IngestMode::Replace
    } else {
        IngestMode::SkipExisting
    };

    let catalog = Catalog::open(config)?;
    let pipeline = IngestPipeline::new(
        catalog.store().clone(),
        mode,
        concurrency.unwrap_or(config.ingest.max_concurrent),
    );
    let stats = pipeline.run(records).await?;

    println!("✓ Ingested {} of {} records", stats.inserted, stats.total());
    println!("  Skipped: {}", stats.skipped);
    println!("  Failed:  {}", stats.failed);
    if !stats.partial.is_empty() {
        println!("  Partial writes (retry these with --replace):");
        for partial in &stats.partial {
            println!("    {} ({} side missing)", partial.product_id, partial.failed);
        }
    }
    println!("  Took {}ms", stats.duration_ms);

    catalog.close()
}

async fn cmd_search(
    config: &Config,
    query_file: &Path,
    top_k: Option<usize>,
    category: Option<String>,
    text: Option<String>,
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(query_file).map_err(|e| LookbookError::Io {
        source: e,
        context: format!("Failed to read query file: {}", query_file.display()),
    })?;
    let mut query: FusionQuery =
        serde_json::from_str(&content).map_err(|e| LookbookError::Json {
            source: e,
            context: format!("Invalid query file: {}", query_file.display()),
        })?;

    if let Some(top_k) = top_k {
        query.top_k = top_k;
    }
    if category.is_some() {
        query.category = category;
    }
    if text.is_some() {
        query.query_text = text;
    }

    let catalog = Catalog::open(config)?;
    let results = catalog.search(&query).await?;

    if json {
        let output = serde_json::to_string_pretty(&results).map_err(|e| LookbookError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", output);
    } else {
        print_results(&results);
    }

    catalog.close()
}

fn print_results(results: &[FusedMatch]) {
    if results.is_empty() {
        println!("No matches");
        return;
    }

    println!(
        "{:>3}  {:<24} {:<12} {:>8} {:>8} {:>8}",
        "#", "PRODUCT", "CATEGORY", "SCORE", "TEXT", "IMAGE"
    );
    for (rank, result) in results.iter().enumerate() {
        let image = if result.is_text_only() {
            "-".to_string()
        } else {
            format!("{:.4}", result.image_score)
        };
        println!(
            "{:>3}  {:<24} {:<12} {:>8.4} {:>8.4} {:>8}",
            rank + 1,
            result.product_id,
            result.category,
            result.combined_score,
            result.text_score,
            image
        );
    }
}

fn cmd_delete(config: &Config, id: &str) -> Result<()> {
    let catalog = Catalog::open(config)?;
    let report = catalog.store().delete(id)?;

    if report.total() == 0 {
        println!("No rows found for {}", id);
    } else {
        println!(
            "✓ Deleted {} ({} text rows, {} image rows)",
            id, report.text_deleted, report.image_deleted
        );
    }

    catalog.close()
}

fn cmd_exists(config: &Config, id: &str) -> Result<()> {
    let catalog = Catalog::open(config)?;
    let exists = catalog.store().exists(id)?;
    println!("{}", if exists { "yes" } else { "no" });
    catalog.close()
}

fn cmd_stats(config: &Config) -> Result<()> {
    let catalog = Catalog::open(config)?;
    let stats = catalog.stats()?;

    println!("Lookbook Catalog");
    println!("  Backend:     {}", stats.backend);
    println!("  Text rows:   {}", stats.text_rows);
    println!("  Image rows:  {}", stats.image_rows);

    match &stats.storage {
        Some(storage) => {
            println!("  Store size:  {}", StorageStats::format_size(storage.store_size));
            for collection in &storage.db.collections {
                println!(
                    "  {} (dim {}): {} rows, {} products",
                    collection.name,
                    collection.dimension,
                    collection.row_count,
                    collection.product_count
                );
            }
        }
        None => println!("  Storage:     in-memory"),
    }

    catalog.close()
}

fn cmd_drop(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        println!("This removes every product from both collections.");
        println!("Re-run with --yes to confirm");
        return Ok(());
    }

    let catalog = Catalog::open(config)?;
    catalog.store().clear()?;
    println!("✓ Catalog dropped");
    catalog.close()
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Backend: {}", config.index.backend);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LookbookError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lookbook config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
