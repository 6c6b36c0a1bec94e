//! PantryDB command line interface.
//!
//! Wires configuration, the database pool, the source fetchers, and the
//! embedding matcher into operator commands. Handlers live in the `ingest`
//! and `query` modules; `main` only parses arguments and dispatches.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod ingest;
mod query;

#[derive(Debug, Parser)]
#[command(name = "pantrydb-cli")]
#[command(about = "PantryDB grocery price catalog command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Fetch listings from a retail source and upsert them into the catalog
    Ingest {
        /// Source to ingest from: cargills, keells, or spar
        #[arg(long)]
        source: String,

        /// Search term forwarded to the source
        #[arg(long, conflicts_with = "all")]
        term: Option<String>,

        /// Sweep the source letter by letter (a-z) instead of one term
        #[arg(long)]
        all: bool,

        /// Page size override for paginated sources
        #[arg(long)]
        page_size: Option<u32>,

        /// Upper bound on pages fetched in one pass
        #[arg(long)]
        page_budget: Option<u32>,
    },
    /// Rebuild the ingredient embedding index in the vector store
    Index,
    /// Match a free-text query to the single best ingredient
    Match {
        query: String,

        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        cuisine: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        flavor: Option<String>,

        /// Persist the match as a mapping for this product id
        #[arg(long)]
        map_product: Option<i64>,
    },
    /// Paginated ingredient search with product listings attached
    Search {
        query: String,

        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        cuisine: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        flavor: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = pantrydb_core::load_app_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let pool = pantrydb_db::connect_pool(
        &config.database_url,
        pantrydb_db::PoolConfig {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        },
    )
    .await?;

    match cli.command {
        Commands::Migrate => {
            let applied = pantrydb_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
        }
        Commands::Ingest {
            source,
            term,
            all,
            page_size,
            page_budget,
        } => {
            ingest::run_ingest(
                &pool,
                &config,
                &source,
                term.as_deref(),
                all,
                page_size,
                page_budget,
            )
            .await?;
        }
        Commands::Index => {
            let indexed = pantrydb_matcher::build_ingredient_index(
                &pool,
                &config.embedder_url,
                &config.qdrant_url,
                &config.qdrant_collection,
            )
            .await?;
            println!("indexed {indexed} ingredients");
        }
        Commands::Match {
            query,
            country,
            cuisine,
            region,
            flavor,
            map_product,
        } => {
            let filters = pantrydb_matcher::MatchFilters {
                country,
                cuisine,
                region,
                flavor,
            };
            query::run_match(&pool, &config, &query, &filters, map_product).await?;
        }
        Commands::Search {
            query,
            country,
            cuisine,
            region,
            flavor,
            page,
            limit,
        } => {
            let filters = pantrydb_matcher::MatchFilters {
                country,
                cuisine,
                region,
                flavor,
            };
            query::run_search(&pool, &config, &query, &filters, page, limit).await?;
        }
    }

    Ok(())
}
