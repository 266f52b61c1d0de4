use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use tool_resolver::{
    DatabaseConfig, Outcome, Ranker, ResolutionCache, ResolverConfig, builtin_registry,
    create_connection, create_resolver, ensure_schema,
};

#[derive(Parser)]
#[command(name = "tool-resolver")]
#[command(about = "Adaptive tool-resolution loop with a persistent cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a query against the built-in handlers
    Solve {
        query: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
        /// Maximum number of batches to evaluate
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Handlers exposed per batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Show the ranked handler order for a query, without running anything
    Rank { query: String },
    /// Look up the cached handler for a query
    CacheLookup {
        query: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Initialize the database
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("tool_resolver=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            query,
            db_url,
            max_attempts,
            batch_size,
        } => {
            let mut config = ResolverConfig::from_env();
            if let Some(attempts) = max_attempts {
                config.max_attempts = attempts;
            }
            if let Some(size) = batch_size {
                config.batch_size = size;
            }

            info!("Using database url for solve: {}", db_url);
            let resolver =
                create_resolver(DatabaseConfig::with_url(db_url), config, builtin_registry())
                    .await?;

            let result = resolver.resolve(&query).await?;

            println!("Query: {}", query);
            println!("Outcome: {:?}", result.outcome);
            if result.outcome == Outcome::Solved {
                if let Some(handler) = &result.handler {
                    println!("Handler: {}", handler);
                }
                println!("Answer: {}", result.answer);
            } else {
                println!("Report: {}", result.answer);
            }
            println!("Attempts: {}", result.attempts);
            if !result.log.is_empty() {
                println!("Invocation log:");
                for record in &result.log {
                    println!("  {}", record.summary());
                }
            }
        }
        Commands::Rank { query } => {
            let registry = Arc::new(builtin_registry());
            let ranker = Ranker::new(registry.clone());
            let ranked = ranker.rank(&query, &HashSet::new());

            println!("Query: {}", query);
            println!("Ranked {} handler(s):", ranked.len());
            for (index, name) in ranked.iter().enumerate() {
                match registry.get(name) {
                    Some(handler) => {
                        println!("  {}. {} - {}", index + 1, name, handler.description())
                    }
                    None => println!("  {}. {}", index + 1, name),
                }
            }
        }
        Commands::CacheLookup { query, db_url } => {
            let db = create_connection(DatabaseConfig::with_url(db_url)).await?;
            ensure_schema(&db).await?;
            let cache = ResolutionCache::new(db);

            match cache.get(&query).await {
                Some(handler) => println!("Cached handler: {}", handler),
                None => println!("No cached handler for this query"),
            }
        }
        Commands::Init { db_url } => {
            info!("Initializing database at {}", db_url);
            let db = create_connection(DatabaseConfig::with_url(db_url)).await?;
            ensure_schema(&db).await?;
            println!("Database initialized successfully");
        }
    }

    Ok(())
}
