//! # Case Law Pipeline Main Driver
//!
//! ## Purpose
//! Entry point for the case law search pipeline. One binary drives every
//! stage: crawling the judicial website, taxonomy maintenance, ingestion
//! into the hosted store, and the search API server.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, command line arguments, environment variables
//! - **Output**: Depends on the subcommand - crawled corpus, merged taxonomy,
//!   populated store, or a running web server
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and the log stream feed
//! 3. Dispatch to the requested pipeline stage
//! 4. For `serve`, run the API until a shutdown signal arrives

use clap::{Arg, Command};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use lawai_case_search::{
    api,
    config::Config,
    crawler::{Crawler, JudicialSource},
    embedding::EmbeddingClient,
    errors::Result,
    ingest::{self, IngestPipeline},
    logging::{self, LogFeed},
    normalize::CaseRecordNormalizer,
    search::SearchService,
    store::StoreClient,
    taxonomy,
    utils::RetryPolicy,
    AppState,
};

fn cli() -> Command {
    Command::new("lawai-search-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Taiwanese case law pipeline: crawl, ingest, and search")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("serve").about("Run the search API server").arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Override the configured server port")
                    .value_parser(clap::value_parser!(u16)),
            ),
        )
        .subcommand(
            Command::new("crawl")
                .about("Crawl the judicial website into the local corpus")
                .arg(
                    Arg::new("start-url")
                        .long("start-url")
                        .value_name("URL")
                        .help("Listing page to start from")
                        .required(true),
                )
                .arg(
                    Arg::new("max-pages")
                        .long("max-pages")
                        .value_name("N")
                        .help("Stop after this many listing pages")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("merge-taxonomy")
                .about("Merge a taxonomy delta into the base taxonomy")
                .arg(
                    Arg::new("source")
                        .long("source")
                        .value_name("FILE")
                        .help("Taxonomy delta to merge in")
                        .required(true),
                )
                .arg(
                    Arg::new("base")
                        .long("base")
                        .value_name("FILE")
                        .help("Base taxonomy receiving the delta")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Where to write the merged taxonomy")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("extract-categories")
                .about("Extract the category skeleton without case references")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .value_name("FILE")
                        .help("Full taxonomy file")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Where to write the skeleton")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("split-cases")
                .about("Split the case corpus into numbered chunk files")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .value_name("FILE")
                        .help("Corpus file to split")
                        .required(true),
                )
                .arg(
                    Arg::new("out-dir")
                        .long("out-dir")
                        .value_name("DIR")
                        .help("Directory receiving the chunk files")
                        .required(true),
                )
                .arg(
                    Arg::new("chunk-size")
                        .long("chunk-size")
                        .value_name("N")
                        .help("Records per chunk file")
                        .default_value("100")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("ingest")
                .about("Normalize, embed, and upsert the corpus into the store"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let mut config = Config::from_file(config_path)?;

    if let Some(("serve", serve)) = matches.subcommand() {
        if let Some(port) = serve.get_one::<u16>("port") {
            config.server.port = *port;
        }
    }

    let log_feed = logging::init(&config.logging)?;
    info!("Configuration loaded from: {}", config_path);

    let config = Arc::new(config);
    match matches.subcommand() {
        Some(("serve", _)) => serve(config, log_feed).await,
        Some(("crawl", args)) => {
            let start_url = args.get_one::<String>("start-url").unwrap();
            let max_pages = args.get_one::<usize>("max-pages").copied();
            crawl(&config, start_url, max_pages).await
        }
        Some(("merge-taxonomy", args)) => merge_taxonomy(
            args.get_one::<String>("source").unwrap(),
            args.get_one::<String>("base").unwrap(),
            args.get_one::<String>("output").unwrap(),
        ),
        Some(("extract-categories", args)) => extract_categories(
            args.get_one::<String>("input").unwrap(),
            args.get_one::<String>("output").unwrap(),
        ),
        Some(("split-cases", args)) => {
            let written = ingest::split_case_file(
                args.get_one::<String>("input").unwrap(),
                args.get_one::<String>("out-dir").unwrap(),
                *args.get_one::<usize>("chunk-size").unwrap(),
            )?;
            info!("Wrote {} chunk file(s)", written.len());
            Ok(())
        }
        Some(("ingest", _)) => run_ingest(&config).await,
        _ => unreachable!("subcommand is required"),
    }
}

fn build_state(config: Arc<Config>, log_feed: LogFeed) -> Result<AppState> {
    let store = Arc::new(StoreClient::new(config.store.clone())?);
    let embedding = Arc::new(EmbeddingClient::new(config.embedding.clone())?);
    let search_service = Arc::new(SearchService::new(
        config.search.clone(),
        store,
        embedding,
    ));

    Ok(AppState {
        config,
        search_service,
        log_feed,
    })
}

async fn serve(config: Arc<Config>, log_feed: LogFeed) -> Result<()> {
    let state = build_state(config.clone(), log_feed)?;

    info!(
        "Case law search API starting on {}:{}",
        config.server.host, config.server.port
    );

    tokio::select! {
        result = api::run(state) => match result {
            Ok(()) => info!("Server stopped"),
            Err(e) => error!("Server error: {}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn crawl(config: &Config, start_url: &str, max_pages: Option<usize>) -> Result<()> {
    let source = JudicialSource::new(&config.crawler)?;
    let crawler = Crawler::new(source, config.crawler.clone());
    let stats = crawler.run(start_url, max_pages).await?;
    info!(
        "Crawl complete: {} new case(s) in {}",
        stats.cases_saved,
        config.crawler.output_path.display()
    );
    Ok(())
}

fn merge_taxonomy(source: &str, base: &str, output: &str) -> Result<()> {
    let source = taxonomy::load_taxonomy(source)?;
    let base = taxonomy::load_taxonomy(base)?;
    let merged = taxonomy::merge(&source, &base);
    taxonomy::save_taxonomy(output, &merged)?;
    info!("Merged taxonomy written with {} categories", merged.len());
    Ok(())
}

fn extract_categories(input: &str, output: &str) -> Result<()> {
    let full = taxonomy::load_taxonomy(input)?;
    let skeleton = taxonomy::extract_skeleton(&full);
    taxonomy::save_taxonomy(output, &skeleton)?;
    info!("Category skeleton written with {} categories", skeleton.len());
    Ok(())
}

async fn run_ingest(config: &Config) -> Result<()> {
    let store = Arc::new(StoreClient::new(config.store.clone())?);
    let embedding = Arc::new(EmbeddingClient::new(config.embedding.clone())?);
    let normalizer = Arc::new(CaseRecordNormalizer::new(
        embedding,
        RetryPolicy::from(&config.embedding.retry),
    ));

    let pipeline = IngestPipeline::new(
        config.ingestion.clone(),
        store,
        normalizer,
        RetryPolicy::from(&config.store.retry),
    );
    let stats = pipeline.run().await?;
    info!(
        "Ingestion complete: {}/{} stored, {} skipped, {} failed",
        stats.stored, stats.processed, stats.skipped, stats.upsert_failures
    );
    Ok(())
}
