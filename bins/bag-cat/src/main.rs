use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use bag_api::format::ConverterOptions;
use bag_api::storage::StorageFilter;
use bag_reader::config::ReaderConfig;
use bag_reader::storage::StorageRegistry;
use bag_reader::{ConverterFactory, ReaderError, SimpleReader};

#[derive(Parser)]
#[command(name = "bag-cat", about = "Inspect and print recorded bags")]
struct Cli {
    /// Path to TOML reader configuration.
    #[arg(long, global = true, env = "BAG_CAT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show topics, types and record counts.
    Info {
        /// Bag location.
        bag: String,
    },
    /// Print records as JSON lines: {topic, time_stamp, type, data}.
    Cat {
        /// Bag location.
        bag: String,
        /// Only print these topics (repeatable).
        #[arg(long = "topic")]
        topics: Vec<String>,
        /// Serialization format records are converted to before decoding.
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path, "loading configuration");
            match ReaderConfig::load(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load config");
                    std::process::exit(1);
                }
            }
        }
        None => ReaderConfig::default(),
    };

    let result = match cli.command {
        Command::Info { bag } => info(&config, &bag),
        Command::Cat { bag, topics, format } => cat(&config, &bag, topics, &format),
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "bag-cat failed");
        std::process::exit(1);
    }
}

fn build_reader(config: &ReaderConfig) -> Result<SimpleReader, ReaderError> {
    let converters = Arc::new(ConverterFactory::from_config(config)?);
    Ok(SimpleReader::with_converters(
        Arc::new(StorageRegistry::with_builtins()),
        converters,
    ))
}

fn info(config: &ReaderConfig, bag: &str) -> Result<(), ReaderError> {
    let mut reader = build_reader(config)?;
    reader.open(&config.storage_options(bag), &config.converter)?;
    let info = reader.bag_info()?;

    let mut out = std::io::stdout().lock();
    writeln!(out, "bag:        {}", info.uri)?;
    writeln!(out, "storage id: {}", info.storage_id)?;
    match info.message_count {
        Some(n) => writeln!(out, "records:    {n}")?,
        None => writeln!(out, "records:    unknown")?,
    }
    writeln!(out, "topics:")?;
    for t in &info.topics {
        let meta = &t.topic_metadata;
        writeln!(
            out,
            "  {}  {}  {}  {}",
            meta.name, meta.type_name, meta.serialization_format, t.message_count
        )?;
    }
    Ok(())
}

fn cat(
    config: &ReaderConfig,
    bag: &str,
    topics: Vec<String>,
    format: &str,
) -> Result<(), ReaderError> {
    let mut reader = build_reader(config)?;
    let converter = ConverterOptions::new(
        config.converter.input_serialization_format.clone(),
        format,
    );
    reader.open(&config.storage_options(bag), &converter)?;
    if !topics.is_empty() {
        reader.set_filter(StorageFilter::topics(topics))?;
    }

    let mut out = std::io::BufWriter::new(std::io::stdout().lock());
    let mut printed = 0u64;
    while reader.has_next()? {
        reader.read_next()?;
        let msg = reader.deserialize_message()?;
        let line = serde_json::json!({
            "topic": msg.topic_name,
            "time_stamp": msg.time_stamp,
            "type": msg.type_name,
            "data": msg.data,
        });
        writeln!(out, "{line}")?;
        printed += 1;
    }
    out.flush()?;
    tracing::info!(records = printed, "done");
    Ok(())
}
