use addis_geocoder::address::{candidates, standardize, AddressNormalizer};
use addis_geocoder::batch::{load_addresses, ApiKeys, BatchOptions, BatchRunner, Shard};
use addis_geocoder::config::Settings;
use addis_geocoder::error::{Error, Result};
use addis_geocoder::flatten;
use addis_geocoder::geocode::{CancelToken, HttpGeocodingApi, Resolver, Route};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

/// Addis Geocoder: address resolution for Addis Ababa property listings
///
/// Normalizes noisy Amharic/English addresses and resolves them through
/// Google Maps and OpenStreetMap Nominatim, relaxing the query until a
/// provider recognises it.
///
/// Examples:
///   geocoder normalize "ቦሌ ቡልቡላ አካባቢ ጥሩ ቤት"
///   geocoder resolve addresses.csv --keys keys.json
///   geocoder resolve addresses.csv --keys keys.json --shard 0/4 --resume
///   geocoder resolve addresses.csv --nominatim-only
///   geocoder flatten geocode_results --csv addresses.csv
#[derive(Parser)]
#[command(name = "geocoder", version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults to ~/.addis-geocoder/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve every address in a CSV file, writing numbered checkpoints.
    Resolve {
        /// CSV with columns address_main, address_alt, use_api, ids.
        input: PathBuf,

        /// API key file: {"autocomplete": {..}, "geocode": {..}}.
        #[arg(long)]
        keys: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Records per checkpoint file.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Process only slice K of N, e.g. 0/4.
        #[arg(long)]
        shard: Option<Shard>,

        /// Skip addresses already present in the output directory.
        #[arg(long)]
        resume: bool,

        /// Stop cleanly after this many seconds.
        #[arg(long)]
        time_limit_secs: Option<u64>,

        /// Use Nominatim only. No API keys needed.
        #[arg(long)]
        nominatim_only: bool,

        /// Keep the response cache in memory only.
        #[arg(long)]
        no_cache: bool,
    },

    /// Turn checkpoint files into one row per listing id.
    Flatten {
        /// Directory holding geocoding_results__NN.json files.
        dir: PathBuf,

        #[arg(long)]
        json: Option<PathBuf>,

        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Show how an address is cleaned and relaxed, without any provider call.
    Normalize {
        address: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Resolve {
            input,
            keys,
            output_dir,
            batch_size,
            shard,
            resume,
            time_limit_secs,
            nominatim_only,
            no_cache,
        } => {
            if nominatim_only {
                settings.resolver.route = Route::NominatimOnly;
            }
            if no_cache {
                settings.cache.persist = false;
            }

            let keys = match keys.or_else(|| settings.batch.credentials.clone()) {
                Some(path) => ApiKeys::load(&path)?,
                None if settings.resolver.route == Route::NominatimOnly => ApiKeys::default(),
                None => {
                    return Err(Error::Config(
                        "Google routes need an API key file (--keys or batch.credentials)".into(),
                    ))
                }
            };

            let mut cancel = CancelToken::new();
            if let Some(secs) = time_limit_secs {
                cancel = cancel.with_time_limit(Duration::from_secs(secs));
            }

            let cache = settings.cache.open(shard.map(|s| s.index));
            let resolver = Resolver::new(HttpGeocodingApi::new(settings.provider.clone()), cache)
                .with_options(settings.resolver.clone())
                .with_retry(settings.retry.clone())
                .with_rate_limits(settings.rate_limit.clone())
                .with_network(settings.network.network_path())
                .with_cancel(cancel);

            let options = BatchOptions {
                batch_size: batch_size.unwrap_or(settings.batch.batch_size).max(1),
                pace: Duration::from_millis(settings.batch.pace_ms),
                output_dir: output_dir.unwrap_or_else(|| settings.batch.output_dir.clone()),
                shard,
                resume,
            };

            let queries = load_addresses(&input)?;
            eprintln!("  Resolving {} addresses from {}", queries.len(), input.display());

            let mut runner = BatchRunner::new(resolver, keys, options);
            let summary = runner.run(queries)?;

            eprintln!(
                "  {} processed: {} matched, {} empty, {} invalid, {} skipped",
                summary.processed, summary.succeeded, summary.empty, summary.invalid, summary.skipped
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Flatten { dir, json, csv } => {
            let rows = flatten::flatten_dir(&dir)?;
            if let Some(path) = &json {
                flatten::write_json(&rows, path)?;
                eprintln!("  Wrote {} rows to {}", rows.len(), path.display());
            }
            if let Some(path) = &csv {
                flatten::write_csv(&rows, path)?;
                eprintln!("  Wrote {} rows to {}", rows.len(), path.display());
            }
            if json.is_none() && csv.is_none() {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }

        Command::Normalize { address } => {
            let normalizer = AddressNormalizer::builtin();
            let tidy = normalizer.tidy(&address);
            let output = json!({
                "input": &address,
                "standardized": standardize(&address),
                "valid": normalizer.validate(&address),
                "candidates": candidates(&tidy),
                "normalized": &tidy,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
