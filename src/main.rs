use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use golf_utilization::cache::FileCache;
use golf_utilization::config::Config;
use golf_utilization::fetcher::ClassesFetcher;
use golf_utilization::normalizer::RecordNormalizer;
use golf_utilization::pipeline;
use golf_utilization::report::{self, RunSummary};
use golf_utilization::schedule_page::{HttpPageProvider, SnapshotPageProvider};
use golf_utilization::source::{self, ApiSource, Collected, ScrapeSource, SourceKind};

#[derive(Parser)]
#[command(name = "golf-utilization")]
#[command(about = "Estimate golf bay utilization from booking schedule data", long_about = None)]
struct Cli {
    /// Where to read bookings from (overrides GOLF_SOURCE)
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// First local date to include, YYYY-MM-DD (overrides GOLF_DATE_FROM)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last local date to include, YYYY-MM-DD (overrides GOLF_DATE_TO)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Booking system region ID (overrides GOLF_REGION_ID)
    #[arg(long)]
    region: Option<String>,

    /// IANA time zone of the facility (overrides GOLF_TIMEZONE)
    #[arg(long)]
    timezone: Option<Tz>,

    /// Raw response cache directory (overrides GOLF_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory for CSV output (overrides GOLF_OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory of saved frame_<date>.html snapshots (overrides GOLF_FRAME_DIR)
    #[arg(long)]
    frame_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(from) = self.from {
            config.date_from = Some(from);
        }
        if let Some(to) = self.to {
            config.date_to = Some(to);
        }
        if let Some(region) = self.region {
            config.region_id = region;
        }
        if let Some(timezone) = self.timezone {
            config.timezone = timezone;
        }
        if let Some(cache_dir) = self.cache_dir {
            config.cache_dir = cache_dir;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(frame_dir) = self.frame_dir {
            config.frame_dir = Some(frame_dir);
        }
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}

#[instrument(skip(config))]
async fn collect_raw(config: &Config) -> Result<Collected, Box<dyn std::error::Error>> {
    let range = config.date_range()?;
    let pb = progress_bar();

    let collected = match config.source {
        SourceKind::Api => {
            info!(
                "Reading classes API at {} (cache: {})",
                config.api_base_url,
                config.cache_dir.display()
            );
            let fetcher = ClassesFetcher::new(
                config.api_base_url.clone(),
                config.region_id.clone(),
                FileCache::new(config.cache_dir.clone()),
            )
            .with_page_size(config.page_size)
            .with_timeout(Duration::from_secs(config.http_timeout_secs))?;
            source::collect(&ApiSource::new(fetcher), range, config.chunk_days, &pb).await
        }
        SourceKind::Scrape => match &config.frame_dir {
            Some(dir) => {
                info!("Reading schedule frame snapshots from {}", dir.display());
                let scrape = ScrapeSource::new(
                    SnapshotPageProvider::new(dir.clone()),
                    config.default_location.clone(),
                );
                source::collect(&scrape, range, config.chunk_days, &pb).await
            }
            None => {
                info!("Requesting schedule pages from {}", config.schedule_url);
                let provider = HttpPageProvider::new(config.schedule_url.clone())
                    .with_timeout(Duration::from_secs(config.http_timeout_secs))?;
                let scrape = ScrapeSource::new(provider, config.default_location.clone());
                source::collect(&scrape, range, config.chunk_days, &pb).await
            }
        },
    };

    Ok(collected)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,golf_utilization=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    dotenvy::dotenv().ok();

    let mut config = Config::from_env()?;
    Cli::parse().apply(&mut config);
    info!("Starting golf utilization run with config: {:?}", config);

    let collected = collect_raw(&config).await?;

    let normalizer = RecordNormalizer::new(config.timezone, config.slot_capacity);
    let mut output = pipeline::run(&normalizer, &collected.records);
    output.diagnostics.failed_ranges = collected.failed.len();

    if !collected.failed.is_empty() {
        warn!(
            "{} date ranges could not be fetched; results exclude them",
            collected.failed.len()
        );
    }
    if output.rollups.is_empty() {
        warn!("No usable records; writing empty tables");
    }

    let written = report::write_reports(&config.output_dir, &output.rollups)?;
    let summary_path = report::write_summary(
        &config.output_dir,
        &RunSummary {
            source: config.source.to_string(),
            timezone: config.timezone.name().to_string(),
            diagnostics: &output.diagnostics,
            failed_ranges: &collected.failed,
        },
    )?;

    for path in &written {
        info!("Wrote {}", path.display());
    }
    info!("Wrote {}", summary_path.display());
    info!(
        "Done: {} records normalized, {} flagged labels, {} clamped, {} rejected, {} failed ranges",
        output.diagnostics.normalized,
        output.diagnostics.flagged_labels,
        output.diagnostics.clamped,
        output.diagnostics.rejected,
        output.diagnostics.failed_ranges
    );

    Ok(())
}
