use fishing_trends::{
    DateRange, ExtractionConfig, Jitter, Pipeline, PipelineConfig, PipelineError, SerpApiTrends,
};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Runs a full 2023 extraction and merge over the files in `data/`.
///
/// Usage: `SERPAPI_API_KEY=... cargo run --example run_pipeline [--retry-failures]`
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let api_key = env::var("SERPAPI_API_KEY").expect("SERPAPI_API_KEY must be set");
    let provider = SerpApiTrends::builder()
        .api_key(api_key)
        .build()
        .expect("failed to build HTTP client");

    let data = PathBuf::from("data");
    let config = PipelineConfig::builder()
        .locations_path(data.join("locations.csv"))
        .temperature_path(data.join("temperature_2023.csv"))
        .extraction_path(data.join("trends_2023.csv"))
        .merged_path(data.join("trends_with_temperature_2023.csv"))
        .extraction(
            ExtractionConfig::builder()
                .date_range(DateRange::year(2023).unwrap())
                .jitter(Jitter {
                    min: Duration::from_secs(15),
                    max: Duration::from_secs(30),
                })
                .skip_completed(true)
                .max_locations_per_run(50)
                .build(),
        )
        .build();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let pipeline = Pipeline::new(provider, config);
    let report = if env::args().any(|arg| arg == "--retry-failures") {
        pipeline.rerun_failures(&cancel).await?
    } else {
        pipeline.run(&cancel).await?
    };

    println!(
        "Fetched {} rows, {} pairs failed, {} skipped{}",
        report.extraction.observations.len(),
        report.extraction.failures.len(),
        report.extraction.pairs_skipped,
        if report.extraction.cancelled { " (cancelled)" } else { "" }
    );
    println!(
        "Merged {} rows into {}: {:#?}",
        report.merged_rows,
        report.merged_path.display(),
        report.merge
    );
    Ok(())
}
