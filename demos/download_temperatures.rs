use fishing_trends::{DateRange, LocationCatalog, OpenMeteoArchive, PipelineError};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Downloads 2023 daily mean temperatures for every catalog location.
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let catalog = LocationCatalog::load(Path::new("data/locations.csv"))?;
    let archive = OpenMeteoArchive::builder().build().await?;

    let summary = archive
        .download_to_csv(
            &catalog,
            DateRange::year(2023).unwrap(),
            Path::new("data/temperature_2023.csv"),
        )
        .await?;
    dbg!(summary);
    Ok(())
}
