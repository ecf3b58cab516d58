//! Daily weather (mean, maximum and minimum air temperature, precipitation) from
//! the Open-Meteo historical archive.
//!
//! Each (location, year) slice is downloaded once and cached as parquet, so
//! re-running a download for the same catalog only hits the network for slices
//! that were missing or failed last time.

use crate::catalog::location_catalog::LocationCatalog;
use crate::temperature::error::TemperatureDownloadError;
use crate::temperature::source::write_temperature_csv;
use crate::types::date_range::DateRange;
use crate::types::location::{LatLon, Location};
use crate::types::observation::{TemperatureObservation, TemperatureUnit};
use bon::bon;
use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use polars::prelude::*;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs, task};

const DEFAULT_ENDPOINT: &str = "https://archive-api.open-meteo.com/v1/archive";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PAUSE: Duration = Duration::from_millis(500);
const CACHE_DIR_NAME: &str = "fishing_trends_cache";
const VAR_MEAN: &str = "temperature_2m_mean";
const VAR_MAX: &str = "temperature_2m_max";
const VAR_MIN: &str = "temperature_2m_min";
const VAR_PRECIPITATION: &str = "precipitation_sum";
const COLUMN_DATE: &str = "date";

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_mean: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

/// One archive day. Every value may be absent.
#[derive(Debug, Clone, PartialEq)]
struct DailyWeather {
    date: NaiveDate,
    mean: Option<f64>,
    max: Option<f64>,
    min: Option<f64>,
    precipitation_mm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ArchiveErrorBody {
    reason: Option<String>,
}

/// What [`OpenMeteoArchive::download_to_csv`] produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadSummary {
    pub locations_downloaded: usize,
    pub readings: usize,
    /// Locations with no coordinates.
    pub skipped_locations: Vec<String>,
    /// `(location_id, year)` slices that could not be fetched.
    pub failed_slices: Vec<(String, i32)>,
}

pub struct OpenMeteoArchive {
    client: Client,
    endpoint: String,
    cache_dir: PathBuf,
    pause: Duration,
}

#[bon]
impl OpenMeteoArchive {
    /// Creates a downloader.
    ///
    /// * `.cache_dir(PathBuf)`: Optional. Defaults to a folder under the system cache directory.
    ///   Created if it doesn't exist.
    /// * `.endpoint(String)`: Optional. Defaults to the public archive API.
    /// * `.timeout(Duration)`: Optional per-request timeout.
    /// * `.pause(Duration)`: Optional pause after each uncached request. Defaults to 500 ms.
    #[builder]
    pub async fn new(
        cache_dir: Option<PathBuf>,
        endpoint: Option<String>,
        timeout: Option<Duration>,
        pause: Option<Duration>,
    ) -> Result<Self, TemperatureDownloadError> {
        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .ok_or(TemperatureDownloadError::CacheDirResolution)?
                .join(CACHE_DIR_NAME),
        };
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| TemperatureDownloadError::CacheDirCreation(cache_dir.clone(), e))?;

        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(TemperatureDownloadError::Client)?;

        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            cache_dir,
            pause: pause.unwrap_or(DEFAULT_PAUSE),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Downloads daily weather for every catalog location with coordinates and
    /// writes it as a temperature CSV to `path`.
    ///
    /// A location-year that fails to download is logged and left out; the
    /// returned summary lists it.
    pub async fn download_to_csv(
        &self,
        catalog: &LocationCatalog,
        range: DateRange,
        path: &Path,
    ) -> Result<DownloadSummary, TemperatureDownloadError> {
        let mut summary = DownloadSummary::default();
        let mut observations = Vec::new();

        for location in catalog.iter() {
            let Some(coordinates) = location.coordinates else {
                warn!("Skipping {}: no coordinates", location);
                summary.skipped_locations.push(location.id.clone());
                continue;
            };

            let mut downloaded_any = false;
            for slice in year_slices(range) {
                match self.daily_weather(location, coordinates, slice).await {
                    Ok(readings) => {
                        downloaded_any = true;
                        observations.extend(readings);
                    }
                    Err(e) => {
                        warn!(
                            "Failed to get temperatures for {} in {}: {}",
                            location,
                            slice.start().format("%Y"),
                            e
                        );
                        summary
                            .failed_slices
                            .push((location.id.clone(), slice.start().year()));
                    }
                }
            }
            if downloaded_any {
                summary.locations_downloaded += 1;
            }
        }

        summary.readings = observations.len();
        let path_buf = path.to_path_buf();
        task::spawn_blocking(move || write_temperature_csv(&path_buf, &observations)).await??;
        info!(
            "Wrote {} temperature readings for {} locations to {}",
            summary.readings,
            summary.locations_downloaded,
            path.display()
        );
        Ok(summary)
    }

    /// Daily readings (Celsius, mm) for one location within one calendar year.
    ///
    /// Days the archive has no mean temperature for are left out.
    pub async fn daily_weather(
        &self,
        location: &Location,
        coordinates: LatLon,
        slice: DateRange,
    ) -> Result<Vec<TemperatureObservation>, TemperatureDownloadError> {
        let parquet_path = self.cache_dir.join(cache_file_name(&location.id, coordinates, slice));

        let df = if fs::metadata(&parquet_path).await.is_ok() {
            info!("Cache hit for {} in {} at {:?}", location.id, slice, parquet_path);
            read_cache(&parquet_path).await?
        } else {
            warn!("Cache miss for {} in {}. Downloading.", location.id, slice);
            let series = self.download(&location.id, coordinates, slice).await?;
            let df = series_frame(&series)
                .map_err(|e| TemperatureDownloadError::CachePolars(parquet_path.clone(), e))?;
            write_cache(df.clone(), &parquet_path).await?;
            tokio::time::sleep(self.pause).await;
            df
        };

        frame_to_observations(&df, &location.id)
            .map_err(|e| TemperatureDownloadError::CachePolars(parquet_path, e))
    }

    async fn download(
        &self,
        location_id: &str,
        coordinates: LatLon,
        slice: DateRange,
    ) -> Result<Vec<DailyWeather>, TemperatureDownloadError> {
        let query = [
            ("latitude", coordinates.latitude().to_string()),
            ("longitude", coordinates.longitude().to_string()),
            ("start_date", slice.start().format("%Y-%m-%d").to_string()),
            ("end_date", slice.end().format("%Y-%m-%d").to_string()),
            ("daily", [VAR_MEAN, VAR_MAX, VAR_MIN, VAR_PRECIPITATION].join(",")),
            ("timezone", "auto".to_string()),
        ];

        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| TemperatureDownloadError::NetworkRequest(self.endpoint.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ArchiveErrorBody>()
                .await
                .ok()
                .and_then(|body| body.reason)
                .unwrap_or_default();
            return Err(TemperatureDownloadError::HttpStatus {
                url: self.endpoint.clone(),
                status,
                reason,
            });
        }

        let body: ArchiveResponse = response
            .json()
            .await
            .map_err(|e| TemperatureDownloadError::NetworkRequest(self.endpoint.clone(), e))?;
        parse_daily(body, location_id)
    }
}

fn parse_daily(
    body: ArchiveResponse,
    location_id: &str,
) -> Result<Vec<DailyWeather>, TemperatureDownloadError> {
    let malformed = |detail: String| TemperatureDownloadError::MalformedResponse {
        location_id: location_id.to_string(),
        detail,
    };
    let daily = body
        .daily
        .ok_or_else(|| malformed("no 'daily' block".to_string()))?;
    let days = daily.time.len();
    if daily.temperature_2m_mean.len() != days {
        return Err(malformed(format!(
            "{} dates but {} {} values",
            days,
            daily.temperature_2m_mean.len(),
            VAR_MEAN
        )));
    }
    // The extra variables may be left out entirely, but not partially.
    let extra = |name: &str, values: Vec<Option<f64>>| {
        match values.len() {
            0 => Ok(vec![None; days]),
            n if n == days => Ok(values),
            n => Err(malformed(format!("{} dates but {} {} values", days, n, name))),
        }
    };
    let max = extra(VAR_MAX, daily.temperature_2m_max)?;
    let min = extra(VAR_MIN, daily.temperature_2m_min)?;
    let precipitation = extra(VAR_PRECIPITATION, daily.precipitation_sum)?;

    daily
        .time
        .iter()
        .enumerate()
        .map(|(idx, day)| {
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map_err(|_| malformed(format!("bad date '{}'", day)))?;
            Ok(DailyWeather {
                date,
                mean: daily.temperature_2m_mean[idx],
                max: max[idx],
                min: min[idx],
                precipitation_mm: precipitation[idx],
            })
        })
        .collect()
}

/// Splits a range at calendar year boundaries.
fn year_slices(range: DateRange) -> Vec<DateRange> {
    range
        .years()
        .filter_map(|year| {
            let whole = DateRange::year(year)?;
            DateRange::new(
                whole.start().max(range.start()),
                whole.end().min(range.end()),
            )
        })
        .collect()
}

fn cache_file_name(location_id: &str, coordinates: LatLon, slice: DateRange) -> String {
    let id: String = location_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "open_meteo_daily_{}_{:.4}_{:.4}_{}_{}.parquet",
        id,
        coordinates.latitude(),
        coordinates.longitude(),
        slice.start().format("%Y%m%d"),
        slice.end().format("%Y%m%d")
    )
}

fn series_frame(series: &[DailyWeather]) -> PolarsResult<DataFrame> {
    df!(
        COLUMN_DATE => series.iter().map(|d| d.date.format("%Y-%m-%d").to_string()).collect::<Vec<_>>(),
        VAR_MEAN => series.iter().map(|d| d.mean).collect::<Vec<_>>(),
        VAR_MAX => series.iter().map(|d| d.max).collect::<Vec<_>>(),
        VAR_MIN => series.iter().map(|d| d.min).collect::<Vec<_>>(),
        VAR_PRECIPITATION => series.iter().map(|d| d.precipitation_mm).collect::<Vec<_>>()
    )
}

fn frame_to_observations(
    df: &DataFrame,
    location_id: &str,
) -> PolarsResult<Vec<TemperatureObservation>> {
    let dates = df.column(COLUMN_DATE)?.str()?;
    let means = df.column(VAR_MEAN)?.f64()?;
    let max = df.column(VAR_MAX)?.f64()?;
    let min = df.column(VAR_MIN)?.f64()?;
    let precipitation = df.column(VAR_PRECIPITATION)?.f64()?;

    Ok((0..df.height())
        .filter_map(|idx| {
            let date = NaiveDate::parse_from_str(dates.get(idx)?, "%Y-%m-%d").ok()?;
            Some(TemperatureObservation {
                temperature_max: max.get(idx),
                temperature_min: min.get(idx),
                precipitation_mm: precipitation.get(idx),
                ..TemperatureObservation::new(
                    location_id,
                    date,
                    means.get(idx)?,
                    TemperatureUnit::Celsius,
                )
            })
        })
        .collect())
}

async fn read_cache(path: &Path) -> Result<DataFrame, TemperatureDownloadError> {
    let path_buf = path.to_path_buf();
    task::spawn_blocking(move || {
        let file = std::fs::File::open(&path_buf)
            .map_err(|e| TemperatureDownloadError::CacheIo(path_buf.clone(), e))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| TemperatureDownloadError::CachePolars(path_buf, e))
    })
    .await?
}

async fn write_cache(mut df: DataFrame, path: &Path) -> Result<(), TemperatureDownloadError> {
    let path_buf = path.to_path_buf();
    task::spawn_blocking(move || {
        let file = std::fs::File::create(&path_buf)
            .map_err(|e| TemperatureDownloadError::CacheIo(path_buf.clone(), e))?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut df)
            .map_err(|e| TemperatureDownloadError::CachePolars(path_buf, e))?;
        Ok::<(), TemperatureDownloadError>(())
    })
    .await??;
    Ok(())
}
