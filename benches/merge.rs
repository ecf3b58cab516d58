use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fishing_trends::{
    merge, MergeConfig, SearchTerm, TemperatureDataset, TemperatureObservation, TemperatureUnit,
    TrendObservation,
};

const LOCATIONS: usize = 50;

fn inputs() -> (Vec<TrendObservation>, TemperatureDataset) {
    let first_monday = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let first_day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let terms: Vec<SearchTerm> = fishing_trends::default_search_terms();

    let mut trends = Vec::new();
    let mut readings = Vec::new();
    for l in 0..LOCATIONS {
        let location_id = format!("location-{l:02}");
        for term in &terms {
            for week in 0..52 {
                trends.push(TrendObservation {
                    location_id: location_id.clone(),
                    term: term.clone(),
                    week_start_date: first_monday + Duration::weeks(week),
                    interest_score: ((week * 7 + l as i64) % 101) as u8,
                });
            }
        }
        // Skip every fifth day so some weeks fall back to the nearest reading.
        for day in (0..365).filter(|d| d % 5 != 0) {
            let mean = (day as f64 / 365.0) * 30.0 - 5.0;
            readings.push(TemperatureObservation {
                temperature_max: Some(mean + 6.0),
                temperature_min: Some(mean - 6.0),
                precipitation_mm: (day % 3 == 0).then_some(2.5),
                ..TemperatureObservation::new(
                    location_id.clone(),
                    first_day + Duration::days(day),
                    mean,
                    TemperatureUnit::Celsius,
                )
            });
        }
    }
    (trends, TemperatureDataset::from_observations(readings).unwrap())
}

fn bench_merge(c: &mut Criterion) {
    let (trends, temperature) = inputs();
    let config = MergeConfig::default();
    c.bench_function("merge_50_locations_1_year", |b| {
        b.iter(|| merge(black_box(&trends), black_box(&temperature), &config))
    });
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
