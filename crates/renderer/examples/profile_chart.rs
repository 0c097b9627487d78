//! Renders a profile chart from the in-process backend and writes it as SVG
//!
//! ```text
//! RUST_LOG=debug cargo run -p pulse-renderer --example profile_chart -- chart.svg
//! ```

use pulse_config::PulseConfig;
use pulse_data::{coordinator_with, LocalBackend};
use pulse_renderer::{ChartOptions, DrawList, ProfileChart, RangePreset};
use pulse_shared::{SubjectId, SystemClock};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Hourly message counts following a daily rhythm
fn synthetic_messages(params: &Value) -> Result<Value, Value> {
    let from = params["from"].as_i64().ok_or_else(|| json!("missing from"))?;
    let to = params["to"].as_i64().ok_or_else(|| json!("missing to"))?;
    let bucket = params["bucket_ms"].as_i64().unwrap_or(3_600_000).max(1_000);

    let rows: Vec<Value> = (0..)
        .map(|i| from + i * bucket)
        .take_while(|&start| start < to)
        .map(|start| {
            let hour = (start / 3_600_000) % 24;
            let count = ((hour as f64 / 24.0 * std::f64::consts::TAU).sin() * 5.0 + 6.0).round();
            json!({
                "ts": start + bucket / 2,
                "y": count,
                "bucket_start": start,
                "bucket_end": start + bucket,
            })
        })
        .collect();
    Ok(Value::Array(rows))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "profile_chart.svg".to_string());

    let config = PulseConfig::default();
    let backend = LocalBackend::new()
        .with_subject(SubjectId::new("demo-user"))
        .with_latency(Duration::from_millis(150))
        .with_handler("messages_series", synthetic_messages);
    let coordinator = coordinator_with(&config, Arc::new(backend));

    let chart = ProfileChart::new(
        DrawList::new(960.0, 360.0),
        Arc::new(coordinator),
        Arc::new(SystemClock),
        ChartOptions::from(&config),
    )?;

    chart.apply_preset(RangePreset::Days7);
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Zoom into the last two days and let the refetch settle
    chart.wheel(900.0, -(3.5f64).ln() / config.chart.wheel_sensitivity);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let snapshot = chart.snapshot();
    log::info!(
        "{} points, bucket {:?}ms, {}",
        snapshot.series.len(),
        snapshot.bucket_ms,
        snapshot.summary
    );

    std::fs::write(&output, chart.with_surface(|surface| surface.to_svg()))?;
    println!("{} -> {}", snapshot.summary, output);
    Ok(())
}
