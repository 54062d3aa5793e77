//! Trial Aggregation Example
//!
//! Simulates a small field-polarity sweep: each "trial" produces noisy
//! membrane traces and synaptic weights, which are extracted, merged into the
//! group store and saved. Running the example twice keeps growing the same
//! store.
//!
//! Run with: RUST_LOG=info cargo run --example trial_aggregation -- [store-dir]

use std::collections::BTreeMap;

use anyhow::Context;
use rand::Rng;
use tracing_subscriber::EnvFilter;
use trial_store::extract::extract;
use trial_store::record::{fields, TrialContext};
use trial_store::recording::{GroupType, MonitorRecording, Recordings};
use trial_store::storage::StoreFile;
use trial_store::store::StoreFormat;

const NEURONS: usize = 4;
const SYNAPSES: usize = 3;
const SAMPLES: usize = 200;

fn simulate(field_mag: f64) -> Recordings<MonitorRecording> {
    let mut rng = rand::thread_rng();

    let u: Vec<Vec<f64>> = (0..NEURONS)
        .map(|_| {
            (0..SAMPLES)
                .map(|_| -70.0 + 0.1 * field_mag + rng.gen_range(-1.0..1.0))
                .collect()
        })
        .collect();
    let w: Vec<Vec<f64>> = (0..SYNAPSES)
        .map(|_| {
            let mut weight = 0.5;
            (0..SAMPLES)
                .map(|_| {
                    weight += 1e-4 * field_mag + rng.gen_range(-1e-3..1e-3);
                    weight
                })
                .collect()
        })
        .collect();

    let neurons = MonitorRecording::builder("neurongroup")
        .variable("u", u)
        .build();
    let synapses = MonitorRecording::builder("synapses")
        .variable("w", w)
        .connections(vec![0, 1, 2], vec![3, 3, 3])
        .build();

    BTreeMap::from([
        (GroupType::Neurons, BTreeMap::from([("1".to_string(), neurons)])),
        (GroupType::Synapses, BTreeMap::from([("1_1".to_string(), synapses)])),
    ])
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let directory = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "target/trial_store_demo".to_string());

    println!("=== trial-store: Trial Aggregation ===\n");

    let file = StoreFile::new(&directory, "group.parquet")?;
    let mut store = file
        .load_or_create(StoreFormat::Records)?
        .into_records()
        .context("decoding existing group store")?;
    println!("1. Loaded store: {} trials so far", store.trial_count());

    println!("\n2. Running field sweep...");
    let run = chrono::Utc::now().timestamp_millis();
    for (i, field_mag) in [-20.0, 0.0, 20.0].into_iter().enumerate() {
        let trial_id = format!("{run}-{i}");
        let context = TrialContext::builder(&trial_id, field_mag)
            .params(serde_json::json!({
                "simulation": {"trial_id": trial_id, "field_mag": field_mag, "dt": 0.025},
                "neurons": {"1": {"n": NEURONS}},
                "synapses": {"1_1": {"n": SYNAPSES}},
            }))
            .build();

        let trial = extract(&simulate(field_mag), context)?;
        let rows = store.merge(trial)?;
        println!("   trial {trial_id}: field {field_mag:+} V/m, {rows} rows appended");
    }

    let path = file.save_records(&store)?;
    println!("\n3. Saved {} variables to {}", store.variable_count(), path.display());

    println!("\n4. Table view:");
    let tables = store.to_tables()?;
    for (variable, table) in tables.tables() {
        println!("   {variable}: {} rows x {} fields", table.num_rows(), table.num_columns());
    }

    if let Some(w) = store.variable("w") {
        let ids = w.texts(fields::TRIAL_ID).unwrap_or_default();
        let last = w.data().unwrap_or_default();
        let final_weights: Vec<String> = last
            .iter()
            .zip(ids)
            .rev()
            .take(SYNAPSES)
            .map(|(trace, id)| format!("{id}: {:.4}", trace.last().copied().unwrap_or(f64::NAN)))
            .collect();
        println!("\n5. Final weights of the latest trial: {final_weights:?}");
    }

    Ok(())
}
