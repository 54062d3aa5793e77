//! Group store integration tests
//!
//! Tests the complete pipeline:
//! 1. Extract a trial's recordings
//! 2. Merge into the cumulative store
//! 3. Save, reload, and keep merging across "runs"

use std::collections::BTreeMap;
use std::fs;

use tempfile::TempDir;
use trial_store::extract::extract;
use trial_store::record::{fields, TrialContext};
use trial_store::recording::{GroupType, MonitorRecording, Recordings};
use trial_store::storage::{self, StoreFile, StoreOptions};
use trial_store::store::{GroupStore, Store, StoreFormat};
use trial_store::Error;

const STORE_NAME: &str = "group.parquet";

fn neuron_trial(n: usize) -> Recordings<MonitorRecording> {
    let monitor = MonitorRecording::builder("neurongroup")
        .variable("u", vec![vec![-65.0; 10]; n])
        .build();
    BTreeMap::from([(
        GroupType::Neurons,
        BTreeMap::from([("1".to_string(), monitor)]),
    )])
}

fn mixed_trial() -> Recordings<MonitorRecording> {
    let neurons = MonitorRecording::builder("neurongroup")
        .variable("u", vec![vec![-65.0, -64.5, -63.0]; 3])
        .indices(vec![0, 1, 2])
        .build();
    let synapses = MonitorRecording::builder("synapses")
        .variable("w", vec![vec![0.5, 0.51], vec![0.25, 0.26]])
        .variable("I_nmda", vec![vec![0.0, 0.1], vec![0.0, 0.2]])
        .connections(vec![0, 1], vec![2, 3])
        .build();
    BTreeMap::from([
        (
            GroupType::Neurons,
            BTreeMap::from([("1".to_string(), neurons)]),
        ),
        (
            GroupType::Synapses,
            BTreeMap::from([("1_1".to_string(), synapses)]),
        ),
    ])
}

#[test]
fn test_two_trial_scenario() {
    let mut store = GroupStore::new();

    let t1 = extract(&neuron_trial(3), TrialContext::new("t1", 0.0)).unwrap();
    let u = t1.variable("u").unwrap();
    assert_eq!(u.data().unwrap().len(), 3);
    assert!(u.floats(fields::PRE_INDEX).unwrap().iter().all(|x| x.is_nan()));
    assert!(u.floats(fields::POST_INDEX).unwrap().iter().all(|x| x.is_nan()));
    assert_eq!(u.texts(fields::TRIAL_ID).unwrap(), &["t1", "t1", "t1"]);

    store.merge(t1).unwrap();
    assert_eq!(store.variable("u").unwrap().rows(), 3);

    let t2 = extract(&neuron_trial(2), TrialContext::new("t2", 0.0)).unwrap();
    store.merge(t2).unwrap();

    let u = store.variable("u").unwrap();
    assert_eq!(u.rows(), 5);
    assert_eq!(u.rows_for_trial("t1"), vec![0, 1, 2]);
    assert_eq!(u.rows_for_trial("t2"), vec![3, 4]);
}

#[test]
fn test_synapse_scenario() {
    let trial = extract(&mixed_trial(), TrialContext::new("t1", 1.0)).unwrap();
    let w = trial.variable("w").unwrap();

    assert_eq!(w.floats(fields::PRE_INDEX), Some(&[0.0, 1.0][..]));
    assert_eq!(w.floats(fields::POST_INDEX), Some(&[2.0, 3.0][..]));
    assert_eq!(trial.variables().len(), 3);
}

#[test]
fn test_load_or_create_missing_file_returns_empty_store() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("experiment").join("polarity");

    let store = storage::load_or_create(&nested, STORE_NAME, StoreFormat::Records).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.format(), StoreFormat::Records);
    assert!(nested.is_dir(), "missing directory should be created");

    let tables = storage::load_or_create(&nested, STORE_NAME, StoreFormat::Tables).unwrap();
    assert!(matches!(tables, Store::Tables(ref t) if t.is_empty()));
}

#[test]
fn test_save_load_round_trip_across_runs() {
    let dir = TempDir::new().unwrap();
    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();

    // run 1
    let mut store = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    let params = serde_json::json!({"simulation": {"dt": 0.025, "duration": 100}});
    let ctx = TrialContext::builder("t1", 20.0).params(params.clone()).build();
    store.merge(extract(&mixed_trial(), ctx).unwrap()).unwrap();
    file.save_records(&store).unwrap();

    // run 2
    let reloaded = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    assert_eq!(reloaded, store);
    assert_eq!(reloaded.context("t1").unwrap().params(), Some(&params));

    let mut store = reloaded;
    store
        .merge(extract(&mixed_trial(), TrialContext::new("t2", -20.0)).unwrap())
        .unwrap();
    file.save_records(&store).unwrap();

    let reloaded = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    assert_eq!(reloaded, store);
    assert_eq!(reloaded.trial_count(), 2);
    let w = reloaded.variable("w").unwrap();
    assert_eq!(w.rows(), 4);
    assert_eq!(w.floats(fields::FIELD_MAG), Some(&[20.0, 20.0, -20.0, -20.0][..]));
    assert!(reloaded.variable("u").unwrap().floats(fields::PRE_INDEX).unwrap()[0].is_nan());
}

#[test]
fn test_load_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut store = GroupStore::new();
    store
        .merge(extract(&mixed_trial(), TrialContext::new("t1", 0.0)).unwrap())
        .unwrap();
    storage::save(&Store::from(store), dir.path(), STORE_NAME).unwrap();

    let first = storage::load_or_create(dir.path(), STORE_NAME, StoreFormat::Records).unwrap();
    let second = storage::load_or_create(dir.path(), STORE_NAME, StoreFormat::Records).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_table_form_load_and_save() {
    let dir = TempDir::new().unwrap();
    let mut store = GroupStore::new();
    store
        .merge(extract(&mixed_trial(), TrialContext::new("t1", 0.0)).unwrap())
        .unwrap();
    storage::save(&Store::from(store.clone()), dir.path(), STORE_NAME).unwrap();

    let Store::Tables(tables) =
        storage::load_or_create(dir.path(), STORE_NAME, StoreFormat::Tables).unwrap()
    else {
        panic!("expected table form");
    };
    assert_eq!(tables.table("u").unwrap().num_rows(), 3);
    assert_eq!(tables.table("w").unwrap().num_rows(), 2);

    storage::save(&Store::from(tables), dir.path(), STORE_NAME).unwrap();
    let reloaded = storage::load_or_create(dir.path(), STORE_NAME, StoreFormat::Records)
        .unwrap()
        .into_records()
        .unwrap();
    assert_eq!(reloaded, store);
}

#[test]
fn test_save_overwrites_and_leaves_no_staging_file() {
    let dir = TempDir::new().unwrap();
    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();

    let mut store = GroupStore::new();
    store.merge(extract(&neuron_trial(3), TrialContext::new("t1", 0.0)).unwrap()).unwrap();
    file.save_records(&store).unwrap();
    store.merge(extract(&neuron_trial(2), TrialContext::new("t2", 0.0)).unwrap()).unwrap();
    let path = file.save_records(&store).unwrap();

    assert_eq!(path, dir.path().join(STORE_NAME));
    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec![STORE_NAME.to_string()]);

    let reloaded = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    assert_eq!(reloaded.variable("u").unwrap().rows(), 5);
}

#[test]
fn test_empty_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();
    file.save_records(&GroupStore::new()).unwrap();

    assert!(file.exists());
    let store = file.load_or_create(StoreFormat::Records).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_zero_row_variable_round_trip() {
    let dir = TempDir::new().unwrap();
    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();

    let mut store = GroupStore::new();
    store.merge(extract(&neuron_trial(0), TrialContext::new("t0", 0.0)).unwrap()).unwrap();
    assert_eq!(store.variable("u").unwrap().rows(), 0);
    file.save_records(&store).unwrap();

    let reloaded = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    assert_eq!(reloaded, store);
    assert_eq!(reloaded.variable("u").unwrap().num_fields(), 8);
}

#[test]
fn test_corrupt_file_is_storage_fault() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(STORE_NAME), b"not a parquet file").unwrap();

    let err = storage::load_or_create(dir.path(), STORE_NAME, StoreFormat::Records).unwrap_err();
    assert!(err.is_storage_fault());
    assert!(err.to_string().contains(STORE_NAME));
}

#[test]
fn test_reserved_marker_in_file_name_rejected() {
    let dir = TempDir::new().unwrap();
    let err =
        storage::load_or_create(dir.path(), "group_data.parquet", StoreFormat::Records).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn test_trial_files_listed_by_marker() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("t2_data.pkl"), b"").unwrap();
    fs::write(dir.path().join("t1_data.pkl"), b"").unwrap();
    fs::write(dir.path().join("notes.txt"), b"").unwrap();

    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();
    file.save_records(&GroupStore::new()).unwrap();

    let trial_files = file.trial_files().unwrap();
    assert_eq!(
        trial_files,
        vec![dir.path().join("t1_data.pkl"), dir.path().join("t2_data.pkl")]
    );

    let custom = StoreFile::with_options(
        dir.path(),
        STORE_NAME,
        StoreOptions::new().reserved_marker("notes"),
    )
    .unwrap();
    assert_eq!(custom.trial_files().unwrap(), vec![dir.path().join("notes.txt")]);
}

#[test]
fn test_small_row_groups_round_trip() {
    let dir = TempDir::new().unwrap();
    let file = StoreFile::with_options(
        dir.path(),
        STORE_NAME,
        StoreOptions::new().max_row_group_size(2).sync_on_save(false),
    )
    .unwrap();

    let mut store = GroupStore::new();
    for (i, n) in [3usize, 1, 4].into_iter().enumerate() {
        let ctx = TrialContext::new(format!("t{i}"), 0.0);
        store.merge(extract(&neuron_trial(n), ctx).unwrap()).unwrap();
    }
    file.save_records(&store).unwrap();

    let reloaded = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    assert_eq!(reloaded, store);
    assert_eq!(reloaded.variable("u").unwrap().rows_for_trial("t2"), vec![4, 5, 6, 7]);
}

#[test]
fn test_context_field_mag_reloads_exactly() {
    let dir = TempDir::new().unwrap();
    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();

    let mut store = GroupStore::new();
    for (id, field_mag) in [("t1", 3.073_833_332_652_391_4), ("t2", -15.573_566_217_813_665)] {
        store
            .merge(extract(&neuron_trial(2), TrialContext::new(id, field_mag)).unwrap())
            .unwrap();
    }
    file.save_records(&store).unwrap();

    let reloaded = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    assert_eq!(
        reloaded.context("t1").unwrap().field_mag().to_bits(),
        3.073_833_332_652_391_4_f64.to_bits()
    );
    assert_eq!(reloaded, store);
}

#[test]
fn test_non_finite_field_mag_keeps_store_loadable() {
    let dir = TempDir::new().unwrap();
    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();

    let mut store = GroupStore::new();
    store.merge(extract(&neuron_trial(2), TrialContext::new("t1", 1.0)).unwrap()).unwrap();
    file.save_records(&store).unwrap();

    store.merge(extract(&neuron_trial(2), TrialContext::new("t2", f64::NAN)).unwrap()).unwrap();
    store
        .merge(extract(&neuron_trial(1), TrialContext::new("t3", f64::NEG_INFINITY)).unwrap())
        .unwrap();
    file.save_records(&store).unwrap();

    let reloaded = file.load_or_create(StoreFormat::Records).unwrap().into_records().unwrap();
    assert!(reloaded.context("t2").unwrap().field_mag().is_nan());
    assert_eq!(reloaded.context("t3").unwrap().field_mag(), f64::NEG_INFINITY);
    assert_eq!(reloaded, store);
}

#[test]
fn test_directory_in_place_of_store_file_is_storage_fault() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(STORE_NAME)).unwrap();

    let err = storage::load_or_create(dir.path(), STORE_NAME, StoreFormat::Records).unwrap_err();
    assert!(err.is_storage_fault());
    assert!(err.to_string().contains(STORE_NAME));
}

#[test]
fn test_failed_replace_removes_staging_file() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join(STORE_NAME);
    fs::create_dir(&blocker).unwrap();
    fs::write(blocker.join("keep.txt"), b"x").unwrap();

    let file = StoreFile::new(dir.path(), STORE_NAME).unwrap();
    let mut store = GroupStore::new();
    store.merge(extract(&neuron_trial(2), TrialContext::new("t1", 0.0)).unwrap()).unwrap();

    let err = file.save_records(&store).unwrap_err();
    assert!(matches!(err, Error::PathIo { .. }));
    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec![STORE_NAME.to_string()]);
}
