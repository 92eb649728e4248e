//! Integration tests for the preprocessing workflow
//!
//! These tests drive the public library API over realistic BMS and GPS
//! exports, checking the cleaned output end to end.

use fleet_preprocessor::pipeline::cleaning::clean_chunk;
use fleet_preprocessor::processor::reader::ChunkedReader;
use fleet_preprocessor::{
    CheckpointStore, FileOutcome, JsonCheckpointStore, OutputLayout, PreprocessConfig,
    Preprocessor, ProcessingMode,
};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

/// A battery export with a repeated header line, a separator line, blank
/// rows, out-of-range readings and a duplicate
const RAW_BMS: &str = "\
device_no , msg_time ,soc,pack_volt,mod_max_temp,firmware_tag
---------,---------,---,---,---,---
00123,23-06-15 10:00:00,81.5,650.2,25,v1
00123,23-06-15 10:00:10,120,650.1,26,v1
,,,,,
00123,23-06-15 10:00:20, 79.0 ,5000,90,v1
00123,23-06-15 10:00:20, 79.0 ,5000,90,v1
00123,not-a-date,78,649.9,24,v1
";

/// A GPS export whose satellite SNRs are packed into one column
const RAW_GPS: &str = "\
device_no,time,lat,lng,speed,sat_snr
00123,2023-06-15 10:00:00,37.56,126.97,42.5,31|28|35
00123,2023-06-15 10:00:01,37.57,126.98,400,30|27
00123,2023-06-15 10:00:02,95.0,126.99,41.0,29|26|33|40
";

fn read_output(path: &Path) -> DataFrame {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .unwrap()
        .finish()
        .unwrap()
}

fn column(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

fn parsed(values: &[Option<String>]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| v.as_ref().map(|s| s.parse::<f64>().unwrap()))
        .collect()
}

#[tokio::test]
async fn test_bms_export_is_cleaned_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("raw");
    write_file(&input, "bms/EV6/device_00123.csv", RAW_BMS);

    let output = temp_dir.path().join("clean");
    let summary = Preprocessor::new(input, output.clone())
        .unwrap()
        .with_config(PreprocessConfig::default().without_progress())
        .process()
        .await
        .unwrap();
    assert_eq!(summary.failed(), 0);

    let df = read_output(&output.join("bms/EV6/device_00123.csv"));
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "device_no",
            "msg_time",
            "soc",
            "pack_volt",
            "mod_max_temp",
            "firmware_tag"
        ]
    );

    // Separator and blank rows dropped, duplicate removed
    assert_eq!(df.height(), 4);
    assert!(column(&df, "device_no").iter().all(|v| v.as_deref() == Some("00123")));
    assert_eq!(
        column(&df, "msg_time"),
        vec![
            Some("2023-06-15 10:00:00".to_string()),
            Some("2023-06-15 10:00:10".to_string()),
            Some("2023-06-15 10:00:20".to_string()),
            None,
        ]
    );
    assert_eq!(
        parsed(&column(&df, "soc")),
        vec![Some(81.5), None, Some(79.0), Some(78.0)]
    );
    assert_eq!(
        parsed(&column(&df, "pack_volt")),
        vec![Some(650.2), Some(650.1), None, Some(649.9)]
    );
    assert_eq!(
        parsed(&column(&df, "mod_max_temp")),
        vec![Some(25.0), Some(26.0), None, Some(24.0)]
    );
    assert_eq!(column(&df, "firmware_tag")[0].as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_gps_export_expands_and_validates() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("raw");
    write_file(&input, "gps/EV6/device_00123.csv", RAW_GPS);

    let output = temp_dir.path().join("clean");
    Preprocessor::new(input, output.clone())
        .unwrap()
        .with_config(
            PreprocessConfig::default()
                .without_progress()
                .with_mode(ProcessingMode::Streaming)
                .with_batch_size(1),
        )
        .process()
        .await
        .unwrap();

    let df = read_output(&output.join("gps/EV6/device_00123.csv"));
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    // Width comes from the leading rows and holds for every one-row chunk
    assert_eq!(
        names,
        vec![
            "device_no",
            "time",
            "lat",
            "lng",
            "speed",
            "sat_snr_1",
            "sat_snr_2",
            "sat_snr_3",
            "sat_snr_4"
        ]
    );
    assert_eq!(df.height(), 3);
    assert_eq!(parsed(&column(&df, "speed"))[1], None);
    assert_eq!(parsed(&column(&df, "lat"))[2], None);
    assert_eq!(column(&df, "sat_snr_3")[1], None);
    assert_eq!(
        column(&df, "sat_snr_4"),
        vec![None, None, Some("40".to_string())]
    );
}

#[tokio::test]
async fn test_consolidated_run_records_checkpoints() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("raw");
    write_file(&input, "bms/EV6/device_00123.csv", RAW_BMS);
    write_file(&input, "gps/EV6/device_00123.csv", RAW_GPS);

    let output = temp_dir.path().join("clean");
    let checkpoint = temp_dir.path().join("state/checkpoint.json");
    let config = PreprocessConfig::default()
        .without_progress()
        .with_layout(OutputLayout::Consolidated)
        .with_checkpoint_path(checkpoint.clone());

    let summary = Preprocessor::new(input.clone(), output.clone())
        .unwrap()
        .with_config(config.clone())
        .process()
        .await
        .unwrap();
    assert_eq!(summary.succeeded(), 2);
    assert!(output.join("bms.csv").exists());
    assert!(output.join("gps.csv").exists());

    let store = JsonCheckpointStore::open(&checkpoint);
    let entries = store.entries();
    assert_eq!(
        entries.keys().cloned().collect::<Vec<_>>(),
        vec!["bms_device_00123.csv", "gps_device_00123.csv"]
    );
    assert!(entries["gps_device_00123.csv"].is_complete_for(3));

    let rerun = Preprocessor::new(input, output)
        .unwrap()
        .with_config(config)
        .process()
        .await
        .unwrap();
    assert!(
        rerun
            .reports
            .iter()
            .all(|r| r.outcome == FileOutcome::AlreadyComplete)
    );
}

#[test]
fn test_reader_and_cleaning_compose() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(temp_dir.path(), "bms.csv", RAW_BMS);

    let mut reader = ChunkedReader::open(&path, 3).unwrap();
    assert_eq!(reader.total_rows(), 7);

    let first = clean_chunk(reader.next().unwrap().unwrap().frame).unwrap();
    // Separator row dropped; range checks happen in a later stage
    assert_eq!(first.height(), 2);
}
