//! Basic processing integration tests

use super::{battery_csv, gps_csv, write_file};
use crate::config::{PreprocessConfig, ProcessingMode};
use crate::error::PreprocessError;
use crate::models::{Category, FileOutcome};
use crate::processor::Preprocessor;
use std::fs;
use tempfile::TempDir;

fn quiet_config() -> PreprocessConfig {
    PreprocessConfig::default()
        .without_progress()
        .with_batch_size(10)
}

#[tokio::test]
async fn test_basic_processing_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    let output = temp_dir.path().join("output");
    write_file(&input, "bms/EV6/device_01.csv", &battery_csv("00123", 25));
    write_file(&input, "gps/EV6/device_01.csv", &gps_csv("00123", 5));

    let processor = Preprocessor::new(input, output.clone())
        .unwrap()
        .with_config(quiet_config());
    let summary = processor.process().await.unwrap();

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.rows_written(), 30);
    assert_eq!(summary.output_path, output);

    let battery = fs::read_to_string(output.join("bms/EV6/device_01.csv")).unwrap();
    let mut lines = battery.lines();
    assert_eq!(lines.next(), Some("device_no,msg_time,soc,pack_volt"));
    assert!(lines.next().unwrap().starts_with("00123,2023-06-15 10:00:00,"));
    assert_eq!(battery.lines().count(), 26);

    let gps = fs::read_to_string(output.join("gps/EV6/device_01.csv")).unwrap();
    assert_eq!(
        gps.lines().next(),
        Some("device_no,time,lat,lng,sat_ids_1,sat_ids_2,sat_ids_3")
    );

    assert!(output.join("processing_checkpoint.json").exists());
}

#[tokio::test]
async fn test_sequential_and_parallel_agree() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    for i in 0..4 {
        write_file(
            &input,
            &format!("bms/EV6/device_{i:02}.csv"),
            &battery_csv(&format!("{i:05}"), 15 + i),
        );
    }

    let sequential_out = temp_dir.path().join("sequential");
    Preprocessor::new(input.clone(), sequential_out.clone())
        .unwrap()
        .with_config(quiet_config().sequential())
        .process()
        .await
        .unwrap();

    let parallel_out = temp_dir.path().join("parallel");
    Preprocessor::new(input, parallel_out.clone())
        .unwrap()
        .with_config(quiet_config().with_workers(3))
        .process()
        .await
        .unwrap();

    for i in 0..4 {
        let relative = format!("bms/EV6/device_{i:02}.csv");
        assert_eq!(
            fs::read_to_string(sequential_out.join(&relative)).unwrap(),
            fs::read_to_string(parallel_out.join(&relative)).unwrap()
        );
    }
}

#[tokio::test]
async fn test_whole_file_and_streaming_agree_without_cross_chunk_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_file(&input, "bms/device_01.csv", &battery_csv("00123", 42));

    let whole = temp_dir.path().join("whole");
    Preprocessor::new(input.clone(), whole.clone())
        .unwrap()
        .with_config(quiet_config().with_mode(ProcessingMode::WholeFile))
        .process()
        .await
        .unwrap();

    let streamed = temp_dir.path().join("streamed");
    Preprocessor::new(input, streamed.clone())
        .unwrap()
        .with_config(quiet_config().with_mode(ProcessingMode::Streaming))
        .process()
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(whole.join("bms/device_01.csv")).unwrap(),
        fs::read_to_string(streamed.join("bms/device_01.csv")).unwrap()
    );
}

#[tokio::test]
async fn test_whole_file_removes_duplicates_across_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    // Rows 0 and 10 are identical and land in different chunks
    let mut contents = battery_csv("00123", 10);
    contents.push_str("00123,23-06-15 10:00:00,0,600\n");
    write_file(&input, "bms/device_01.csv", &contents);

    let output = temp_dir.path().join("output");
    let summary = Preprocessor::new(input, output)
        .unwrap()
        .with_config(quiet_config().with_mode(ProcessingMode::WholeFile))
        .process()
        .await
        .unwrap();
    assert_eq!(summary.rows_written(), 10);
}

#[tokio::test]
async fn test_uncategorized_and_empty_files_are_reported() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_file(&input, "misc/weather.csv", "temp,humidity\n20,50\n");
    write_file(&input, "bms/empty.csv", "device_no,soc\n");

    let output = temp_dir.path().join("output");
    let summary = Preprocessor::new(input, output.clone())
        .unwrap()
        .with_config(quiet_config())
        .process()
        .await
        .unwrap();

    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.skipped(), 2);
    let weather = summary
        .reports
        .iter()
        .find(|r| r.path.ends_with("weather.csv"))
        .unwrap();
    assert_eq!(weather.outcome, FileOutcome::Uncategorized);
    let empty = summary
        .reports
        .iter()
        .find(|r| r.path.ends_with("empty.csv"))
        .unwrap();
    assert_eq!(empty.category, Some(Category::Battery));
    assert_eq!(empty.outcome, FileOutcome::Empty);
    assert!(!output.join("bms/empty.csv").exists());
}

#[tokio::test]
async fn test_missing_input_directory_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let result = Preprocessor::new(
        temp_dir.path().join("missing"),
        temp_dir.path().join("output"),
    );
    match result {
        Err(e @ PreprocessError::InputNotFound { .. }) => assert!(e.is_fatal()),
        Err(other) => panic!("Expected InputNotFound, got {:?}", other),
        Ok(_) => panic!("Expected InputNotFound"),
    }
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    fs::create_dir_all(&input).unwrap();

    let result = Preprocessor::new(input, temp_dir.path().join("output"))
        .unwrap()
        .with_config(quiet_config().with_batch_size(0))
        .process()
        .await;
    assert!(matches!(result, Err(PreprocessError::Configuration { .. })));
}
