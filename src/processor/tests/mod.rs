//! Integration tests for the processor module
//!
//! Tests the complete pipeline over small telemetry trees built in temp dirs.

pub mod basic_processing;

use std::fs;
use std::path::{Path, PathBuf};

/// Write a file under `root`, creating parent directories
pub fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

/// Battery CSV with `rows` distinct rows
pub fn battery_csv(device: &str, rows: usize) -> String {
    let mut contents = String::from("device_no,msg_time,soc,pack_volt\n");
    for i in 0..rows {
        contents.push_str(&format!(
            "{},23-06-15 {:02}:{:02}:00,{},{}\n",
            device,
            10 + i / 60,
            i % 60,
            i % 100,
            600 + i
        ));
    }
    contents
}

/// GPS CSV whose `sat_ids` column holds pipe-separated lists
pub fn gps_csv(device: &str, rows: usize) -> String {
    let mut contents = String::from("device_no,time,lat,lng,sat_ids\n");
    for i in 0..rows {
        contents.push_str(&format!(
            "{},2023-06-15 10:{:02}:00,37.5,127.0,{}|{}|{}\n",
            device,
            i % 60,
            i,
            i + 1,
            i + 2
        ));
    }
    contents
}
