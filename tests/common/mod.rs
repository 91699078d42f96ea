//! Common test utilities shared across integration tests.

use fleetops::TaskError;
use std::io::Write;
use tempfile::NamedTempFile;

/// Error messages in the order they were reported.
pub fn messages(errors: &[TaskError]) -> Vec<String> {
    errors.iter().map(|e| e.to_string()).collect()
}

/// Write a plan to a temporary YAML file.
///
/// The file is deleted when the returned handle is dropped.
pub fn write_plan(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
