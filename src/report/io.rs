//! Report file I/O: atomic write and validated read.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::errors::{AsrhError, Result};
use crate::report::ExperimentReport;

/// Pretty-print `report` to `path` via a temp file and rename.
pub fn write_report(path: &Path, report: &ExperimentReport) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| AsrhError::io(parent, source))?;
    }
    let mut data = serde_json::to_string_pretty(report)?;
    data.push('\n');
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, data).map_err(|source| AsrhError::io(&tmp_path, source))?;
    fs::rename(&tmp_path, path).map_err(|source| AsrhError::io(path, source))?;
    Ok(())
}

/// Load a report, rejecting flags that are not JSON booleans.
pub fn read_report(path: &Path) -> Result<ExperimentReport> {
    let raw = fs::read_to_string(path).map_err(|source| AsrhError::io(path, source))?;
    parse_report(&raw)
}

pub fn parse_report(raw: &str) -> Result<ExperimentReport> {
    let value: Value = serde_json::from_str(raw)?;
    check_boolean_flags(&value)?;
    serde_json::from_value(value).map_err(|e| AsrhError::ReportShape {
        field: "report".to_string(),
        details: e.to_string(),
    })
}

/// Every `compliant` and `acceptable_performance` flag must be a native bool.
fn check_boolean_flags(value: &Value) -> Result<()> {
    check_section_flag(value, "asr_compliance", "compliant")?;
    check_section_flag(value, "load_analysis", "acceptable_performance")?;
    if let Some(load) = value
        .get("test_results")
        .and_then(|results| results.get("concurrent_load_test"))
        .and_then(Value::as_object)
    {
        for (level, result) in load {
            check_flag(
                result,
                "acceptable_performance",
                &format!("test_results.concurrent_load_test.{level}"),
            )?;
        }
    }
    Ok(())
}

fn check_section_flag(value: &Value, section: &str, flag: &str) -> Result<()> {
    if let Some(entries) = value.get(section).and_then(Value::as_object) {
        for (key, entry) in entries {
            check_flag(entry, flag, &format!("{section}.{key}"))?;
        }
    }
    Ok(())
}

fn check_flag(entry: &Value, flag: &str, location: &str) -> Result<()> {
    match entry.get(flag) {
        None | Some(Value::Bool(_)) => Ok(()),
        Some(other) => Err(AsrhError::ReportShape {
            field: format!("{location}.{flag}"),
            details: format!("expected a JSON boolean, found {other}"),
        }),
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
