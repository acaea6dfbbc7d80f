//! Parse functions - normalize spreadsheet bytes and live-API payloads into
//! `ReportRow`s.
//!
//! Both source shapes funnel into the same row type: a spreadsheet's first
//! sheet with a header row, or a reporting-API JSON response that arrives
//! either as an array of objects or as a parallel fields/positional-rows
//! structure.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::Value;
use std::io::Cursor;
use tracing::{info, warn};

use crate::pipeline::error::PipelineError;
use crate::pipeline::types::ReportRow;

/// Parse an uploaded/emailed report into rows. CSV attachments are dispatched
/// on the filename extension; everything else goes through the workbook
/// reader. The first row is always treated as column headers.
pub fn parse_report(bytes: &[u8], filename: &str) -> Result<Vec<ReportRow>, PipelineError> {
    if filename.to_lowercase().ends_with(".csv") {
        parse_csv(bytes)
    } else {
        parse_workbook(bytes)
    }
}

/// Parse the first sheet of an XLSX/XLS workbook. Empty cells become empty
/// strings so downstream numeric reads default to zero instead of hitting a
/// missing-value sentinel.
fn parse_workbook(bytes: &[u8]) -> Result<Vec<ReportRow>, PipelineError> {
    info!("Parsing report workbook ({} bytes)", bytes.len());

    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| PipelineError::SourceUnavailable(format!("unreadable workbook: {e}")))?;

    let sheet_names = workbook.sheet_names();
    let sheet_name = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| PipelineError::SourceUnavailable("no sheets in workbook".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| PipelineError::SourceUnavailable(format!("unreadable sheet: {e}")))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for row in rows_iter {
        let pairs = headers.iter().enumerate().filter_map(|(idx, header)| {
            if header.trim().is_empty() {
                return None; // unnamed column, nothing to key by
            }
            let cell = row.get(idx).map(cell_to_string).unwrap_or_default();
            Some((header.as_str(), cell))
        });

        let report_row = ReportRow::from_pairs(pairs);
        if !report_row.is_blank() {
            rows.push(report_row);
        }
    }

    info!("Parsed {} rows from sheet {}", rows.len(), sheet_name);
    Ok(rows)
}

/// Parse a CSV attachment with the same header-normalization rules as the
/// workbook path.
fn parse_csv(bytes: &[u8]) -> Result<Vec<ReportRow>, PipelineError> {
    info!("Parsing report CSV ({} bytes)", bytes.len());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::SourceUnavailable(format!("unreadable csv: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed CSV record {}: {}", idx, e);
                continue;
            }
        };

        let pairs = headers.iter().enumerate().filter_map(|(col, header)| {
            if header.trim().is_empty() {
                return None;
            }
            let cell = record.get(col).unwrap_or("").to_string();
            Some((header.as_str(), cell))
        });

        let report_row = ReportRow::from_pairs(pairs);
        if !report_row.is_blank() {
            rows.push(report_row);
        }
    }

    info!("Parsed {} rows from CSV", rows.len());
    Ok(rows)
}

/// Reconstitute a live reporting-API payload into rows.
///
/// Accepted shapes:
/// - a JSON array of row objects, possibly under a `data` key
/// - `{"fields": ["Technician", ...], "data": [["Austin Brown", ...], ...]}`
///   where each row is a positional array matched up with `fields`
pub fn rows_from_api_json(payload: &Value) -> Vec<ReportRow> {
    // Positional form: fields + rows-as-arrays
    if let (Some(fields), Some(data)) = (
        payload.get("fields").and_then(Value::as_array),
        payload.get("data").and_then(Value::as_array),
    ) {
        let headers: Vec<String> = fields.iter().map(json_to_string).collect();

        return data
            .iter()
            .filter_map(Value::as_array)
            .map(|row| {
                let pairs = headers.iter().enumerate().filter_map(|(idx, header)| {
                    if header.trim().is_empty() {
                        return None;
                    }
                    let cell = row.get(idx).map(json_to_string).unwrap_or_default();
                    Some((header.as_str(), cell))
                });
                ReportRow::from_pairs(pairs)
            })
            .filter(|row| !row.is_blank())
            .collect();
    }

    // Object form: array of named-field objects, bare or under "data"
    let objects = payload
        .as_array()
        .or_else(|| payload.get("data").and_then(Value::as_array));

    let Some(objects) = objects else {
        return Vec::new();
    };

    objects
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            ReportRow::from_pairs(obj.iter().map(|(key, value)| (key, json_to_string(value))))
        })
        .filter(|row| !row.is_blank())
        .collect()
}

/// Flatten a workbook cell to text. Whole floats print without a trailing
/// ".0" so they round-trip like the spreadsheet displayed them.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
