//! Export of processed tables into downloadable files.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde_json::{json, Map, Value};

use super::csv::Table;
use super::ProcessingError;
use crate::models::{DownloadFile, DownloadInfo, ExportFormat, ExportSelection};

/// Records written into the JSON export; the rest are only counted.
pub const JSON_RECORD_LIMIT: usize = 1000;

/// Write every supported format in `selection` into `dir`.
///
/// Formats without a writer add a warning. If nothing supported is left,
/// JSON is written anyway so the session always has a download.
pub fn export_table(
    table: &Table,
    selection: ExportSelection,
    dir: &Path,
    warnings: &mut Vec<String>,
) -> Result<DownloadInfo, ProcessingError> {
    fs::create_dir_all(dir).map_err(|source| ProcessingError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut wants_json = false;
    for format in selection.formats() {
        match format {
            ExportFormat::Json => wants_json = true,
            other => warnings.push(format!(
                "{} export is not available on this server",
                other.as_str().to_uppercase()
            )),
        }
    }
    if !wants_json {
        warnings.push("Falling back to JSON export".to_string());
    }

    let file = write_json(table, dir)?;
    Ok(DownloadInfo::new(vec![file]))
}

fn record(headers: &[String], row: &[String]) -> Value {
    let mut map = Map::new();
    for (header, cell) in headers.iter().zip(row) {
        let value = if cell.is_empty() {
            Value::Null
        } else {
            Value::String(cell.clone())
        };
        map.insert(header.clone(), value);
    }
    Value::Object(map)
}

/// Write the JSON export: metadata, the first records and a summary.
pub fn write_json(table: &Table, dir: &Path) -> Result<DownloadFile, ProcessingError> {
    let now = Utc::now();
    let filename = format!("bibliotecario_export_{}.json", now.format("%Y%m%d_%H%M%S"));
    let path = dir.join(&filename);

    let sample = table.len().min(JSON_RECORD_LIMIT);
    let data: Vec<Value> = table
        .rows
        .iter()
        .take(sample)
        .map(|row| record(&table.headers, row))
        .collect();

    let document = json!({
        "metadata": {
            "export_timestamp": now.to_rfc3339(),
            "total_records": table.len(),
            "columns": table.headers,
            "processing_info": {
                "records_processed": table.len(),
                "cleaned_text_available": table.headers.iter().any(|h| h.contains("cleaned")),
            },
        },
        "data": data,
        "summary": {
            "total_records_in_file": table.len(),
            "records_in_json": sample,
            "note": format!("JSON limited to first {} records for file size management", sample),
        },
    });

    let body = serde_json::to_vec_pretty(&document)
        .map_err(|e| ProcessingError::Export(e.to_string()))?;
    fs::write(&path, &body).map_err(|source| ProcessingError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::debug!("Wrote JSON export {}", path.display());
    Ok(DownloadFile {
        format: ExportFormat::Json.as_str().to_uppercase(),
        filename,
        size_bytes: body.len() as u64,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::csv::parse_rows;

    fn table(rows: usize) -> Table {
        let mut text = String::from("id,obs\n");
        for i in 0..rows {
            text.push_str(&format!("{},text {}\n", i, i));
        }
        text.push_str("x,\n");
        Table::from_rows(parse_rows(&text, ',')).unwrap()
    }

    #[test]
    fn test_json_export_limits_records() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(1200);
        let file = write_json(&table, dir.path()).unwrap();

        assert_eq!(file.format, "JSON");
        assert!(file.filename.starts_with("bibliotecario_export_"));
        assert_eq!(file.size_bytes, std::fs::metadata(&file.path).unwrap().len());

        let value: Value = serde_json::from_slice(&std::fs::read(&file.path).unwrap()).unwrap();
        assert_eq!(value["data"].as_array().unwrap().len(), JSON_RECORD_LIMIT);
        assert_eq!(value["metadata"]["total_records"], 1201);
        assert_eq!(value["summary"]["records_in_json"], 1000);
    }

    #[test]
    fn test_empty_cells_become_null() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_json(&table(0), dir.path()).unwrap();
        let value: Value = serde_json::from_slice(&std::fs::read(&file.path).unwrap()).unwrap();
        assert_eq!(value["data"][0]["id"], "x");
        assert!(value["data"][0]["obs"].is_null());
    }

    #[test]
    fn test_unsupported_formats_warn() {
        let dir = tempfile::tempdir().unwrap();
        let mut warnings = Vec::new();
        let info = export_table(&table(2), ExportSelection::All, dir.path(), &mut warnings).unwrap();
        assert_eq!(info.total_files, 1);
        assert!(info.find("json").is_some());
        assert_eq!(warnings.len(), 2);

        let mut warnings = Vec::new();
        export_table(&table(2), ExportSelection::Csv, dir.path(), &mut warnings).unwrap();
        assert!(warnings.iter().any(|w| w.contains("Falling back")));
    }
}
