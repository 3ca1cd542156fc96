use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::align::RawTable;
use crate::pipeline::PipelineOutput;

/// Reads a headed CSV file into an untyped table named after the file stem.
pub fn read_table(path: &Path) -> anyhow::Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header row of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let table = RawTable::new(name, headers, rows);
    if table.is_empty() {
        warn!(table = table.name(), "csv file has a header row but no data");
    }
    Ok(table)
}

#[derive(Serialize)]
struct OutputBundle<'a> {
    run_id: Uuid,
    #[serde(flatten)]
    output: &'a PipelineOutput,
}

pub fn write_json(path: &Path, run_id: Uuid, output: &PipelineOutput) -> anyhow::Result<()> {
    let bundle = OutputBundle { run_id, output };
    let json = serde_json::to_string_pretty(&bundle).context("failed to serialize forecast")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
