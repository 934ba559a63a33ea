use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::AppError;
use crate::export::{csv, excel, ReportFormat};
use crate::reports::DailyReport;

pub fn render(report: &DailyReport, format: ReportFormat) -> Result<Vec<u8>, AppError> {
  match format {
    ReportFormat::Xlsx => excel::render_daily_report(report),
    ReportFormat::Csv => Ok(csv::render_daily_report(report)?.into_bytes()),
    ReportFormat::Json => Ok(serde_json::to_vec_pretty(report)?),
  }
}

/// Writes `bytes` under `dir` with a name that does not clash with an
/// earlier preview.
pub fn write_preview(dir: &Path, stem: &str, extension: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
  fs::create_dir_all(dir)?;
  let mut candidate = dir.join(format!("{stem}.{extension}"));
  let mut counter = 1;
  while candidate.exists() {
    candidate = dir.join(format!("{stem}_{counter}.{extension}"));
    counter += 1;
  }
  fs::write(&candidate, bytes)?;
  Ok(candidate)
}

/// Renders the report into the OS temp dir and hands it to the system viewer.
pub fn preview(report: &DailyReport, format: ReportFormat) -> Result<PathBuf, AppError> {
  let bytes = render(report, format)?;
  let stem = format!("relatorio_{}", report.day.format("%Y%m%d"));
  let path = write_preview(&std::env::temp_dir(), &stem, format.extension(), &bytes)?;
  open::that(&path).map_err(|err| AppError::new("PREVIEW_OPEN", err.to_string()))?;
  info!(path = %path.display(), "report opened for preview");
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn previews_never_overwrite_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_preview(dir.path(), "relatorio_20260305", "csv", b"a").unwrap();
    let second = write_preview(dir.path(), "relatorio_20260305", "csv", b"b").unwrap();
    assert_ne!(first, second);
    assert!(second.ends_with("relatorio_20260305_1.csv"));
    assert_eq!(fs::read(&first).unwrap(), b"a");
  }
}
