pub mod csv;
pub mod excel;

use serde::Deserialize;

/// Output formats of the daily report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
  #[default]
  Json,
  Xlsx,
  Csv,
}

impl ReportFormat {
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "" | "json" => Some(ReportFormat::Json),
      "xlsx" => Some(ReportFormat::Xlsx),
      "csv" => Some(ReportFormat::Csv),
      _ => None,
    }
  }

  pub fn content_type(self) -> &'static str {
    match self {
      ReportFormat::Json => "application/json",
      ReportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
      ReportFormat::Csv => "text/csv; charset=utf-8",
    }
  }

  pub fn extension(self) -> &'static str {
    match self {
      ReportFormat::Json => "json",
      ReportFormat::Xlsx => "xlsx",
      ReportFormat::Csv => "csv",
    }
  }
}
