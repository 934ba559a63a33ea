use serde::Serialize;
use rust_xlsxwriter::XlsxError;

use crate::domain::WorkflowError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppError {
  pub code: String,
  pub message: String,
}

impl AppError {
  pub fn new(code: &str, message: impl Into<String>) -> Self {
    Self {
      code: code.to_string(),
      message: message.into(),
    }
  }

  pub fn auth_required() -> Self {
    AppError::new("AUTH_REQUIRED", "Sessao expirada ou inexistente")
  }

  pub fn not_found(entity: &str, id: &str) -> Self {
    AppError::new("NOT_FOUND", format!("{entity} {id} nao encontrado"))
  }

  /// Validation failures are raised locally and never reach the data service.
  pub fn is_validation(&self) -> bool {
    self.code.starts_with("VALIDATION_")
  }

  pub fn is_remote(&self) -> bool {
    self.code.starts_with("REMOTE_")
  }
}

impl std::fmt::Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.code, self.message)
  }
}

impl std::error::Error for AppError {}

impl From<WorkflowError> for AppError {
  fn from(err: WorkflowError) -> Self {
    AppError::new(err.code(), err.to_string())
  }
}

impl From<rusqlite::Error> for AppError {
  fn from(err: rusqlite::Error) -> Self {
    AppError::new("REMOTE_ERROR", err.to_string())
  }
}

impl From<reqwest::Error> for AppError {
  fn from(err: reqwest::Error) -> Self {
    match err.status() {
      Some(status) => AppError::new("REMOTE_STATUS", format!("HTTP {status}: {err}")),
      None => AppError::new("REMOTE_ERROR", err.to_string()),
    }
  }
}

impl From<serde_json::Error> for AppError {
  fn from(err: serde_json::Error) -> Self {
    AppError::new("DECODE_ERROR", err.to_string())
  }
}

impl From<std::io::Error> for AppError {
  fn from(err: std::io::Error) -> Self {
    AppError::new("IO_ERROR", err.to_string())
  }
}

impl From<XlsxError> for AppError {
  fn from(err: XlsxError) -> Self {
    AppError::new("EXPORT", err.to_string())
  }
}

impl<T> From<std::sync::PoisonError<T>> for AppError {
  fn from(_: std::sync::PoisonError<T>) -> Self {
    AppError::new("LOCK_ERROR", "Falha ao obter trava interna")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn workflow_errors_are_classified_as_validation() {
    let err: AppError = WorkflowError::MissingErrorReason.into();
    assert_eq!(err.code, "VALIDATION_IMPORT_REASON");
    assert!(err.is_validation());
    assert!(!err.is_remote());
  }

  #[test]
  fn sqlite_errors_are_remote_failures() {
    let err: AppError = rusqlite::Error::QueryReturnedNoRows.into();
    assert!(err.is_remote());
  }
}
