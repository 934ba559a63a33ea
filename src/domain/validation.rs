use chrono::NaiveDate;
use thiserror::Error;

/// Failures detected locally, before anything is sent to the data service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
  #[error("Confirmacao necessaria: {0}")]
  NotConfirmed(&'static str),
  #[error("Escolha o tipo de importacao")]
  MissingImportChoice,
  #[error("Importacao manual exige um motivo")]
  MissingErrorReason,
  #[error("Marque entradas e/ou saidas")]
  NoMovementSelected,
  #[error("Checklist incompleto: {pending} item(ns) pendente(s)")]
  ChecklistIncomplete { pending: usize },
  #[error("Campo obrigatorio: {0}")]
  EmptyField(&'static str),
  #[error("Data invalida: {0}")]
  InvalidDate(String),
  #[error("Competencia invalida: {0}")]
  InvalidCompetence(String),
  #[error("Valor invalido para {field}: {value}")]
  UnknownValue { field: &'static str, value: String },
  #[error("Item {index} nao existe no checklist")]
  ChecklistIndex { index: usize },
}

impl WorkflowError {
  pub fn code(&self) -> &'static str {
    match self {
      WorkflowError::NotConfirmed(_) => "VALIDATION_NOT_CONFIRMED",
      WorkflowError::MissingImportChoice => "VALIDATION_IMPORT_TYPE",
      WorkflowError::MissingErrorReason => "VALIDATION_IMPORT_REASON",
      WorkflowError::NoMovementSelected => "VALIDATION_MOVEMENT",
      WorkflowError::ChecklistIncomplete { .. } => "VALIDATION_CHECKLIST",
      WorkflowError::EmptyField(_) => "VALIDATION_REQUIRED",
      WorkflowError::InvalidDate(_) => "VALIDATION_DATE",
      WorkflowError::InvalidCompetence(_) => "VALIDATION_COMPETENCE",
      WorkflowError::UnknownValue { .. } => "VALIDATION_VALUE",
      WorkflowError::ChecklistIndex { .. } => "VALIDATION_CHECKLIST_INDEX",
    }
  }
}

pub fn parse_date(date: &str) -> Result<NaiveDate, WorkflowError> {
  NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
    .map_err(|_| WorkflowError::InvalidDate(date.to_string()))
}

pub fn ensure_not_empty(field: &'static str, value: &str) -> Result<(), WorkflowError> {
  if value.trim().is_empty() {
    Err(WorkflowError::EmptyField(field))
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_date_requires_iso_format() {
    assert!(parse_date("2026-02-10").is_ok());
    assert_eq!(
      parse_date("10/02/2026"),
      Err(WorkflowError::InvalidDate("10/02/2026".to_string()))
    );
  }

  #[test]
  fn blank_values_are_rejected() {
    assert_eq!(ensure_not_empty("title", "  "), Err(WorkflowError::EmptyField("title")));
    assert!(ensure_not_empty("title", "DCTF").is_ok());
  }
}
