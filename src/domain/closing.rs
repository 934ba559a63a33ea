use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::WorkflowError;
use crate::models::{
  Client, ClosingStatus, FiscalClosing, ImportErrorReason, ImportMetadata, ImportType, MovementFlags,
};

/// Prompts shown before a transition is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
  DocsReceived,
  GuidesSent,
  CancelClosing,
  RedoApportionment,
  RedoReview,
  PauseImport,
}

impl Confirmation {
  pub fn prompt(self) -> &'static str {
    match self {
      Confirmation::DocsReceived => "Confirmar recebimento dos documentos?",
      Confirmation::GuidesSent => "As guias foram enviadas ao cliente?",
      Confirmation::CancelClosing => "Cancelar o fechamento?",
      Confirmation::RedoApportionment => "Refazer a apuracao?",
      Confirmation::RedoReview => "Refazer a conferencia?",
      Confirmation::PauseImport => "Pausar/cancelar a importacao?",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportChoice {
  pub import_type: ImportType,
  #[serde(default)]
  pub error_reason: Option<ImportErrorReason>,
  #[serde(default)]
  pub adjustment_details: Option<String>,
}

/// What the user supplied for a forward move. Only the part relevant to the
/// current stage is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvanceInput {
  #[serde(default)]
  pub confirmed: bool,
  #[serde(default)]
  pub import: Option<ImportChoice>,
  #[serde(default)]
  pub movement: Option<MovementFlags>,
}

impl AdvanceInput {
  pub fn confirmed() -> Self {
    Self {
      confirmed: true,
      ..Self::default()
    }
  }

  pub fn import(import_type: ImportType, error_reason: Option<ImportErrorReason>) -> Self {
    Self {
      import: Some(ImportChoice {
        import_type,
        error_reason,
        adjustment_details: None,
      }),
      ..Self::default()
    }
  }

  pub fn movement(entradas: bool, saidas: bool) -> Self {
    Self {
      movement: Some(MovementFlags { entradas, saidas }),
      ..Self::default()
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  Forward,
  Reverse,
}

#[derive(Debug, Clone, PartialEq)]
enum Effect {
  StartImport(DateTime<Utc>),
  RecordImport(ImportMetadata),
  RecordMovement(MovementFlags),
  Complete(DateTime<Utc>),
  ReopenClosing,
  ClearMovement,
  ClearReview,
  PauseImport,
}

/// A validated status move, ready to be applied and written.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
  pub from: ClosingStatus,
  pub to: ClosingStatus,
  pub direction: Direction,
  effect: Effect,
}

impl Transition {
  pub fn apply(&self, record: &mut FiscalClosing) {
    record.status = self.to;
    match &self.effect {
      Effect::StartImport(at) => {
        record.started_at = Some(*at);
      }
      Effect::RecordImport(import) => {
        record.import = Some(import.clone());
      }
      Effect::RecordMovement(flags) => {
        record.movement = Some(*flags);
      }
      Effect::Complete(at) => {
        record.completed_at = Some(*at);
      }
      Effect::ReopenClosing => {
        record.completed_at = None;
      }
      Effect::ClearMovement => {
        record.movement = None;
      }
      Effect::ClearReview => {
        record.started_at = None;
        record.import = None;
      }
      Effect::PauseImport => {
        record.started_at = None;
      }
    }
  }

  pub fn action(&self) -> &'static str {
    match self.direction {
      Direction::Forward => "CLOSING_ADVANCE",
      Direction::Reverse => "CLOSING_RETREAT",
    }
  }
}

/// Validates a forward move. `Ok(None)` means the record is already done.
pub fn plan_advance(
  record: &FiscalClosing,
  input: &AdvanceInput,
  now: DateTime<Utc>,
) -> Result<Option<Transition>, WorkflowError> {
  let Some(to) = record.status.next() else {
    return Ok(None);
  };

  let effect = match record.status {
    ClosingStatus::Pending => {
      if !input.confirmed {
        return Err(WorkflowError::NotConfirmed(Confirmation::DocsReceived.prompt()));
      }
      Effect::StartImport(now)
    }
    ClosingStatus::DocsReceived => {
      let choice = input.import.as_ref().ok_or(WorkflowError::MissingImportChoice)?;
      let error_reason = match choice.import_type {
        ImportType::Automatic => None,
        ImportType::Manual => Some(choice.error_reason.ok_or(WorkflowError::MissingErrorReason)?),
      };
      let adjustment_details = match choice.import_type {
        ImportType::Automatic => None,
        ImportType::Manual => choice
          .adjustment_details
          .as_deref()
          .map(str::trim)
          .filter(|details| !details.is_empty())
          .map(str::to_string),
      };
      Effect::RecordImport(ImportMetadata {
        import_type: choice.import_type,
        error_reason,
        adjustment_details,
      })
    }
    ClosingStatus::Analysis => {
      let flags = input.movement.unwrap_or_default();
      if !flags.any() {
        return Err(WorkflowError::NoMovementSelected);
      }
      Effect::RecordMovement(flags)
    }
    ClosingStatus::TaxesGenerated => {
      if !input.confirmed {
        return Err(WorkflowError::NotConfirmed(Confirmation::GuidesSent.prompt()));
      }
      Effect::Complete(now)
    }
    ClosingStatus::Done => return Ok(None),
  };

  Ok(Some(Transition {
    from: record.status,
    to,
    direction: Direction::Forward,
    effect,
  }))
}

/// Confirmation a reversal out of `status` asks for.
pub fn reverse_confirmation(status: ClosingStatus) -> Option<Confirmation> {
  match status {
    ClosingStatus::Pending => None,
    ClosingStatus::DocsReceived => Some(Confirmation::PauseImport),
    ClosingStatus::Analysis => Some(Confirmation::RedoReview),
    ClosingStatus::TaxesGenerated => Some(Confirmation::RedoApportionment),
    ClosingStatus::Done => Some(Confirmation::CancelClosing),
  }
}

/// Validates a backward move. `Ok(None)` means the record is already pending.
pub fn plan_retreat(record: &FiscalClosing, confirmed: bool) -> Result<Option<Transition>, WorkflowError> {
  let (Some(to), Some(confirmation)) = (record.status.previous(), reverse_confirmation(record.status)) else {
    return Ok(None);
  };
  if !confirmed {
    return Err(WorkflowError::NotConfirmed(confirmation.prompt()));
  }

  let effect = match confirmation {
    Confirmation::CancelClosing => Effect::ReopenClosing,
    Confirmation::RedoApportionment => Effect::ClearMovement,
    Confirmation::RedoReview => Effect::ClearReview,
    _ => Effect::PauseImport,
  };

  Ok(Some(Transition {
    from: record.status,
    to,
    direction: Direction::Reverse,
    effect,
  }))
}

/// Clients without a closing row among `existing`, in client order.
pub fn missing_client_ids(clients: &[Client], existing: &[FiscalClosing]) -> Vec<String> {
  let present: HashSet<&str> = existing.iter().map(|closing| closing.client_id.as_str()).collect();
  let mut seen = HashSet::new();
  clients
    .iter()
    .filter(|client| !present.contains(client.id.as_str()))
    .filter(|client| seen.insert(client.id.as_str()))
    .map(|client| client.id.clone())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::Competence;

  fn record(status: ClosingStatus) -> FiscalClosing {
    let mut closing = FiscalClosing::pending("cli-1", Competence::parse("2026-02").unwrap());
    closing.id = "fc-1".to_string();
    closing.status = status;
    closing
  }

  fn advance(record: &mut FiscalClosing, input: AdvanceInput) {
    let transition = plan_advance(record, &input, Utc::now()).unwrap().unwrap();
    transition.apply(record);
  }

  #[test]
  fn pending_requires_confirmation() {
    let closing = record(ClosingStatus::Pending);
    let err = plan_advance(&closing, &AdvanceInput::default(), Utc::now()).unwrap_err();
    assert!(matches!(err, WorkflowError::NotConfirmed(_)));

    let mut closing = closing;
    advance(&mut closing, AdvanceInput::confirmed());
    assert_eq!(closing.status, ClosingStatus::DocsReceived);
    assert!(closing.started_at.is_some());
  }

  #[test]
  fn manual_import_without_reason_is_blocked() {
    let closing = record(ClosingStatus::DocsReceived);
    let input = AdvanceInput::import(ImportType::Manual, None);
    assert_eq!(
      plan_advance(&closing, &input, Utc::now()),
      Err(WorkflowError::MissingErrorReason)
    );
    assert_eq!(
      plan_advance(&closing, &AdvanceInput::confirmed(), Utc::now()),
      Err(WorkflowError::MissingImportChoice)
    );
  }

  #[test]
  fn manual_import_records_reason() {
    let mut closing = record(ClosingStatus::DocsReceived);
    let mut input = AdvanceInput::import(ImportType::Manual, Some(ImportErrorReason::CfopMismatch));
    if let Some(choice) = input.import.as_mut() {
      choice.adjustment_details = Some("  CFOP 5102 corrigido ".to_string());
    }
    advance(&mut closing, input);
    let import = closing.import.unwrap();
    assert_eq!(import.import_type, ImportType::Manual);
    assert_eq!(import.error_reason, Some(ImportErrorReason::CfopMismatch));
    assert_eq!(import.adjustment_details.as_deref(), Some("CFOP 5102 corrigido"));
  }

  #[test]
  fn automatic_import_drops_reason() {
    let mut closing = record(ClosingStatus::DocsReceived);
    advance(
      &mut closing,
      AdvanceInput::import(ImportType::Automatic, Some(ImportErrorReason::Other)),
    );
    assert_eq!(closing.status, ClosingStatus::Analysis);
    assert_eq!(closing.import.unwrap().error_reason, None);
  }

  #[test]
  fn apportionment_needs_one_flag() {
    let closing = record(ClosingStatus::Analysis);
    assert_eq!(
      plan_advance(&closing, &AdvanceInput::movement(false, false), Utc::now()),
      Err(WorkflowError::NoMovementSelected)
    );
    assert_eq!(
      plan_advance(&closing, &AdvanceInput::default(), Utc::now()),
      Err(WorkflowError::NoMovementSelected)
    );
    let mut closing = closing;
    advance(&mut closing, AdvanceInput::movement(false, true));
    assert_eq!(closing.movement, Some(MovementFlags { entradas: false, saidas: true }));
  }

  #[test]
  fn terminal_states_are_no_ops() {
    assert_eq!(
      plan_advance(&record(ClosingStatus::Done), &AdvanceInput::confirmed(), Utc::now()),
      Ok(None)
    );
    assert_eq!(plan_retreat(&record(ClosingStatus::Pending), true), Ok(None));
  }

  #[test]
  fn reversal_requires_confirmation() {
    let closing = record(ClosingStatus::Done);
    assert_eq!(
      plan_retreat(&closing, false),
      Err(WorkflowError::NotConfirmed(Confirmation::CancelClosing.prompt()))
    );
  }

  #[test]
  fn redo_apportionment_keeps_unrelated_movement_keys() {
    let mut closing = record(ClosingStatus::TaxesGenerated);
    closing.movement = Some(MovementFlags { entradas: true, saidas: true });
    closing
      .extra_movement
      .insert("conferido_por".to_string(), serde_json::Value::from("ana"));
    plan_retreat(&closing, true).unwrap().unwrap().apply(&mut closing);
    assert_eq!(closing.status, ClosingStatus::Analysis);
    assert_eq!(closing.movement, None);
    assert!(closing.extra_movement.contains_key("conferido_por"));
  }

  #[test]
  fn round_trips_restore_status_and_timestamps() {
    for status in ClosingStatus::PIPELINE.into_iter().filter(|s| *s != ClosingStatus::Done) {
      let original = record(status);
      let mut closing = original.clone();
      let input = AdvanceInput {
        confirmed: true,
        import: Some(ImportChoice {
          import_type: ImportType::Automatic,
          error_reason: None,
          adjustment_details: None,
        }),
        movement: Some(MovementFlags { entradas: true, saidas: false }),
      };
      advance(&mut closing, input);
      plan_retreat(&closing, true).unwrap().unwrap().apply(&mut closing);
      assert_eq!(closing.status, original.status);
      assert_eq!(closing.started_at, original.started_at);
      assert_eq!(closing.completed_at, original.completed_at);
    }
  }

  #[test]
  fn missing_clients_is_a_set_difference() {
    let clients: Vec<Client> = ["a", "b", "c", "b"]
      .iter()
      .map(|id| Client {
        id: id.to_string(),
        name: format!("Cliente {id}"),
        trade_name: None,
        document: None,
        regime: None,
      })
      .collect();
    let existing = vec![FiscalClosing {
      client_id: "b".to_string(),
      ..record(ClosingStatus::Analysis)
    }];
    assert_eq!(missing_client_ids(&clients, &existing), vec!["a".to_string(), "c".to_string()]);
  }
}
