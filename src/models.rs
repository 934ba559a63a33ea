use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::WorkflowError;

/// Calendar month a fiscal record applies to, stored as its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Competence(NaiveDate);

impl Competence {
  pub fn new(year: i32, month: u32) -> Result<Self, WorkflowError> {
    NaiveDate::from_ymd_opt(year, month, 1)
      .map(Competence)
      .ok_or_else(|| WorkflowError::InvalidCompetence(format!("{year}-{month:02}")))
  }

  /// Accepts `YYYY-MM` or any `YYYY-MM-DD` inside the month.
  pub fn parse(value: &str) -> Result<Self, WorkflowError> {
    let trimmed = value.trim();
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
      .or_else(|_| NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d"))
      .map_err(|_| WorkflowError::InvalidCompetence(trimmed.to_string()))?;
    Ok(Self::containing(date))
  }

  pub fn containing(date: NaiveDate) -> Self {
    Competence(date.with_day(1).unwrap_or(date))
  }

  pub fn first_day(&self) -> NaiveDate {
    self.0
  }

  pub fn last_day(&self) -> NaiveDate {
    self.next().first_day().pred_opt().unwrap_or(self.0)
  }

  pub fn previous(&self) -> Self {
    Competence(self.0.checked_sub_months(Months::new(1)).unwrap_or(self.0))
  }

  pub fn next(&self) -> Self {
    Competence(self.0.checked_add_months(Months::new(1)).unwrap_or(self.0))
  }

  pub fn label(&self) -> String {
    format!("{:04}-{:02}", self.0.year(), self.0.month())
  }
}

impl std::fmt::Display for Competence {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.label())
  }
}

impl TryFrom<String> for Competence {
  type Error = WorkflowError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Competence::parse(&value)
  }
}

impl From<Competence> for String {
  fn from(value: Competence) -> Self {
    value.0.format("%Y-%m-%d").to_string()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
  SimplesNacional,
  LucroPresumido,
  LucroReal,
  Mei,
  #[serde(other)]
  Other,
}

impl TaxRegime {
  pub fn label(self) -> &'static str {
    match self {
      TaxRegime::SimplesNacional => "Simples Nacional",
      TaxRegime::LucroPresumido => "Lucro Presumido",
      TaxRegime::LucroReal => "Lucro Real",
      TaxRegime::Mei => "MEI",
      TaxRegime::Other => "Outro",
    }
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Client {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub trade_name: Option<String>,
  #[serde(default)]
  pub document: Option<String>,
  #[serde(default)]
  pub regime: Option<TaxRegime>,
}

impl Client {
  pub fn display_name(&self) -> &str {
    match self.trade_name.as_deref() {
      Some(name) if !name.trim().is_empty() => name,
      _ => &self.name,
    }
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub color: Option<String>,
}

/// Standard template a task can be created from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskCategory {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub category_id: Option<String>,
  #[serde(default)]
  pub default_checklist: Vec<String>,
  #[serde(default)]
  pub estimated_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
  DoFirst,
  Schedule,
  Delegate,
  Eliminate,
}

impl Quadrant {
  pub const ALL: [Quadrant; 4] = [
    Quadrant::DoFirst,
    Quadrant::Schedule,
    Quadrant::Delegate,
    Quadrant::Eliminate,
  ];

  pub fn from_flags(urgent: bool, important: bool) -> Self {
    match (urgent, important) {
      (true, true) => Quadrant::DoFirst,
      (false, true) => Quadrant::Schedule,
      (true, false) => Quadrant::Delegate,
      (false, false) => Quadrant::Eliminate,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Quadrant::DoFirst => "Fazer agora",
      Quadrant::Schedule => "Agendar",
      Quadrant::Delegate => "Delegar",
      Quadrant::Eliminate => "Eliminar",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  InProgress,
  Done,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChecklistItem {
  pub text: String,
  #[serde(default)]
  pub done: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub client_id: Option<String>,
  #[serde(default)]
  pub category_id: Option<String>,
  pub quadrant: Quadrant,
  pub status: TaskStatus,
  #[serde(default)]
  pub due_date: Option<NaiveDate>,
  #[serde(default)]
  pub checklist: Vec<ChecklistItem>,
  #[serde(default)]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_paused: bool,
  #[serde(default)]
  pub last_paused_at: Option<DateTime<Utc>>,
  /// Accumulated paused time in milliseconds.
  #[serde(default)]
  pub total_pause: i64,
  #[serde(default)]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

impl Task {
  pub fn new(title: impl Into<String>, quadrant: Quadrant) -> Self {
    Self {
      id: String::new(),
      title: title.into(),
      description: None,
      client_id: None,
      category_id: None,
      quadrant,
      status: TaskStatus::Pending,
      due_date: None,
      checklist: Vec::new(),
      started_at: None,
      is_paused: false,
      last_paused_at: None,
      total_pause: 0,
      completed_at: None,
      created_at: None,
    }
  }

  pub fn is_done(&self) -> bool {
    self.status == TaskStatus::Done
  }

  pub fn pending_checklist_items(&self) -> usize {
    self.checklist.iter().filter(|item| !item.done).count()
  }

  /// Columns written by the timer operations.
  pub fn timer_patch(&self) -> Value {
    serde_json::json!({
      "status": self.status,
      "started_at": self.started_at,
      "is_paused": self.is_paused,
      "last_paused_at": self.last_paused_at,
      "total_pause": self.total_pause,
      "completed_at": self.completed_at,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingStatus {
  Pending,
  DocsReceived,
  Analysis,
  TaxesGenerated,
  Done,
}

impl ClosingStatus {
  pub const PIPELINE: [ClosingStatus; 5] = [
    ClosingStatus::Pending,
    ClosingStatus::DocsReceived,
    ClosingStatus::Analysis,
    ClosingStatus::TaxesGenerated,
    ClosingStatus::Done,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ClosingStatus::Pending => "pending",
      ClosingStatus::DocsReceived => "docs_received",
      ClosingStatus::Analysis => "analysis",
      ClosingStatus::TaxesGenerated => "taxes_generated",
      ClosingStatus::Done => "done",
    }
  }

  pub fn parse(value: &str) -> Result<Self, WorkflowError> {
    Self::PIPELINE
      .into_iter()
      .find(|status| status.as_str() == value.trim())
      .ok_or_else(|| WorkflowError::UnknownValue {
        field: "status",
        value: value.to_string(),
      })
  }

  pub fn label(self) -> &'static str {
    match self {
      ClosingStatus::Pending => "Pendente",
      ClosingStatus::DocsReceived => "Documentos recebidos",
      ClosingStatus::Analysis => "Em analise",
      ClosingStatus::TaxesGenerated => "Impostos gerados",
      ClosingStatus::Done => "Concluido",
    }
  }

  fn position(self) -> usize {
    Self::PIPELINE
      .iter()
      .position(|status| *status == self)
      .unwrap_or(0)
  }

  pub fn next(self) -> Option<Self> {
    Self::PIPELINE.get(self.position() + 1).copied()
  }

  pub fn previous(self) -> Option<Self> {
    self.position().checked_sub(1).map(|idx| Self::PIPELINE[idx])
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
  Automatic,
  Manual,
}

impl ImportType {
  pub fn as_str(self) -> &'static str {
    match self {
      ImportType::Automatic => "automatic",
      ImportType::Manual => "manual",
    }
  }

  pub fn parse(value: &str) -> Result<Self, WorkflowError> {
    match value.trim() {
      "automatic" => Ok(ImportType::Automatic),
      "manual" => Ok(ImportType::Manual),
      other => Err(WorkflowError::UnknownValue {
        field: "import_type",
        value: other.to_string(),
      }),
    }
  }
}

/// Why an import had to be done by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorReason {
  MissingXmlFiles,
  CfopMismatch,
  NcmMismatch,
  DuplicateDocuments,
  CancelledDocumentsImported,
  WrongTaxRegime,
  UnregisteredSupplier,
  Other,
}

impl ImportErrorReason {
  pub const ALL: [ImportErrorReason; 8] = [
    ImportErrorReason::MissingXmlFiles,
    ImportErrorReason::CfopMismatch,
    ImportErrorReason::NcmMismatch,
    ImportErrorReason::DuplicateDocuments,
    ImportErrorReason::CancelledDocumentsImported,
    ImportErrorReason::WrongTaxRegime,
    ImportErrorReason::UnregisteredSupplier,
    ImportErrorReason::Other,
  ];

  pub fn code(self) -> &'static str {
    match self {
      ImportErrorReason::MissingXmlFiles => "missing_xml_files",
      ImportErrorReason::CfopMismatch => "cfop_mismatch",
      ImportErrorReason::NcmMismatch => "ncm_mismatch",
      ImportErrorReason::DuplicateDocuments => "duplicate_documents",
      ImportErrorReason::CancelledDocumentsImported => "cancelled_documents_imported",
      ImportErrorReason::WrongTaxRegime => "wrong_tax_regime",
      ImportErrorReason::UnregisteredSupplier => "unregistered_supplier",
      ImportErrorReason::Other => "other",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      ImportErrorReason::MissingXmlFiles => "XMLs ausentes",
      ImportErrorReason::CfopMismatch => "CFOP divergente",
      ImportErrorReason::NcmMismatch => "NCM divergente",
      ImportErrorReason::DuplicateDocuments => "Notas duplicadas",
      ImportErrorReason::CancelledDocumentsImported => "Notas canceladas importadas",
      ImportErrorReason::WrongTaxRegime => "Regime tributario incorreto",
      ImportErrorReason::UnregisteredSupplier => "Fornecedor sem cadastro",
      ImportErrorReason::Other => "Outro",
    }
  }

  /// Unknown free text stored by older rows is kept as `Other`.
  pub fn from_code(value: &str) -> Self {
    Self::ALL
      .into_iter()
      .find(|reason| reason.code() == value.trim())
      .unwrap_or(ImportErrorReason::Other)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMetadata {
  pub import_type: ImportType,
  pub error_reason: Option<ImportErrorReason>,
  pub adjustment_details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementFlags {
  #[serde(default)]
  pub entradas: bool,
  #[serde(default)]
  pub saidas: bool,
}

impl MovementFlags {
  pub fn any(&self) -> bool {
    self.entradas || self.saidas
  }
}

/// One closing per client per competence.
///
/// Stage metadata is typed: `import` exists from `analysis` onward and
/// `movement` from `taxes_generated` onward. On the wire they are spread over
/// the `import_*` columns and the `movement_data` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FiscalClosingRow", into = "FiscalClosingRow")]
pub struct FiscalClosing {
  pub id: String,
  pub client_id: String,
  pub competence: Competence,
  pub status: ClosingStatus,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub import: Option<ImportMetadata>,
  pub movement: Option<MovementFlags>,
  /// Keys of `movement_data` this application does not model.
  pub extra_movement: Map<String, Value>,
}

impl FiscalClosing {
  pub fn pending(client_id: impl Into<String>, competence: Competence) -> Self {
    Self {
      id: String::new(),
      client_id: client_id.into(),
      competence,
      status: ClosingStatus::Pending,
      started_at: None,
      completed_at: None,
      import: None,
      movement: None,
      extra_movement: Map::new(),
    }
  }

  pub fn import_type(&self) -> Option<ImportType> {
    self.import.as_ref().map(|import| import.import_type)
  }

  /// Every column a status transition may touch.
  pub fn transition_patch(&self) -> Value {
    let row = FiscalClosingRow::from(self.clone());
    serde_json::json!({
      "status": row.status,
      "started_at": row.started_at,
      "completed_at": row.completed_at,
      "import_type": row.import_type,
      "import_error_details": row.import_error_details,
      "import_adjustment_details": row.import_adjustment_details,
      "movement_data": row.movement_data,
    })
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FiscalClosingRow {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  id: String,
  client_id: String,
  competence: Competence,
  status: ClosingStatus,
  #[serde(default)]
  started_at: Option<DateTime<Utc>>,
  #[serde(default)]
  completed_at: Option<DateTime<Utc>>,
  #[serde(default)]
  import_type: Option<ImportType>,
  #[serde(default)]
  import_error_details: Option<String>,
  #[serde(default)]
  import_adjustment_details: Option<String>,
  #[serde(default)]
  movement_data: Option<Value>,
}

const MOVEMENT_KEYS: [&str; 3] = ["import_type", "entradas", "saidas"];

impl From<FiscalClosingRow> for FiscalClosing {
  fn from(row: FiscalClosingRow) -> Self {
    let bag = match row.movement_data {
      Some(Value::Object(map)) => map,
      _ => Map::new(),
    };

    let import = row.import_type.map(|import_type| ImportMetadata {
      import_type,
      error_reason: match import_type {
        ImportType::Manual => row
          .import_error_details
          .as_deref()
          .filter(|value| !value.trim().is_empty())
          .map(ImportErrorReason::from_code),
        ImportType::Automatic => None,
      },
      adjustment_details: row.import_adjustment_details.clone(),
    });

    let movement = if bag.contains_key("entradas") || bag.contains_key("saidas") {
      Some(MovementFlags {
        entradas: bag.get("entradas").and_then(Value::as_bool).unwrap_or(false),
        saidas: bag.get("saidas").and_then(Value::as_bool).unwrap_or(false),
      })
    } else {
      None
    };

    let extra_movement = bag
      .into_iter()
      .filter(|(key, _)| !MOVEMENT_KEYS.contains(&key.as_str()))
      .collect();

    FiscalClosing {
      id: row.id,
      client_id: row.client_id,
      competence: row.competence,
      status: row.status,
      started_at: row.started_at,
      completed_at: row.completed_at,
      import,
      movement,
      extra_movement,
    }
  }
}

impl From<FiscalClosing> for FiscalClosingRow {
  fn from(closing: FiscalClosing) -> Self {
    let mut bag = closing.extra_movement;
    if let Some(import) = &closing.import {
      bag.insert("import_type".to_string(), Value::from(import.import_type.as_str()));
    }
    if let Some(movement) = closing.movement {
      bag.insert("entradas".to_string(), Value::Bool(movement.entradas));
      bag.insert("saidas".to_string(), Value::Bool(movement.saidas));
    }

    let (import_type, import_error_details, import_adjustment_details) = match closing.import {
      Some(import) => {
        let manual = import.import_type == ImportType::Manual;
        (
          Some(import.import_type),
          import
            .error_reason
            .filter(|_| manual)
            .map(|reason| reason.code().to_string()),
          import.adjustment_details.filter(|_| manual),
        )
      }
      None => (None, None, None),
    };

    FiscalClosingRow {
      id: closing.id,
      client_id: closing.client_id,
      competence: closing.competence,
      status: closing.status,
      started_at: closing.started_at,
      completed_at: closing.completed_at,
      import_type,
      import_error_details,
      import_adjustment_details,
      movement_data: Some(Value::Object(bag)),
    }
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ObligationType {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub recurrence: Option<String>,
}

/// A tax guide, possibly one installment of a payment plan.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaxGuide {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  pub client_id: String,
  #[serde(default)]
  pub obligation_type_id: Option<String>,
  pub competence: Competence,
  pub due_date: NaiveDate,
  #[serde(default)]
  pub amount: f64,
  #[serde(default)]
  pub installment_number: Option<i32>,
  #[serde(default)]
  pub installment_total: Option<i32>,
  #[serde(default)]
  pub paid_at: Option<DateTime<Utc>>,
}

impl TaxGuide {
  pub fn is_paid(&self) -> bool {
    self.paid_at.is_some()
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppUser {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  pub email: String,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
  pub user_id: String,
  pub email: String,
  pub access_token: String,
  #[serde(default)]
  pub refresh_token: Option<String>,
  pub expires_at: DateTime<Utc>,
}

impl Session {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn competence_accepts_month_and_day_forms() {
    let a = Competence::parse("2026-02").unwrap();
    let b = Competence::parse("2026-02-17").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.first_day(), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    assert_eq!(a.last_day(), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    assert_eq!(a.previous().label(), "2026-01");
    assert_eq!(Competence::parse("2026-01").unwrap().previous().label(), "2025-12");
    assert!(Competence::parse("2026-13").is_err());
  }

  #[test]
  fn status_order_is_linear() {
    assert_eq!(ClosingStatus::Pending.previous(), None);
    assert_eq!(ClosingStatus::Pending.next(), Some(ClosingStatus::DocsReceived));
    assert_eq!(ClosingStatus::TaxesGenerated.next(), Some(ClosingStatus::Done));
    assert_eq!(ClosingStatus::Done.next(), None);
    assert_eq!(ClosingStatus::Done.previous(), Some(ClosingStatus::TaxesGenerated));
    assert_eq!(ClosingStatus::parse("analysis").unwrap(), ClosingStatus::Analysis);
    assert!(ClosingStatus::parse("archived").is_err());
  }

  #[test]
  fn closing_row_maps_movement_document_to_typed_fields() {
    let row = serde_json::json!({
      "id": "c1",
      "client_id": "cli-1",
      "competence": "2026-02-01",
      "status": "taxes_generated",
      "import_type": "manual",
      "import_error_details": "ncm_mismatch",
      "import_adjustment_details": "ajuste manual",
      "movement_data": { "import_type": "manual", "entradas": true, "saidas": false, "obs": "x" }
    });
    let closing: FiscalClosing = serde_json::from_value(row).unwrap();
    let import = closing.import.clone().unwrap();
    assert_eq!(import.import_type, ImportType::Manual);
    assert_eq!(import.error_reason, Some(ImportErrorReason::NcmMismatch));
    assert_eq!(closing.movement, Some(MovementFlags { entradas: true, saidas: false }));
    assert_eq!(closing.extra_movement.get("obs"), Some(&Value::from("x")));

    let back = serde_json::to_value(&closing).unwrap();
    assert_eq!(back["movement_data"]["obs"], "x");
    assert_eq!(back["movement_data"]["entradas"], true);
    assert_eq!(back["import_error_details"], "ncm_mismatch");
  }

  #[test]
  fn automatic_import_never_carries_error_details() {
    let mut closing = FiscalClosing::pending("cli-1", Competence::parse("2026-02").unwrap());
    closing.import = Some(ImportMetadata {
      import_type: ImportType::Automatic,
      error_reason: Some(ImportErrorReason::Other),
      adjustment_details: Some("ignored".to_string()),
    });
    let patch = closing.transition_patch();
    assert_eq!(patch["import_type"], "automatic");
    assert!(patch["import_error_details"].is_null());
    assert!(patch["import_adjustment_details"].is_null());
  }
}
