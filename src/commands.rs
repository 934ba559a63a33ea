use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::log::append_audit;
use crate::closings::{BoardColumn, ClosingBoard, ClosingCard, TransitionOutcome};
use crate::config::{self, AppConfig};
use crate::dashboards::{self, FiscalDashboard, TasksDashboard};
use crate::db::LocalBackend;
use crate::domain::closing::AdvanceInput;
use crate::domain::filters::ClosingListFilter;
use crate::error::AppError;
use crate::export::ReportFormat;
use crate::files::preview;
use crate::models::{Competence, Quadrant, Session, Task};
use crate::remote::rest::RestBackend;
use crate::remote::{AuthService, DataService};
use crate::reports::{self, DailyReport};
use crate::repo;
use crate::session::SessionContext;
use crate::tasks::{QuadrantView, TaskBoard, TaskInput};

pub struct AppState {
  pub config: AppConfig,
  pub data: Arc<dyn DataService>,
  pub session: SessionContext,
}

impl AppState {
  pub fn new(config: AppConfig, data: Arc<dyn DataService>, auth: Arc<dyn AuthService>) -> Result<Self, AppError> {
    Ok(Self {
      config,
      data,
      session: SessionContext::init(auth)?,
    })
  }

  pub fn from_config(config: AppConfig) -> Result<Self, AppError> {
    let (data, auth) = build_backends(&config)?;
    Self::new(config, data, auth)
  }

  fn actor(&self) -> Result<Session, AppError> {
    self.session.require()
  }
}

pub fn build_backends(config: &AppConfig) -> Result<(Arc<dyn DataService>, Arc<dyn AuthService>), AppError> {
  if let Some(remote) = &config.remote {
    info!(url = %remote.url, "using hosted backend");
    let backend = Arc::new(RestBackend::new(&remote.url, &remote.api_key, config.http_timeout)?);
    let data: Arc<dyn DataService> = backend.clone();
    let auth: Arc<dyn AuthService> = backend;
    return Ok((data, auth));
  }

  let mut local = match &config.local_db {
    Some(path) => LocalBackend::open(path)?,
    None => LocalBackend::in_memory()?,
  };
  if let Some((email, password)) = &config.dev_credentials {
    local = local.with_credential(email, password);
  }
  info!(
    path = %config.local_db.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| ":memory:".to_string()),
    "using local backend"
  );
  let backend = Arc::new(local);
  let data: Arc<dyn DataService> = backend.clone();
  let auth: Arc<dyn AuthService> = backend;
  Ok((data, auth))
}

/// Local backend at the configured or default file, as used by the seeder.
pub fn open_local_store(config: &AppConfig) -> Result<LocalBackend, AppError> {
  let path = match &config.local_db {
    Some(path) => path.clone(),
    None => config::default_local_db()?,
  };
  LocalBackend::open(&path)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInput {
  pub email: String,
  pub password: String,
}

pub fn login(state: &AppState, input: &LoginInput) -> Result<Session, AppError> {
  state.session.sign_in(input.email.trim(), &input.password)
}

pub fn logout(state: &AppState) -> Result<(), AppError> {
  state.session.sign_out()
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
  pub competence: Competence,
  pub columns: Vec<BoardColumn>,
}

pub fn closing_board(state: &AppState, competence: Competence, search: Option<&str>) -> Result<BoardView, AppError> {
  state.actor()?;
  let mut board = ClosingBoard::load(state.data.clone(), competence)?;
  if let Some(term) = search {
    board.set_pending_search(term);
  }
  Ok(BoardView {
    competence,
    columns: board.columns(),
  })
}

pub fn list_closings(
  state: &AppState,
  competence: Competence,
  filter: &ClosingListFilter,
) -> Result<Vec<ClosingCard>, AppError> {
  state.actor()?;
  Ok(ClosingBoard::load(state.data.clone(), competence)?.list(filter))
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
  pub competence: Competence,
  pub created: usize,
}

pub fn sync_closings(state: &AppState, competence: Competence) -> Result<SyncResult, AppError> {
  let session = state.actor()?;
  let mut board = ClosingBoard::load(state.data.clone(), competence)?;
  let created = board.sync_missing_clients(Some(&session.email))?;
  Ok(SyncResult { competence, created })
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionResult {
  #[serde(flatten)]
  pub outcome: TransitionOutcome,
  pub card: Option<ClosingCard>,
}

fn board_for_closing(state: &AppState, id: &str) -> Result<ClosingBoard, AppError> {
  let record = repo::get_closing(state.data.as_ref(), id)?.ok_or_else(|| AppError::not_found("fiscal_closing", id))?;
  ClosingBoard::load(state.data.clone(), record.competence)
}

pub fn advance_closing(state: &AppState, id: &str, input: &AdvanceInput) -> Result<TransitionResult, AppError> {
  let session = state.actor()?;
  let mut board = board_for_closing(state, id)?;
  let outcome = board.advance(id, input, Some(&session.email))?;
  Ok(TransitionResult {
    outcome,
    card: board.card(id).cloned(),
  })
}

pub fn retreat_closing(state: &AppState, id: &str, confirmed: bool) -> Result<TransitionResult, AppError> {
  let session = state.actor()?;
  let mut board = board_for_closing(state, id)?;
  let outcome = board.retreat(id, confirmed, Some(&session.email))?;
  Ok(TransitionResult {
    outcome,
    card: board.card(id).cloned(),
  })
}

pub fn task_quadrants(state: &AppState) -> Result<Vec<QuadrantView>, AppError> {
  state.actor()?;
  Ok(TaskBoard::load(state.data.clone())?.quadrants(Utc::now()))
}

/// Body of a task creation. With `standard_id` the task is built from that
/// standard and only `quadrant`/`client_id` are read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTaskRequest {
  #[serde(default)]
  pub standard_id: Option<String>,
  #[serde(flatten)]
  pub task: TaskInput,
}

pub fn create_task(state: &AppState, request: &NewTaskRequest) -> Result<Task, AppError> {
  let session = state.actor()?;
  let mut board = TaskBoard::load(state.data.clone())?;
  match request.standard_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
    Some(standard_id) => {
      let quadrant = request
        .task
        .quadrant
        .unwrap_or_else(|| Quadrant::from_flags(request.task.urgent, request.task.important));
      board.create_from_standard(
        standard_id,
        quadrant,
        request.task.client_id.as_deref(),
        Some(&session.email),
      )
    }
    None => board.create(&request.task, Some(&session.email)),
  }
}

pub fn update_task(state: &AppState, id: &str, input: &TaskInput) -> Result<Task, AppError> {
  let session = state.actor()?;
  TaskBoard::load(state.data.clone())?.update(id, input, Some(&session.email))
}

pub fn delete_task(state: &AppState, id: &str) -> Result<(), AppError> {
  let session = state.actor()?;
  TaskBoard::load(state.data.clone())?.delete(id, Some(&session.email))
}

pub fn toggle_checklist(state: &AppState, id: &str, index: usize) -> Result<Task, AppError> {
  let session = state.actor()?;
  TaskBoard::load(state.data.clone())?.toggle_checklist(id, index, Some(&session.email))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
  Play,
  Pause,
  Complete,
}

impl TimerAction {
  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "play" => Some(TimerAction::Play),
      "pause" => Some(TimerAction::Pause),
      "complete" => Some(TimerAction::Complete),
      _ => None,
    }
  }
}

pub fn run_timer(state: &AppState, id: &str, action: TimerAction) -> Result<Task, AppError> {
  let session = state.actor()?;
  let mut board = TaskBoard::load(state.data.clone())?;
  let now = Utc::now();
  let actor = Some(session.email.as_str());
  match action {
    TimerAction::Play => board.play(id, now, actor),
    TimerAction::Pause => board.pause(id, now, actor),
    TimerAction::Complete => board.complete(id, now, actor),
  }
}

pub fn tasks_dashboard(state: &AppState) -> Result<TasksDashboard, AppError> {
  state.actor()?;
  dashboards::load_tasks_dashboard(state.data.as_ref(), Utc::now(), &Local)
}

pub fn fiscal_dashboard(state: &AppState, competence: Competence) -> Result<FiscalDashboard, AppError> {
  state.actor()?;
  dashboards::load_fiscal_dashboard(state.data.as_ref(), competence, Local::now().date_naive())
}

pub fn daily_report(state: &AppState, day: NaiveDate, competence: Option<Competence>) -> Result<DailyReport, AppError> {
  let session = state.actor()?;
  let report = reports::build_daily_report(state.data.as_ref(), day, competence, &Local)?;
  append_audit(
    Some(&session.email),
    "REPORT_GENERATED",
    "REPORT",
    None,
    Some(&serde_json::json!({
      "day": day,
      "competence": report.competence.label(),
      "tasks": report.totals.tasks_done,
      "closings": report.totals.closings_total,
    })),
  );
  Ok(report)
}

pub fn render_report(report: &DailyReport, format: ReportFormat) -> Result<Vec<u8>, AppError> {
  preview::render(report, format)
}

pub fn preview_report(report: &DailyReport, format: ReportFormat) -> Result<String, AppError> {
  Ok(preview::preview(report, format)?.display().to_string())
}
