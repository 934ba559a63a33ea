use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::domain::{calendar, timer};
use crate::error::AppError;
use crate::models::{
  Client, ClosingStatus, Competence, FiscalClosing, ImportErrorReason, ImportType, Quadrant, Task, TaskStatus,
  TaxGuide,
};
use crate::remote::DataService;
use crate::repo;
use crate::tasks::is_overdue;

/// Installments due within this many days count as upcoming.
pub const DUE_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct QuadrantCount {
  pub quadrant: Quadrant,
  pub label: &'static str,
  pub open: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
  pub pending: usize,
  pub in_progress: usize,
  pub done: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TasksDashboard {
  pub greeting: &'static str,
  pub open_by_quadrant: Vec<QuadrantCount>,
  pub by_status: StatusCounts,
  pub completed_today: usize,
  pub overdue: Vec<Task>,
  pub total_net_minutes: i64,
  pub average_net_minutes: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClosingStatusCount {
  pub status: ClosingStatus,
  pub label: &'static str,
  pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegimeProgress {
  pub regime: String,
  pub done: usize,
  pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSplit {
  pub automatic: usize,
  pub manual: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasonCount {
  pub reason: ImportErrorReason,
  pub label: &'static str,
  pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FiscalDashboard {
  pub competence: Competence,
  pub total: usize,
  pub done: usize,
  pub completion_ratio: f64,
  pub by_status: Vec<ClosingStatusCount>,
  pub by_regime: Vec<RegimeProgress>,
  pub imports: ImportSplit,
  pub manual_reasons: Vec<ReasonCount>,
  pub average_cycle_hours: Option<f64>,
  pub guides_overdue: Vec<TaxGuide>,
  pub guides_due_soon: Vec<TaxGuide>,
}

pub fn greeting(hour: u32) -> &'static str {
  match hour {
    5..=11 => "Bom dia",
    12..=17 => "Boa tarde",
    _ => "Boa noite",
  }
}

/// "Today", overdue and the greeting are all read on the office clock `tz`.
pub fn tasks_dashboard<Tz: TimeZone>(tasks: &[Task], now: DateTime<Utc>, tz: &Tz) -> TasksDashboard {
  let local_now = now.with_timezone(tz);
  let today = local_now.date_naive();
  let open_by_quadrant = Quadrant::ALL
    .into_iter()
    .map(|quadrant| QuadrantCount {
      quadrant,
      label: quadrant.label(),
      open: tasks
        .iter()
        .filter(|task| task.quadrant == quadrant && !task.is_done())
        .count(),
    })
    .collect();

  let mut by_status = StatusCounts::default();
  for task in tasks {
    match task.status {
      TaskStatus::Pending => by_status.pending += 1,
      TaskStatus::InProgress => by_status.in_progress += 1,
      TaskStatus::Done => by_status.done += 1,
    }
  }

  let completed: Vec<&Task> = tasks.iter().filter(|task| task.completed_at.is_some()).collect();
  let completed_today = completed
    .iter()
    .filter(|task| task.completed_at.map(|at| calendar::local_day(at, tz)) == Some(today))
    .count();
  let minutes: Vec<i64> = completed
    .iter()
    .filter(|task| task.started_at.is_some())
    .map(|task| timer::net_elapsed(task, now).num_minutes())
    .collect();
  let total_net_minutes = minutes.iter().sum();

  TasksDashboard {
    greeting: greeting(local_now.hour()),
    open_by_quadrant,
    by_status,
    completed_today,
    overdue: tasks.iter().filter(|task| is_overdue(task, today)).cloned().collect(),
    total_net_minutes,
    average_net_minutes: average(total_net_minutes as f64, minutes.len()),
  }
}

pub fn fiscal_dashboard(
  competence: Competence,
  closings: &[FiscalClosing],
  clients: &[Client],
  guides: &[TaxGuide],
  today: NaiveDate,
) -> FiscalDashboard {
  let by_status: Vec<ClosingStatusCount> = ClosingStatus::PIPELINE
    .into_iter()
    .map(|status| ClosingStatusCount {
      status,
      label: status.label(),
      count: closings.iter().filter(|closing| closing.status == status).count(),
    })
    .collect();
  let total = closings.len();
  let done = closings
    .iter()
    .filter(|closing| closing.status == ClosingStatus::Done)
    .count();

  let mut regimes: BTreeMap<String, RegimeProgress> = BTreeMap::new();
  for closing in closings {
    let regime = clients
      .iter()
      .find(|client| client.id == closing.client_id)
      .and_then(|client| client.regime)
      .map(|regime| regime.label())
      .unwrap_or("Sem regime")
      .to_string();
    let entry = regimes.entry(regime.clone()).or_insert(RegimeProgress {
      regime,
      done: 0,
      total: 0,
    });
    entry.total += 1;
    if closing.status == ClosingStatus::Done {
      entry.done += 1;
    }
  }

  let mut imports = ImportSplit::default();
  let mut reasons: BTreeMap<&'static str, (ImportErrorReason, usize)> = BTreeMap::new();
  for import in closings.iter().filter_map(|closing| closing.import.as_ref()) {
    match import.import_type {
      ImportType::Automatic => imports.automatic += 1,
      ImportType::Manual => imports.manual += 1,
    }
    if let Some(reason) = import.error_reason {
      reasons.entry(reason.code()).or_insert((reason, 0)).1 += 1;
    }
  }
  let mut manual_reasons: Vec<ReasonCount> = reasons
    .into_values()
    .map(|(reason, count)| ReasonCount {
      reason,
      label: reason.label(),
      count,
    })
    .collect();
  manual_reasons.sort_by(|a, b| b.count.cmp(&a.count));

  let cycles: Vec<f64> = closings
    .iter()
    .filter_map(|closing| Some((closing.completed_at? - closing.started_at?).num_minutes() as f64 / 60.0))
    .collect();

  let horizon = today + Duration::days(DUE_SOON_DAYS);
  let open_guides = guides.iter().filter(|guide| !guide.is_paid());

  FiscalDashboard {
    competence,
    total,
    done,
    completion_ratio: if total == 0 { 0.0 } else { done as f64 / total as f64 },
    by_status,
    by_regime: regimes.into_values().collect(),
    imports,
    manual_reasons,
    average_cycle_hours: average(cycles.iter().sum(), cycles.len()),
    guides_overdue: open_guides.clone().filter(|guide| guide.due_date < today).cloned().collect(),
    guides_due_soon: open_guides
      .filter(|guide| guide.due_date >= today && guide.due_date <= horizon)
      .cloned()
      .collect(),
  }
}

fn average(sum: f64, count: usize) -> Option<f64> {
  (count > 0).then(|| sum / count as f64)
}

pub fn load_tasks_dashboard<Tz: TimeZone>(
  data: &dyn DataService,
  now: DateTime<Utc>,
  tz: &Tz,
) -> Result<TasksDashboard, AppError> {
  let tasks = repo::list_tasks(data)?;
  Ok(tasks_dashboard(&tasks, now, tz))
}

pub fn load_fiscal_dashboard(data: &dyn DataService, competence: Competence, today: NaiveDate) -> Result<FiscalDashboard, AppError> {
  let closings = repo::list_closings(data, competence)?;
  let clients = repo::list_clients(data)?;
  let guides = repo::list_tax_guides(data)?;
  Ok(fiscal_dashboard(competence, &closings, &clients, &guides, today))
}
