use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::dashboards::ClosingStatusCount;
use crate::domain::timer;
use crate::error::AppError;
use crate::models::{Client, ClosingStatus, Competence, FiscalClosing, Task};
use crate::remote::DataService;
use crate::repo;

#[derive(Debug, Clone, Serialize)]
pub struct ReportTaskRow {
  pub title: String,
  pub client_name: String,
  pub quadrant: &'static str,
  pub completed_at: Option<DateTime<Utc>>,
  pub net_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportClosingRow {
  pub client_name: String,
  pub regime: String,
  pub status: &'static str,
  pub import_type: String,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTotals {
  pub tasks_done: usize,
  pub net_minutes: i64,
  pub closings_total: usize,
  pub closings_done: usize,
  pub done_ratio: f64,
  pub closings_by_status: Vec<ClosingStatusCount>,
}

/// Tasks executed on one day and the closings of one competence.
#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
  pub day: NaiveDate,
  pub competence: Competence,
  pub tasks: Vec<ReportTaskRow>,
  pub closings: Vec<ReportClosingRow>,
  pub totals: ReportTotals,
}

impl DailyReport {
  pub fn title(&self) -> String {
    format!(
      "Relatorio diario {} - competencia {}",
      self.day.format("%d/%m/%Y"),
      self.competence.label()
    )
  }
}

/// Competence a report for `day` covers when none is chosen: the month
/// before, the one being closed.
pub fn default_competence(day: NaiveDate) -> Competence {
  Competence::containing(day).previous()
}

/// `day` is read on the office clock `tz`.
pub fn build_daily_report<Tz: TimeZone>(
  data: &dyn DataService,
  day: NaiveDate,
  competence: Option<Competence>,
  tz: &Tz,
) -> Result<DailyReport, AppError> {
  let competence = competence.unwrap_or_else(|| default_competence(day));
  let tasks = repo::list_tasks_completed_on(data, day, tz)?;
  let closings = repo::list_closings(data, competence)?;
  let clients = repo::list_clients(data)?;
  Ok(assemble(day, competence, &tasks, &closings, &clients, Utc::now()))
}

pub fn assemble(
  day: NaiveDate,
  competence: Competence,
  tasks: &[Task],
  closings: &[FiscalClosing],
  clients: &[Client],
  now: DateTime<Utc>,
) -> DailyReport {
  let by_id: HashMap<&str, &Client> = clients.iter().map(|client| (client.id.as_str(), client)).collect();
  let name_of = |id: Option<&str>| {
    id.and_then(|id| by_id.get(id))
      .map(|client| client.display_name().to_string())
      .unwrap_or_else(|| "-".to_string())
  };

  let task_rows: Vec<ReportTaskRow> = tasks
    .iter()
    .map(|task| ReportTaskRow {
      title: task.title.clone(),
      client_name: name_of(task.client_id.as_deref()),
      quadrant: task.quadrant.label(),
      completed_at: task.completed_at,
      net_minutes: timer::net_elapsed(task, now).num_minutes(),
    })
    .collect();

  let mut closing_rows: Vec<ReportClosingRow> = closings
    .iter()
    .map(|closing| {
      let client = by_id.get(closing.client_id.as_str());
      ReportClosingRow {
        client_name: name_of(Some(closing.client_id.as_str())),
        regime: client
          .and_then(|client| client.regime)
          .map(|regime| regime.label().to_string())
          .unwrap_or_default(),
        status: closing.status.label(),
        import_type: closing
          .import_type()
          .map(|kind| kind.as_str().to_string())
          .unwrap_or_default(),
        started_at: closing.started_at,
        completed_at: closing.completed_at,
      }
    })
    .collect();
  closing_rows.sort_by(|a, b| a.client_name.to_lowercase().cmp(&b.client_name.to_lowercase()));

  let closings_done = closings
    .iter()
    .filter(|closing| closing.status == ClosingStatus::Done)
    .count();
  let totals = ReportTotals {
    tasks_done: task_rows.len(),
    net_minutes: task_rows.iter().map(|row| row.net_minutes).sum(),
    closings_total: closings.len(),
    closings_done,
    done_ratio: if closings.is_empty() {
      0.0
    } else {
      closings_done as f64 / closings.len() as f64
    },
    closings_by_status: ClosingStatus::PIPELINE
      .into_iter()
      .map(|status| ClosingStatusCount {
        status,
        label: status.label(),
        count: closings.iter().filter(|closing| closing.status == status).count(),
      })
      .collect(),
  };

  DailyReport {
    day,
    competence,
    tasks: task_rows,
    closings: closing_rows,
    totals,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::LocalBackend;
  use crate::models::{Quadrant, TaskStatus};
  use crate::remote::Table;
  use chrono::{Duration, FixedOffset};

  #[test]
  fn report_defaults_to_previous_competence() {
    let day = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
    assert_eq!(default_competence(day).label(), "2026-02");
    let january = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
    assert_eq!(default_competence(january).label(), "2025-12");
  }

  #[test]
  fn totals_sum_task_time_and_closing_progress() {
    let day = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
    let start = Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap();
    let mut task = Task::new("Conferir notas", Quadrant::DoFirst);
    task.status = TaskStatus::Done;
    task.client_id = Some("a".to_string());
    task.started_at = Some(start);
    task.completed_at = Some(start + Duration::minutes(45));

    let competence = default_competence(day);
    let mut closed = FiscalClosing::pending("a", competence);
    closed.status = ClosingStatus::Done;
    let open = FiscalClosing::pending("zz", competence);
    let clients = vec![Client {
      id: "a".to_string(),
      name: "Padaria Central".to_string(),
      trade_name: None,
      document: None,
      regime: None,
    }];

    let report = assemble(day, competence, &[task], &[open, closed], &clients, start);
    assert_eq!(report.tasks[0].client_name, "Padaria Central");
    assert_eq!(report.totals.net_minutes, 45);
    assert_eq!(report.totals.closings_done, 1);
    assert_eq!(report.totals.done_ratio, 0.5);
    assert_eq!(report.closings[0].client_name, "-");
    assert!(report.title().contains("05/03/2026"));
  }

  #[test]
  fn evening_work_stays_in_the_local_day() {
    let backend = LocalBackend::in_memory().unwrap();
    let brt = FixedOffset::west_opt(3 * 3600).unwrap();
    let finished = brt.with_ymd_and_hms(2026, 3, 4, 22, 30, 0).unwrap().with_timezone(&Utc);
    let mut task = Task::new("Fechar caixa", Quadrant::Schedule);
    task.status = TaskStatus::Done;
    task.started_at = Some(finished - Duration::minutes(20));
    task.completed_at = Some(finished);
    backend
      .insert(Table::Tasks, vec![serde_json::to_value(&task).unwrap()])
      .unwrap();

    let day = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
    let report = build_daily_report(&backend, day, None, &brt).unwrap();
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].title, "Fechar caixa");
    assert_eq!(report.totals.net_minutes, 20);

    let next = build_daily_report(&backend, day.succ_opt().unwrap(), None, &brt).unwrap();
    assert!(next.tasks.is_empty());
  }
}
