mod common;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use fiscal_backoffice::dashboards;
use fiscal_backoffice::models::{Quadrant, TaskStatus};
use fiscal_backoffice::remote::DataService;
use fiscal_backoffice::repo;
use fiscal_backoffice::tasks::{TaskBoard, TaskInput};

use common::{backend, Counting};

fn input(title: &str, checklist: &[&str]) -> TaskInput {
  TaskInput {
    title: title.to_string(),
    urgent: true,
    important: true,
    checklist: checklist.iter().map(|item| item.to_string()).collect(),
    ..TaskInput::default()
  }
}

#[test]
fn pauses_are_subtracted_from_worked_time() {
  let data = Counting::new(backend());
  let mut board = TaskBoard::load(data.clone()).unwrap();
  let task = board.create(&input("Apuracao ICMS", &[]), None).unwrap();
  assert_eq!(task.quadrant, Quadrant::DoFirst);

  let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
  board.play(&task.id, t0, None).unwrap();
  board.pause(&task.id, t0 + Duration::minutes(30), None).unwrap();
  board.play(&task.id, t0 + Duration::minutes(45), None).unwrap();
  let done = board.complete(&task.id, t0 + Duration::minutes(75), None).unwrap();

  assert_eq!(done.status, TaskStatus::Done);
  assert_eq!(done.total_pause, Duration::minutes(15).num_milliseconds());

  let stored = repo::list_tasks(data.as_ref() as &dyn DataService).unwrap();
  let stored = stored.iter().find(|t| t.id == task.id).unwrap();
  assert_eq!(stored.completed_at, Some(t0 + Duration::minutes(75)));
  assert_eq!(stored.started_at, Some(t0));
  assert!(!stored.is_paused);

  let summary = dashboards::tasks_dashboard(std::slice::from_ref(stored), t0 + Duration::hours(2), &Utc);
  assert_eq!(summary.total_net_minutes, 60);
  assert_eq!(summary.by_status.done, 1);
}

#[test]
fn repeated_controls_do_not_write() {
  let data = Counting::new(backend());
  let mut board = TaskBoard::load(data.clone()).unwrap();
  let task = board.create(&input("DCTFWeb", &[]), None).unwrap();
  let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();

  board.pause(&task.id, t0, None).unwrap();
  assert_eq!(data.updates(), 0);

  board.play(&task.id, t0, None).unwrap();
  board.play(&task.id, t0 + Duration::minutes(5), None).unwrap();
  board.pause(&task.id, t0 + Duration::minutes(10), None).unwrap();
  board.pause(&task.id, t0 + Duration::minutes(20), None).unwrap();
  assert_eq!(data.updates(), 2);

  let paused = board.task(&task.id).unwrap();
  assert_eq!(paused.last_paused_at, Some(t0 + Duration::minutes(10)));
}

#[test]
fn checklist_must_be_finished_before_completion() {
  let data = Counting::new(backend());
  let mut board = TaskBoard::load(data.clone()).unwrap();
  let task = board
    .create(&input("Folha de pagamento", &["Lancar eventos", "Enviar holerites"]), None)
    .unwrap();
  let now = Utc::now();
  board.play(&task.id, now, None).unwrap();

  let err = board.complete(&task.id, now, None).unwrap_err();
  assert_eq!(err.code, "VALIDATION_CHECKLIST");
  assert_eq!(data.updates(), 1);

  board.toggle_checklist(&task.id, 0, None).unwrap();
  board.toggle_checklist(&task.id, 1, None).unwrap();
  let done = board.complete(&task.id, now + Duration::minutes(1), None).unwrap();
  assert!(done.is_done());

  let reloaded = TaskBoard::load(Arc::clone(&data) as Arc<dyn DataService>).unwrap();
  assert!(reloaded.task(&task.id).unwrap().checklist.iter().all(|item| item.done));
}
