use chrono::{DateTime, Duration, Utc};

use crate::domain::WorkflowError;
use crate::models::{Task, TaskStatus};

// Out-of-order calls (pause while paused, play while running, anything after
// completion) leave the task untouched and report `false`.

pub fn play(task: &mut Task, now: DateTime<Utc>) -> bool {
  if task.completed_at.is_some() {
    return false;
  }
  if task.started_at.is_none() {
    task.started_at = Some(now);
    task.status = TaskStatus::InProgress;
    return true;
  }
  if task.is_paused {
    fold_pause(task, now);
    task.status = TaskStatus::InProgress;
    return true;
  }
  false
}

pub fn pause(task: &mut Task, now: DateTime<Utc>) -> bool {
  if task.started_at.is_none() || task.completed_at.is_some() || task.is_paused {
    return false;
  }
  task.is_paused = true;
  task.last_paused_at = Some(now);
  true
}

pub fn complete(task: &mut Task, now: DateTime<Utc>) -> Result<bool, WorkflowError> {
  if task.completed_at.is_some() {
    return Ok(false);
  }
  let pending = task.pending_checklist_items();
  if pending > 0 {
    return Err(WorkflowError::ChecklistIncomplete { pending });
  }
  if task.is_paused {
    fold_pause(task, now);
  }
  task.completed_at = Some(now);
  task.status = TaskStatus::Done;
  Ok(true)
}

/// Worked time: `(end - started_at) - total_pause`, clamped to zero, where
/// `end` is `completed_at` once finished and `now` otherwise. An open pause
/// only counts once it is folded into `total_pause` by play or complete.
pub fn net_elapsed(task: &Task, now: DateTime<Utc>) -> Duration {
  let Some(started_at) = task.started_at else {
    return Duration::zero();
  };
  let end = task.completed_at.unwrap_or(now);
  let net = (end - started_at) - Duration::milliseconds(task.total_pause);
  net.max(Duration::zero())
}

fn fold_pause(task: &mut Task, now: DateTime<Utc>) {
  if let Some(paused_at) = task.last_paused_at {
    let paused = (now - paused_at).num_milliseconds().max(0);
    task.total_pause += paused;
  }
  task.is_paused = false;
  task.last_paused_at = None;
}

pub fn format_duration(duration: Duration) -> String {
  let minutes = duration.num_minutes().max(0);
  format!("{:02}h{:02}", minutes / 60, minutes % 60)
}
