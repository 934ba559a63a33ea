use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::log::append_audit;
use crate::domain::{timer, validation, WorkflowError};
use crate::error::AppError;
use crate::models::{ChecklistItem, Quadrant, Task, TaskCategory, TaskStatus};
use crate::remote::{DataService, Table};
use crate::repo;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInput {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub client_id: Option<String>,
  #[serde(default)]
  pub category_id: Option<String>,
  #[serde(default)]
  pub urgent: bool,
  #[serde(default)]
  pub important: bool,
  #[serde(default)]
  pub quadrant: Option<Quadrant>,
  #[serde(default)]
  pub due_date: Option<String>,
  #[serde(default)]
  pub checklist: Vec<String>,
}

impl TaskInput {
  fn quadrant(&self) -> Quadrant {
    self
      .quadrant
      .unwrap_or_else(|| Quadrant::from_flags(self.urgent, self.important))
  }

  fn due_date(&self) -> Result<Option<NaiveDate>, WorkflowError> {
    match self.due_date.as_deref().map(str::trim) {
      None | Some("") => Ok(None),
      Some(value) => validation::parse_date(value).map(Some),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuadrantView {
  pub quadrant: Quadrant,
  pub label: &'static str,
  pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
  #[serde(flatten)]
  pub task: Task,
  pub net_minutes: i64,
  pub elapsed: String,
}

impl TaskView {
  pub fn of(task: &Task, now: DateTime<Utc>) -> Self {
    let net = timer::net_elapsed(task, now);
    Self {
      task: task.clone(),
      net_minutes: net.num_minutes(),
      elapsed: timer::format_duration(net),
    }
  }
}

/// Eisenhower board over every task.
pub struct TaskBoard {
  data: Arc<dyn DataService>,
  tasks: Vec<Task>,
}

impl TaskBoard {
  pub fn load(data: Arc<dyn DataService>) -> Result<Self, AppError> {
    let tasks = repo::list_tasks(data.as_ref())?;
    Ok(Self { data, tasks })
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn task(&self, id: &str) -> Option<&Task> {
    self.tasks.iter().find(|task| task.id == id)
  }

  fn position(&self, id: &str) -> Result<usize, AppError> {
    self
      .tasks
      .iter()
      .position(|task| task.id == id)
      .ok_or_else(|| AppError::not_found("task", id))
  }

  /// Open tasks first, earliest due date first, undated last.
  pub fn quadrants(&self, now: DateTime<Utc>) -> Vec<QuadrantView> {
    Quadrant::ALL
      .into_iter()
      .map(|quadrant| {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|task| task.quadrant == quadrant).collect();
        tasks.sort_by_key(|task| (task.is_done(), task.due_date.is_none(), task.due_date));
        QuadrantView {
          quadrant,
          label: quadrant.label(),
          tasks: tasks.into_iter().map(|task| TaskView::of(task, now)).collect(),
        }
      })
      .collect()
  }

  pub fn create(&mut self, input: &TaskInput, actor: Option<&str>) -> Result<Task, AppError> {
    validation::ensure_not_empty("title", &input.title)?;
    let mut task = Task::new(input.title.trim(), input.quadrant());
    task.description = clean(input.description.as_deref());
    task.client_id = clean(input.client_id.as_deref());
    task.category_id = clean(input.category_id.as_deref());
    task.due_date = input.due_date()?;
    task.checklist = checklist_from(&input.checklist);
    task.created_at = Some(Utc::now());
    self.insert(task, actor)
  }

  /// Creates a task pre-filled from a standard: its title, category and
  /// default checklist.
  pub fn create_from_standard(
    &mut self,
    standard_id: &str,
    quadrant: Quadrant,
    client_id: Option<&str>,
    actor: Option<&str>,
  ) -> Result<Task, AppError> {
    let standard: TaskCategory = repo::fetch_by_id(self.data.as_ref(), Table::TaskCategories, standard_id)?
      .ok_or_else(|| AppError::not_found("task_category", standard_id))?;
    let mut task = Task::new(standard.title.clone(), quadrant);
    task.category_id = standard.category_id.clone();
    task.client_id = clean(client_id);
    task.checklist = checklist_from(&standard.default_checklist);
    task.created_at = Some(Utc::now());
    self.insert(task, actor)
  }

  fn insert(&mut self, task: Task, actor: Option<&str>) -> Result<Task, AppError> {
    let created = repo::insert_one(self.data.as_ref(), Table::Tasks, &task)?;
    append_audit(actor, "CREATE_TASK", "TASK", Some(&created.id), None);
    self.tasks.push(created.clone());
    Ok(created)
  }

  pub fn update(&mut self, id: &str, input: &TaskInput, actor: Option<&str>) -> Result<Task, AppError> {
    validation::ensure_not_empty("title", &input.title)?;
    let idx = self.position(id)?;
    let due_date = input.due_date()?;

    // Completed items stay completed when their text is kept.
    let previous = &self.tasks[idx].checklist;
    let checklist: Vec<ChecklistItem> = input
      .checklist
      .iter()
      .map(|text| text.trim())
      .filter(|text| !text.is_empty())
      .map(|text| ChecklistItem {
        text: text.to_string(),
        done: previous.iter().any(|item| item.done && item.text == text),
      })
      .collect();

    let patch = serde_json::json!({
      "title": input.title.trim(),
      "description": clean(input.description.as_deref()),
      "client_id": clean(input.client_id.as_deref()),
      "category_id": clean(input.category_id.as_deref()),
      "quadrant": input.quadrant(),
      "due_date": due_date,
      "checklist": checklist,
    });
    let updated: Task = repo::update_one(self.data.as_ref(), Table::Tasks, id, patch.clone())?;
    append_audit(actor, "UPDATE_TASK", "TASK", Some(id), Some(&patch));
    self.tasks[idx] = updated.clone();
    Ok(updated)
  }

  pub fn delete(&mut self, id: &str, actor: Option<&str>) -> Result<(), AppError> {
    let idx = self.position(id)?;
    self.data.delete(Table::Tasks, id)?;
    append_audit(actor, "DELETE_TASK", "TASK", Some(id), None);
    self.tasks.remove(idx);
    Ok(())
  }

  pub fn toggle_checklist(&mut self, id: &str, index: usize, actor: Option<&str>) -> Result<Task, AppError> {
    let idx = self.position(id)?;
    let mut checklist = self.tasks[idx].checklist.clone();
    let item = checklist
      .get_mut(index)
      .ok_or(WorkflowError::ChecklistIndex { index })?;
    item.done = !item.done;
    let patch = serde_json::json!({ "checklist": checklist });
    let updated: Task = repo::update_one(self.data.as_ref(), Table::Tasks, id, patch)?;
    debug!(task_id = %id, index, "checklist item toggled");
    append_audit(actor, "TOGGLE_CHECKLIST", "TASK", Some(id), None);
    self.tasks[idx] = updated.clone();
    Ok(updated)
  }

  pub fn play(&mut self, id: &str, now: DateTime<Utc>, actor: Option<&str>) -> Result<Task, AppError> {
    self.run_timer(id, "TASK_PLAY", actor, |task| Ok(timer::play(task, now)))
  }

  pub fn pause(&mut self, id: &str, now: DateTime<Utc>, actor: Option<&str>) -> Result<Task, AppError> {
    self.run_timer(id, "TASK_PAUSE", actor, |task| Ok(timer::pause(task, now)))
  }

  pub fn complete(&mut self, id: &str, now: DateTime<Utc>, actor: Option<&str>) -> Result<Task, AppError> {
    self.run_timer(id, "TASK_COMPLETE", actor, |task| timer::complete(task, now))
  }

  /// Runs a timer step on a copy, writes it, and only then replaces the
  /// local task. Steps that change nothing are not written.
  fn run_timer(
    &mut self,
    id: &str,
    action: &str,
    actor: Option<&str>,
    step: impl FnOnce(&mut Task) -> Result<bool, WorkflowError>,
  ) -> Result<Task, AppError> {
    let idx = self.position(id)?;
    let mut next = self.tasks[idx].clone();
    if !step(&mut next)? {
      info!(task_id = %id, action, "timer step ignored for current state");
      return Ok(next);
    }
    let patch = next.timer_patch();
    let updated: Task = repo::update_one(self.data.as_ref(), Table::Tasks, id, patch.clone()).map_err(|err| {
      warn!(task_id = %id, action, code = %err.code, "timer write failed");
      err
    })?;
    append_audit(actor, action, "TASK", Some(id), Some(&patch));
    self.tasks[idx] = updated.clone();
    Ok(updated)
  }
}

fn clean(value: Option<&str>) -> Option<String> {
  value
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .map(str::to_string)
}

fn checklist_from(items: &[String]) -> Vec<ChecklistItem> {
  items
    .iter()
    .map(|text| text.trim())
    .filter(|text| !text.is_empty())
    .map(|text| ChecklistItem {
      text: text.to_string(),
      done: false,
    })
    .collect()
}

pub fn is_overdue(task: &Task, today: NaiveDate) -> bool {
  task.status != TaskStatus::Done && task.due_date.is_some_and(|due| due < today)
}
