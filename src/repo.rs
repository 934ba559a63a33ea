use chrono::{NaiveDate, TimeZone};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::calendar;
use crate::error::AppError;
use crate::models::{
  Category, Client, Competence, FiscalClosing, TaskCategory, Task, TaxGuide,
};
use crate::remote::{DataService, Query, Table};

pub fn fetch_all<T: DeserializeOwned>(data: &dyn DataService, table: Table, query: &Query) -> Result<Vec<T>, AppError> {
  data
    .select(table, query)?
    .into_iter()
    .map(|row| serde_json::from_value(row).map_err(AppError::from))
    .collect()
}

pub fn fetch_by_id<T: DeserializeOwned>(data: &dyn DataService, table: Table, id: &str) -> Result<Option<T>, AppError> {
  let mut rows = fetch_all(data, table, &Query::new().eq("id", id).limit(1))?;
  Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
}

pub fn insert_one<T: Serialize + DeserializeOwned>(data: &dyn DataService, table: Table, item: &T) -> Result<T, AppError> {
  let row = serde_json::to_value(item)?;
  let mut inserted = data.insert(table, vec![row])?;
  if inserted.is_empty() {
    return Err(AppError::new("REMOTE_EMPTY", format!("Insercao em {} sem retorno", table.as_str())));
  }
  Ok(serde_json::from_value(inserted.swap_remove(0))?)
}

pub fn update_one<T: DeserializeOwned>(data: &dyn DataService, table: Table, id: &str, patch: Value) -> Result<T, AppError> {
  Ok(serde_json::from_value(data.update(table, id, patch)?)?)
}

pub fn list_clients(data: &dyn DataService) -> Result<Vec<Client>, AppError> {
  fetch_all(data, Table::Clients, &Query::new().order_by("name", true))
}

pub fn list_categories(data: &dyn DataService) -> Result<Vec<Category>, AppError> {
  fetch_all(data, Table::Categories, &Query::new().order_by("name", true))
}

pub fn list_task_standards(data: &dyn DataService) -> Result<Vec<TaskCategory>, AppError> {
  fetch_all(data, Table::TaskCategories, &Query::new().order_by("title", true))
}

pub fn list_closings(data: &dyn DataService, competence: Competence) -> Result<Vec<FiscalClosing>, AppError> {
  fetch_all(
    data,
    Table::FiscalClosings,
    &Query::new().eq("competence", String::from(competence)),
  )
}

pub fn get_closing(data: &dyn DataService, id: &str) -> Result<Option<FiscalClosing>, AppError> {
  fetch_by_id(data, Table::FiscalClosings, id)
}

pub fn list_tasks(data: &dyn DataService) -> Result<Vec<Task>, AppError> {
  fetch_all(data, Table::Tasks, &Query::new().order_by("created_at", true))
}

/// Tasks whose `completed_at` falls on `day` of the office clock `tz`.
pub fn list_tasks_completed_on<Tz: TimeZone>(
  data: &dyn DataService,
  day: NaiveDate,
  tz: &Tz,
) -> Result<Vec<Task>, AppError> {
  let (start, end) = calendar::day_bounds(day, tz);
  fetch_all(
    data,
    Table::Tasks,
    &Query::new()
      .gte("completed_at", start.to_rfc3339())
      .lt("completed_at", end.to_rfc3339())
      .order_by("completed_at", true),
  )
}

pub fn list_tax_guides(data: &dyn DataService) -> Result<Vec<TaxGuide>, AppError> {
  fetch_all(data, Table::TaxGuides, &Query::new().order_by("due_date", true))
}
