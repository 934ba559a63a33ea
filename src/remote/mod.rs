//! Boundary to the hosted data/auth service.
//!
//! Rows travel as JSON objects keyed by an opaque `id` string. Filtering and
//! ordering mirror what the row API offers: AND-combined column predicates,
//! one order column and an optional limit.

pub mod rest;

use std::cmp::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::error::AppError;
use crate::models::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  Clients,
  Categories,
  Tasks,
  TaskCategories,
  FiscalClosings,
  TaxGuides,
  ObligationTypes,
  AppUsers,
}

impl Table {
  pub const ALL: [Table; 8] = [
    Table::Clients,
    Table::Categories,
    Table::Tasks,
    Table::TaskCategories,
    Table::FiscalClosings,
    Table::TaxGuides,
    Table::ObligationTypes,
    Table::AppUsers,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Table::Clients => "clients",
      Table::Categories => "categories",
      Table::Tasks => "tasks",
      Table::TaskCategories => "task_categories",
      Table::FiscalClosings => "fiscal_closings",
      Table::TaxGuides => "tax_guides",
      Table::ObligationTypes => "obligation_types",
      Table::AppUsers => "app_users",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
  Eq,
  Neq,
  Gt,
  Gte,
  Lt,
  Lte,
  /// Case-insensitive substring.
  ILike,
  IsNull,
}

impl FilterOp {
  pub fn as_str(self) -> &'static str {
    match self {
      FilterOp::Eq => "eq",
      FilterOp::Neq => "neq",
      FilterOp::Gt => "gt",
      FilterOp::Gte => "gte",
      FilterOp::Lt => "lt",
      FilterOp::Lte => "lte",
      FilterOp::ILike => "ilike",
      FilterOp::IsNull => "is",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
  pub column: String,
  pub op: FilterOp,
  pub value: Value,
}

impl Filter {
  pub fn matches(&self, row: &Value) -> bool {
    let field = row.get(&self.column).unwrap_or(&Value::Null);
    match self.op {
      FilterOp::IsNull => field.is_null(),
      FilterOp::ILike => match (field.as_str(), self.value.as_str()) {
        (Some(haystack), Some(needle)) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        _ => false,
      },
      FilterOp::Eq => !field.is_null() && compare_values(field, &self.value) == Some(Ordering::Equal),
      FilterOp::Neq => compare_values(field, &self.value) != Some(Ordering::Equal),
      FilterOp::Gt => compare_values(field, &self.value) == Some(Ordering::Greater),
      FilterOp::Gte => matches!(
        compare_values(field, &self.value),
        Some(Ordering::Greater | Ordering::Equal)
      ),
      FilterOp::Lt => compare_values(field, &self.value) == Some(Ordering::Less),
      FilterOp::Lte => matches!(
        compare_values(field, &self.value),
        Some(Ordering::Less | Ordering::Equal)
      ),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
  pub column: String,
  pub ascending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
  pub filters: Vec<Filter>,
  pub order: Option<Order>,
  pub limit: Option<usize>,
}

impl Query {
  pub fn new() -> Self {
    Self::default()
  }

  fn push(mut self, column: &str, op: FilterOp, value: Value) -> Self {
    self.filters.push(Filter {
      column: column.to_string(),
      op,
      value,
    });
    self
  }

  pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, FilterOp::Eq, value.into())
  }

  pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, FilterOp::Neq, value.into())
  }

  pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, FilterOp::Gte, value.into())
  }

  pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, FilterOp::Gt, value.into())
  }

  pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, FilterOp::Lt, value.into())
  }

  pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, FilterOp::Lte, value.into())
  }

  pub fn ilike(self, column: &str, needle: &str) -> Self {
    self.push(column, FilterOp::ILike, Value::from(needle))
  }

  pub fn is_null(self, column: &str) -> Self {
    self.push(column, FilterOp::IsNull, Value::Null)
  }

  pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
    self.order = Some(Order {
      column: column.to_string(),
      ascending,
    });
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  /// Applies the query to rows already in memory.
  pub fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
    let mut rows: Vec<Value> = rows
      .into_iter()
      .filter(|row| self.filters.iter().all(|filter| filter.matches(row)))
      .collect();
    if let Some(order) = &self.order {
      rows.sort_by(|a, b| {
        let left = a.get(&order.column).unwrap_or(&Value::Null);
        let right = b.get(&order.column).unwrap_or(&Value::Null);
        let ordering = match (left.is_null(), right.is_null()) {
          (true, true) => Ordering::Equal,
          (true, false) => return Ordering::Greater,
          (false, true) => return Ordering::Less,
          (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
        };
        if order.ascending {
          ordering
        } else {
          ordering.reverse()
        }
      });
    }
    if let Some(limit) = self.limit {
      rows.truncate(limit);
    }
    rows
  }
}

/// Orders two JSON scalars. Timestamps and dates compare chronologically,
/// other strings lexically, numbers numerically.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
  match (left, right) {
    (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
    (Value::String(a), Value::String(b)) => {
      if let (Ok(a), Ok(b)) = (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        return Some(a.cmp(&b));
      }
      if let (Ok(a), Ok(b)) = (
        NaiveDate::parse_from_str(a, "%Y-%m-%d"),
        NaiveDate::parse_from_str(b, "%Y-%m-%d"),
      ) {
        return Some(a.cmp(&b));
      }
      Some(a.cmp(b))
    }
    _ => None,
  }
}

pub trait DataService: Send + Sync {
  fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, AppError>;
  fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, AppError>;
  fn update(&self, table: Table, id: &str, patch: Value) -> Result<Value, AppError>;
  fn delete(&self, table: Table, id: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
  SignedIn(Session),
  SignedOut,
}

pub trait AuthService: Send + Sync {
  fn current_session(&self) -> Result<Option<Session>, AppError>;
  fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError>;
  fn sign_out(&self) -> Result<(), AppError>;
  fn subscribe(&self) -> Receiver<AuthEvent>;
}

/// Fan-out of auth events to every live subscriber.
#[derive(Default)]
pub struct Subscribers {
  senders: Mutex<Vec<Sender<AuthEvent>>>,
}

impl Subscribers {
  pub fn subscribe(&self) -> Receiver<AuthEvent> {
    let (tx, rx) = mpsc::channel();
    if let Ok(mut senders) = self.senders.lock() {
      senders.push(tx);
    }
    rx
  }

  pub fn broadcast(&self, event: AuthEvent) {
    if let Ok(mut senders) = self.senders.lock() {
      senders.retain(|sender| sender.send(event.clone()).is_ok());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn rows() -> Vec<Value> {
    vec![
      json!({ "id": "1", "name": "Padaria Central", "completed_at": "2026-03-01T23:59:59.500Z", "n": 3 }),
      json!({ "id": "2", "name": "Oficina do Joao", "completed_at": "2026-03-02T00:00:00Z", "n": 1 }),
      json!({ "id": "3", "name": "Mercado Sol", "completed_at": null, "n": 2 }),
    ]
  }

  #[test]
  fn timestamp_ranges_compare_chronologically() {
    let query = Query::new()
      .gte("completed_at", "2026-03-01T00:00:00Z")
      .lt("completed_at", "2026-03-02T00:00:00Z");
    let out = query.apply(rows());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["id"], "1");
  }

  #[test]
  fn ilike_and_null_filters() {
    assert_eq!(Query::new().ilike("name", "central").apply(rows()).len(), 1);
    assert_eq!(Query::new().is_null("completed_at").apply(rows())[0]["id"], "3");
    assert_eq!(Query::new().neq("id", "1").apply(rows()).len(), 2);
  }

  #[test]
  fn order_puts_nulls_last_and_limits() {
    let out = Query::new().order_by("completed_at", false).limit(2).apply(rows());
    assert_eq!(out[0]["id"], "2");
    assert_eq!(out[1]["id"], "1");
    let out = Query::new().order_by("n", true).apply(rows());
    let ids: Vec<&str> = out.iter().filter_map(|row| row["id"].as_str()).collect();
    assert_eq!(ids, vec!["2", "3", "1"]);
  }

  #[test]
  fn dropped_subscribers_are_pruned() {
    let subscribers = Subscribers::default();
    let rx = subscribers.subscribe();
    drop(subscribers.subscribe());
    subscribers.broadcast(AuthEvent::SignedOut);
    assert_eq!(rx.try_recv(), Ok(AuthEvent::SignedOut));
    assert_eq!(subscribers.senders.lock().unwrap().len(), 1);
  }
}
