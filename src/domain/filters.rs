use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::domain::calendar;
use crate::models::{Client, ClosingStatus, FiscalClosing, ImportType, TaxRegime};

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
  let needle = needle.trim();
  needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Search box of the pending column. Other columns ignore it.
pub fn matches_pending_search(closing: &FiscalClosing, client_name: &str, term: &str) -> bool {
  closing.status != ClosingStatus::Pending || contains_ci(client_name, term)
}

/// Filters of the competence list view, combined with AND. `completed_on`
/// is a day of the office clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClosingListFilter {
  #[serde(default)]
  pub client_name: Option<String>,
  #[serde(default)]
  pub regime: Option<TaxRegime>,
  #[serde(default)]
  pub status: Option<ClosingStatus>,
  #[serde(default)]
  pub import_type: Option<ImportType>,
  #[serde(default)]
  pub completed_on: Option<NaiveDate>,
}

impl ClosingListFilter {
  pub fn matches<Tz: TimeZone>(&self, closing: &FiscalClosing, client: Option<&Client>, tz: &Tz) -> bool {
    if let Some(name) = self.client_name.as_deref() {
      let display = client.map(Client::display_name).unwrap_or("");
      let legal = client.map(|c| c.name.as_str()).unwrap_or("");
      if !contains_ci(display, name) && !contains_ci(legal, name) {
        return false;
      }
    }
    if let Some(regime) = self.regime {
      if client.and_then(|c| c.regime) != Some(regime) {
        return false;
      }
    }
    if let Some(status) = self.status {
      if closing.status != status {
        return false;
      }
    }
    if let Some(import_type) = self.import_type {
      if closing.import_type() != Some(import_type) {
        return false;
      }
    }
    if let Some(day) = self.completed_on {
      if closing.completed_at.map(|at| calendar::local_day(at, tz)) != Some(day) {
        return false;
      }
    }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{Competence, ImportMetadata};
  use chrono::{FixedOffset, Utc};

  fn client(name: &str, regime: TaxRegime) -> Client {
    Client {
      id: "cli-1".to_string(),
      name: name.to_string(),
      trade_name: None,
      document: None,
      regime: Some(regime),
    }
  }

  #[test]
  fn pending_search_only_narrows_pending_column() {
    let mut closing = FiscalClosing::pending("cli-1", Competence::parse("2026-02").unwrap());
    assert!(matches_pending_search(&closing, "Padaria Central", "padaria"));
    assert!(!matches_pending_search(&closing, "Padaria Central", "oficina"));
    closing.status = ClosingStatus::Analysis;
    assert!(matches_pending_search(&closing, "Padaria Central", "oficina"));
  }

  #[test]
  fn list_filters_combine_with_and() {
    let mut closing = FiscalClosing::pending("cli-1", Competence::parse("2026-02").unwrap());
    closing.status = ClosingStatus::Done;
    closing.completed_at = Some(Utc.with_ymd_and_hms(2026, 3, 5, 14, 0, 0).unwrap());
    closing.import = Some(ImportMetadata {
      import_type: ImportType::Manual,
      error_reason: None,
      adjustment_details: None,
    });
    let owner = client("Padaria Central LTDA", TaxRegime::SimplesNacional);

    let mut filter = ClosingListFilter {
      client_name: Some("CENTRAL".to_string()),
      regime: Some(TaxRegime::SimplesNacional),
      status: Some(ClosingStatus::Done),
      import_type: Some(ImportType::Manual),
      completed_on: NaiveDate::from_ymd_opt(2026, 3, 5),
    };
    assert!(filter.matches(&closing, Some(&owner), &Utc));

    filter.regime = Some(TaxRegime::LucroReal);
    assert!(!filter.matches(&closing, Some(&owner), &Utc));

    filter.regime = None;
    filter.completed_on = NaiveDate::from_ymd_opt(2026, 3, 6);
    assert!(!filter.matches(&closing, Some(&owner), &Utc));

    assert!(ClosingListFilter::default().matches(&closing, None, &Utc));
  }

  #[test]
  fn completed_on_is_read_on_the_office_clock() {
    let mut closing = FiscalClosing::pending("cli-1", Competence::parse("2026-02").unwrap());
    closing.status = ClosingStatus::Done;
    closing.completed_at = Some(Utc.with_ymd_and_hms(2026, 3, 6, 1, 15, 0).unwrap());
    let filter = ClosingListFilter {
      completed_on: NaiveDate::from_ymd_opt(2026, 3, 5),
      ..ClosingListFilter::default()
    };
    let brt = FixedOffset::west_opt(3 * 3600).unwrap();
    assert!(filter.matches(&closing, None, &brt));
    assert!(!filter.matches(&closing, None, &Utc));
  }
}
