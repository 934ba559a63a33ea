use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::log::append_audit;
use crate::domain::closing::{self, AdvanceInput, Transition};
use crate::domain::filters::{matches_pending_search, ClosingListFilter};
use crate::error::AppError;
use crate::models::{Client, ClosingStatus, Competence, FiscalClosing, TaxRegime};
use crate::remote::{DataService, Table};
use crate::repo;

/// A closing as shown on the board, with its client looked up.
#[derive(Debug, Clone, Serialize)]
pub struct ClosingCard {
  pub record: FiscalClosing,
  pub client_name: String,
  pub regime: Option<TaxRegime>,
  /// Set between the optimistic local move and the answer of the remote write.
  pub pending_write: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
  pub status: ClosingStatus,
  pub label: &'static str,
  pub cards: Vec<ClosingCard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
  Applied { from: ClosingStatus, to: ClosingStatus },
  Unchanged,
}

/// The closing pipeline of one competence.
pub struct ClosingBoard {
  data: Arc<dyn DataService>,
  competence: Competence,
  clients: HashMap<String, Client>,
  cards: Vec<ClosingCard>,
  pending_search: String,
}

impl ClosingBoard {
  pub fn load(data: Arc<dyn DataService>, competence: Competence) -> Result<Self, AppError> {
    let mut board = Self {
      data,
      competence,
      clients: HashMap::new(),
      cards: Vec::new(),
      pending_search: String::new(),
    };
    board.reload()?;
    Ok(board)
  }

  /// Replaces the whole slice with a fresh read.
  pub fn reload(&mut self) -> Result<(), AppError> {
    let clients = repo::list_clients(self.data.as_ref())?;
    let closings = repo::list_closings(self.data.as_ref(), self.competence)?;
    self.clients = clients
      .into_iter()
      .map(|client| (client.id.clone(), client))
      .collect();
    self.cards = closings.into_iter().map(|record| self.card_for(record)).collect();
    self
      .cards
      .sort_by(|a, b| a.client_name.to_lowercase().cmp(&b.client_name.to_lowercase()));
    Ok(())
  }

  fn card_for(&self, record: FiscalClosing) -> ClosingCard {
    let client = self.clients.get(&record.client_id);
    ClosingCard {
      client_name: client
        .map(|client| client.display_name().to_string())
        .unwrap_or_else(|| record.client_id.clone()),
      regime: client.and_then(|client| client.regime),
      record,
      pending_write: false,
    }
  }

  pub fn competence(&self) -> Competence {
    self.competence
  }

  pub fn cards(&self) -> &[ClosingCard] {
    &self.cards
  }

  pub fn card(&self, id: &str) -> Option<&ClosingCard> {
    self.cards.iter().find(|card| card.record.id == id)
  }

  pub fn set_pending_search(&mut self, term: &str) {
    self.pending_search = term.trim().to_string();
  }

  /// One column per status, in pipeline order.
  pub fn columns(&self) -> Vec<BoardColumn> {
    ClosingStatus::PIPELINE
      .into_iter()
      .map(|status| BoardColumn {
        status,
        label: status.label(),
        cards: self
          .cards
          .iter()
          .filter(|card| card.record.status == status)
          .filter(|card| matches_pending_search(&card.record, &card.client_name, &self.pending_search))
          .cloned()
          .collect(),
      })
      .collect()
  }

  pub fn list(&self, filter: &ClosingListFilter) -> Vec<ClosingCard> {
    self
      .cards
      .iter()
      .filter(|card| filter.matches(&card.record, self.clients.get(&card.record.client_id), &Local))
      .cloned()
      .collect()
  }

  pub fn advance(&mut self, id: &str, input: &AdvanceInput, actor: Option<&str>) -> Result<TransitionOutcome, AppError> {
    let idx = self.position(id)?;
    match closing::plan_advance(&self.cards[idx].record, input, Utc::now())? {
      Some(transition) => self.commit(idx, transition, actor),
      None => Ok(TransitionOutcome::Unchanged),
    }
  }

  pub fn retreat(&mut self, id: &str, confirmed: bool, actor: Option<&str>) -> Result<TransitionOutcome, AppError> {
    let idx = self.position(id)?;
    match closing::plan_retreat(&self.cards[idx].record, confirmed)? {
      Some(transition) => self.commit(idx, transition, actor),
      None => Ok(TransitionOutcome::Unchanged),
    }
  }

  fn position(&self, id: &str) -> Result<usize, AppError> {
    self
      .cards
      .iter()
      .position(|card| card.record.id == id)
      .ok_or_else(|| AppError::not_found("fiscal_closing", id))
  }

  fn commit(&mut self, idx: usize, transition: Transition, actor: Option<&str>) -> Result<TransitionOutcome, AppError> {
    let card = &mut self.cards[idx];
    let snapshot = card.record.clone();
    transition.apply(&mut card.record);
    card.pending_write = true;
    let id = card.record.id.clone();
    let patch = card.record.transition_patch();

    match self.data.update(Table::FiscalClosings, &id, patch.clone()) {
      Ok(row) => {
        let card = &mut self.cards[idx];
        match serde_json::from_value::<FiscalClosing>(row) {
          Ok(confirmed) => card.record = confirmed,
          Err(err) => warn!(closing_id = %id, error = %err, "write confirmed with undecodable row"),
        }
        card.pending_write = false;
        append_audit(actor, transition.action(), "FISCAL_CLOSING", Some(&id), Some(&patch));
        info!(
          closing_id = %id,
          from = transition.from.as_str(),
          to = transition.to.as_str(),
          "closing moved"
        );
        Ok(TransitionOutcome::Applied {
          from: transition.from,
          to: transition.to,
        })
      }
      Err(err) => {
        warn!(closing_id = %id, code = %err.code, "closing write failed, reconciling");
        self.reconcile(idx, snapshot);
        Err(err)
      }
    }
  }

  /// Re-reads only the affected record. Falls back to the pre-move snapshot
  /// when the re-read fails too.
  fn reconcile(&mut self, idx: usize, snapshot: FiscalClosing) {
    let id = snapshot.id.clone();
    match repo::get_closing(self.data.as_ref(), &id) {
      Ok(Some(record)) => {
        let card = &mut self.cards[idx];
        card.record = record;
        card.pending_write = false;
      }
      Ok(None) => {
        warn!(closing_id = %id, "closing vanished remotely, dropping card");
        self.cards.remove(idx);
      }
      Err(err) => {
        warn!(closing_id = %id, code = %err.code, "re-read failed, restoring snapshot");
        let card = &mut self.cards[idx];
        card.record = snapshot;
        card.pending_write = false;
      }
    }
  }

  /// Inserts one `pending` closing per client that has none for the
  /// competence. Returns how many were created.
  pub fn sync_missing_clients(&mut self, actor: Option<&str>) -> Result<usize, AppError> {
    let clients = repo::list_clients(self.data.as_ref())?;
    let existing = repo::list_closings(self.data.as_ref(), self.competence)?;
    let missing = closing::missing_client_ids(&clients, &existing);
    if missing.is_empty() {
      info!(competence = %self.competence, "no clients missing a closing");
      return Ok(0);
    }

    let rows = missing
      .iter()
      .map(|client_id| serde_json::to_value(FiscalClosing::pending(client_id.as_str(), self.competence)))
      .collect::<Result<Vec<_>, _>>()?;
    let inserted = self.data.insert(Table::FiscalClosings, rows)?;
    append_audit(
      actor,
      "CLOSING_SYNC",
      "FISCAL_CLOSING",
      None,
      Some(&serde_json::json!({ "competence": self.competence.label(), "clients": missing })),
    );
    info!(competence = %self.competence, created = inserted.len(), "closings created for missing clients");
    self.reload()?;
    Ok(inserted.len())
  }
}
