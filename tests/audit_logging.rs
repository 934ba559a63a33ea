mod common;

use std::io;
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use fiscal_backoffice::audit::log::{append_audit, AUDIT_TARGET};
use fiscal_backoffice::closings::ClosingBoard;
use fiscal_backoffice::domain::closing::AdvanceInput;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedBuffer {
  type Writer = BufferWriter;

  fn make_writer(&'a self) -> Self::Writer {
    BufferWriter(Arc::clone(&self.0))
  }
}

impl io::Write for BufferWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let mut guard = self
      .0
      .lock()
      .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock poisoned"))?;
    guard.extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

fn capture(run: impl FnOnce()) -> Vec<serde_json::Value> {
  let sink = SharedBuffer::default();
  let subscriber = tracing_subscriber::fmt()
    .with_writer(sink.clone())
    .json()
    .with_max_level(Level::INFO)
    .finish();
  tracing::subscriber::with_default(subscriber, run);

  let bytes = sink.0.lock().expect("lock output").clone();
  String::from_utf8(bytes)
    .expect("utf8 log output")
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(|line| serde_json::from_str(line).expect("json log line"))
    .collect()
}

fn audits(lines: &[serde_json::Value]) -> Vec<&serde_json::Value> {
  lines
    .iter()
    .filter(|line| line.get("target").and_then(|v| v.as_str()) == Some(AUDIT_TARGET))
    .collect()
}

#[test]
fn audit_records_are_structured_json() {
  let lines = capture(|| {
    append_audit(
      Some("ana@escritorio.com.br"),
      "CLOSING_ADVANCE",
      "FISCAL_CLOSING",
      Some("fc-1"),
      Some(&serde_json::json!({ "status": "docs_received" })),
    );
    append_audit(None, "CLOSING_SYNC", "FISCAL_CLOSING", None, None);
  });

  let records = audits(&lines);
  assert_eq!(records.len(), 2);
  assert_eq!(records[0].get("level").and_then(|v| v.as_str()), Some("INFO"));
  let fields = records[0].get("fields").expect("fields object");
  assert_eq!(fields["actor"], "ana@escritorio.com.br");
  assert_eq!(fields["action"], "CLOSING_ADVANCE");
  assert_eq!(fields["entity_id"], "fc-1");
  let payload: serde_json::Value = serde_json::from_str(fields["payload"].as_str().unwrap()).unwrap();
  assert_eq!(payload["status"], "docs_received");

  let fields = records[1].get("fields").expect("fields object");
  assert_eq!(fields["actor"], "system");
  assert_eq!(fields["payload"], "{}");
}

#[test]
fn board_moves_leave_an_audit_trail() {
  let data = common::backend();
  let lines = capture(|| {
    let mut board = ClosingBoard::load(data.clone(), common::competence()).unwrap();
    board.sync_missing_clients(Some(common::EMAIL)).unwrap();
    let id = board.cards()[0].record.id.clone();
    board.advance(&id, &AdvanceInput::confirmed(), Some(common::EMAIL)).unwrap();
    assert!(board.advance(&id, &AdvanceInput::default(), Some(common::EMAIL)).is_err());
  });

  let actions: Vec<&str> = audits(&lines)
    .iter()
    .filter_map(|line| line["fields"]["action"].as_str())
    .collect();
  assert_eq!(actions, vec!["CLOSING_SYNC", "CLOSING_ADVANCE"]);
}
