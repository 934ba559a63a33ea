use tracing::info;

pub const AUDIT_TARGET: &str = "fiscal_audit";

/// Emits one audit record. The data service keeps no audit table of its own,
/// so the log stream is the trail.
pub fn append_audit(
  actor: Option<&str>,
  action: &str,
  entity_type: &str,
  entity_id: Option<&str>,
  payload: Option<&serde_json::Value>,
) {
  let payload_json = payload.map(|value| value.to_string()).unwrap_or_else(|| "{}".to_string());
  info!(
    target: AUDIT_TARGET,
    actor = actor.unwrap_or("system"),
    action,
    entity = entity_type,
    entity_id = entity_id.unwrap_or(""),
    payload = %payload_json,
    "audit"
  );
}
