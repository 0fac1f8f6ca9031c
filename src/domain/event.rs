use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of an aggregate's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub from_state: Option<String>,
    pub to_state: Option<String>,
    pub actor: UserId,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Append-only list of [`AuditEvent`]s. There is no API to edit or remove
/// entries once recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog(Vec<AuditEvent>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(
        &mut self,
        action: &str,
        from: impl ToString,
        to: impl ToString,
        actor: UserId,
        at: DateTime<Utc>,
    ) {
        self.0.push(AuditEvent {
            action: action.to_string(),
            from_state: Some(from.to_string()),
            to_state: Some(to.to_string()),
            actor,
            at,
            note: None,
        });
    }

    pub fn record_note(&mut self, action: &str, note: impl Into<String>, actor: UserId, at: DateTime<Utc>) {
        self.0.push(AuditEvent {
            action: action.to_string(),
            from_state: None,
            to_state: None,
            actor,
            at,
            note: Some(note.into()),
        });
    }

    pub fn entries(&self) -> &[AuditEvent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&AuditEvent> {
        self.0.last()
    }
}
