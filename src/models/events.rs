// Template lifecycle events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::template::ServerTemplate;

/// What happened to a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateEventKind {
    /// A template was stored; carries the template as saved
    Updated { template: ServerTemplate },
    /// A template was removed
    Deleted { server_template_id: String },
}

/// Event envelope delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEvent {
    pub id: Uuid,
    pub kind: TemplateEventKind,
    pub timestamp: DateTime<Utc>,
}

impl TemplateEvent {
    pub fn updated(template: ServerTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TemplateEventKind::Updated { template },
            timestamp: Utc::now(),
        }
    }

    pub fn deleted(server_template_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TemplateEventKind::Deleted {
                server_template_id: server_template_id.into(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Id of the template the event is about
    pub fn server_template_id(&self) -> &str {
        match &self.kind {
            TemplateEventKind::Updated { template } => &template.id,
            TemplateEventKind::Deleted { server_template_id } => server_template_id,
        }
    }
}
