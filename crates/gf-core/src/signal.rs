//! Component signal envelope: published on a well-known subject so the
//! orchestrator/API can observe component-level lifecycle and fatal
//! conditions without sharing memory with the data plane.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Ingestor,
    Join,
    Sink,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Ingestor => "ingestor",
            ComponentKind::Join => "join",
            ComponentKind::Sink => "sink",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    Started,
    Stopped,
    Failed,
}

/// `{"pipeline_id":str,"reason":str,"text":str,"component":str}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSignal {
    pub pipeline_id: String,
    pub reason: SignalReason,
    pub text: String,
    pub component: String,
}

impl ComponentSignal {
    pub fn failed(pipeline_id: impl Into<String>, component: ComponentKind, text: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            reason: SignalReason::Failed,
            text: text.into(),
            component: component.as_str().to_string(),
        }
    }

    pub fn started(pipeline_id: impl Into<String>, component: ComponentKind) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            reason: SignalReason::Started,
            text: String::new(),
            component: component.as_str().to_string(),
        }
    }

    pub fn stopped(pipeline_id: impl Into<String>, component: ComponentKind) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            reason: SignalReason::Stopped,
            text: String::new(),
            component: component.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let sig = ComponentSignal::failed("p1", ComponentKind::Sink, "clickhouse unreachable");
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json["pipeline_id"], "p1");
        assert_eq!(json["component"], "sink");
        assert_eq!(json["reason"], "failed");
        let back: ComponentSignal = serde_json::from_value(json).unwrap();
        assert_eq!(back.text, "clickhouse unreachable");
    }
}
