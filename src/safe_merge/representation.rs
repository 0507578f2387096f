//! Response bodies for safe-merge commands.

use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;
use crate::types::{Build, QueueItem};

/// A queue entry that has not started running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedBuild {
    pub id: u64,
    pub url: String,
    pub is_cancelled: bool,
    pub is_stuck: bool,
    pub why: String,
}

/// A running or finished execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningBuild {
    pub id: u64,
    pub url: String,
    pub full_display_name: String,
    pub in_progress: bool,
    /// Milliseconds.
    pub duration: u64,
    pub result: Option<String>,
    pub queue_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildRepresentation {
    Running(RunningBuild),
    Queued(QueuedBuild),
}

impl BuildRepresentation {
    pub fn queued(item: &QueueItem, config: &BridgeConfig) -> Self {
        BuildRepresentation::Queued(QueuedBuild {
            id: item.id.0,
            url: config.absolute_url(&item.url),
            is_cancelled: item.cancelled,
            is_stuck: item.stuck,
            why: item.why.clone().unwrap_or_default(),
        })
    }

    pub fn running(build: &Build, config: &BridgeConfig) -> Self {
        BuildRepresentation::Running(RunningBuild {
            id: build.number.0,
            url: config.absolute_url(&build.url),
            full_display_name: build.full_display_name.clone(),
            in_progress: build.in_progress,
            duration: build.duration_ms,
            result: build.result.map(|r| r.as_str().to_string()),
            queue_id: build.queue_id.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{bridge_config, sample_build, sample_queue_item};
    use crate::types::BuildResult;

    #[test]
    fn queued_wire_shape() {
        let mut item = sample_queue_item(12);
        item.why = Some("Waiting for executor".into());
        let json = serde_json::to_value(BuildRepresentation::queued(&item, &bridge_config())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 12,
                "url": "https://ci.example.com/queue/item/12/",
                "isCancelled": false,
                "isStuck": false,
                "why": "Waiting for executor",
            })
        );
    }

    #[test]
    fn running_wire_shape() {
        let mut build = sample_build(4, 12);
        build.in_progress = false;
        build.result = Some(BuildResult::Unstable);
        let json = serde_json::to_value(BuildRepresentation::running(&build, &bridge_config())).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["queueId"], 12);
        assert_eq!(json["result"], "UNSTABLE");
        assert_eq!(json["inProgress"], false);
        assert_eq!(json["url"], "https://ci.example.com/job/backend/4/");
    }

    #[test]
    fn untagged_deserialization_picks_variant() {
        let queued: BuildRepresentation = serde_json::from_str(
            r#"{"id":1,"url":"u","isCancelled":true,"isStuck":false,"why":""}"#,
        )
        .unwrap();
        assert!(matches!(queued, BuildRepresentation::Queued(q) if q.is_cancelled));

        let running: BuildRepresentation = serde_json::from_str(
            r#"{"id":2,"url":"u","fullDisplayName":"backend #2","inProgress":true,"duration":0,"result":null,"queueId":1}"#,
        )
        .unwrap();
        assert!(matches!(running, BuildRepresentation::Running(r) if r.queue_id == 1));
    }
}
