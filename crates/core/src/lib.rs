//! Sheetops core types: workload records, watch-event decoding, and the
//! registry the reconciler reads from.
//!
//! Everything in this crate is transport-free; the kube and mirror crates
//! plug in at trait seams one level up.

#![forbid(unsafe_code)]

mod diff;
mod framer;
mod registry;

pub use diff::{group_by_namespace, partition_diff, PartitionDiff};
pub use framer::LineFramer;
pub use registry::Registry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One workload as last observed from the cluster feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub name: String,
    pub namespace: String,
    /// Target scale declared in the control-plane object, not the count of
    /// instances currently running.
    pub declared_replicas: i32,
}

impl WorkloadRecord {
    /// Stable identity; names are unique per namespace.
    pub fn id(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }
}

/// A single decoded change from the watch feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(WorkloadRecord),
    Modified(WorkloadRecord),
    Deleted(WorkloadRecord),
    /// Event type we do not act on. Still advances the cursor.
    Other,
}

/// A decoded frame: the event plus the resource version to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event: WatchEvent,
    pub resource_version: String,
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    object: RawObject,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    metadata: RawMetadata,
    #[serde(default)]
    spec: RawSpec,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: Option<String>,
    namespace: Option<String>,
    #[serde(rename = "resourceVersion")]
    resource_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSpec {
    replicas: Option<i32>,
}

/// Decode one newline-delimited watch frame into a validated event.
///
/// Unrecognized `type` values decode to [`WatchEvent::Other`] so the caller
/// can still advance its cursor; frames missing name, namespace, or
/// resourceVersion are rejected. A missing `spec.replicas` counts as zero
/// declared replicas.
pub fn decode_event(line: &str) -> Result<DecodedEvent, EventDecodeError> {
    let raw: RawEvent = serde_json::from_str(line)?;
    let resource_version = raw
        .object
        .metadata
        .resource_version
        .ok_or(EventDecodeError::MissingField("metadata.resourceVersion"))?;
    let event = match raw.kind.as_str() {
        "ADDED" | "MODIFIED" | "DELETED" => {
            let name = raw
                .object
                .metadata
                .name
                .ok_or(EventDecodeError::MissingField("metadata.name"))?;
            let namespace = raw
                .object
                .metadata
                .namespace
                .ok_or(EventDecodeError::MissingField("metadata.namespace"))?;
            let record = WorkloadRecord {
                name,
                namespace,
                declared_replicas: raw.object.spec.replicas.unwrap_or(0).max(0),
            };
            match raw.kind.as_str() {
                "ADDED" => WatchEvent::Added(record),
                "MODIFIED" => WatchEvent::Modified(record),
                _ => WatchEvent::Deleted(record),
            }
        }
        _ => WatchEvent::Other,
    };
    Ok(DecodedEvent { event, resource_version })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: &str, ns: &str, name: &str, replicas: i32, rv: &str) -> String {
        serde_json::json!({
            "type": kind,
            "object": {
                "metadata": {"name": name, "namespace": ns, "resourceVersion": rv},
                "spec": {"replicas": replicas},
            }
        })
        .to_string()
    }

    #[test]
    fn decodes_added_modified_deleted() {
        for kind in ["ADDED", "MODIFIED", "DELETED"] {
            let d = decode_event(&frame(kind, "team-a", "api", 2, "41")).expect("decode");
            assert_eq!(d.resource_version, "41");
            let rec = match (kind, d.event) {
                ("ADDED", WatchEvent::Added(r)) => r,
                ("MODIFIED", WatchEvent::Modified(r)) => r,
                ("DELETED", WatchEvent::Deleted(r)) => r,
                (k, e) => panic!("{} decoded to {:?}", k, e),
            };
            assert_eq!(rec.id(), "team-a-api");
            assert_eq!(rec.declared_replicas, 2);
        }
    }

    #[test]
    fn unknown_type_is_other_but_keeps_cursor() {
        let d = decode_event(&frame("BOOKMARK", "team-a", "api", 2, "99")).expect("decode");
        assert_eq!(d.event, WatchEvent::Other);
        assert_eq!(d.resource_version, "99");
    }

    #[test]
    fn missing_replicas_defaults_to_zero() {
        let line = serde_json::json!({
            "type": "ADDED",
            "object": {"metadata": {"name": "api", "namespace": "ns", "resourceVersion": "1"}}
        })
        .to_string();
        match decode_event(&line).expect("decode").event {
            WatchEvent::Added(r) => assert_eq!(r.declared_replicas, 0),
            e => panic!("unexpected {:?}", e),
        }
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let no_name = serde_json::json!({
            "type": "ADDED",
            "object": {"metadata": {"namespace": "ns", "resourceVersion": "1"}}
        })
        .to_string();
        assert!(matches!(
            decode_event(&no_name),
            Err(EventDecodeError::MissingField("metadata.name"))
        ));
        let no_rv = serde_json::json!({
            "type": "DELETED",
            "object": {"metadata": {"name": "api", "namespace": "ns"}}
        })
        .to_string();
        assert!(matches!(
            decode_event(&no_rv),
            Err(EventDecodeError::MissingField("metadata.resourceVersion"))
        ));
    }

    #[test]
    fn garbage_is_a_json_error() {
        assert!(matches!(decode_event("not json"), Err(EventDecodeError::Json(_))));
    }
}
