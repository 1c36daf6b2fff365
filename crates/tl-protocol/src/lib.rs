// tl-protocol: wire types for the teamline realtime core.
//
// All client-facing frames use a top-level `type` field for discriminated
// (de)serialization. Field names are camelCase on the wire.
//
// # Dual-path delivery contract
//
// One committed mutation reaches clients twice, on purpose:
//
// 1. The *broadcast path*: the request handler publishes a full-payload
//    event (e.g. `task_updated`) immediately after commit.
// 2. The *trigger path*: a database trigger emits a compact
//    `cache_invalidate` notification for the same row.
//
// The two paths have different failure modes (the broadcast path can be
// skipped by a crashed handler; the trigger path can miss a window while
// the listener reconnects), so neither is collapsed into the other. Clients
// MUST treat frames as duplicate-tolerant, keyed by
// `{resource, id, action}` or equivalent: applying the same event twice
// must leave the client in the same state as applying it once. No ordering
// is promised between the two paths; within one path, frames for a given
// project arrive in commit order.
//
// After a listener outage the server sends a single `reconnect` frame;
// clients respond by refetching authoritative state for their project.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The single Postgres NOTIFY channel all watched tables emit on.
pub const CACHE_INVALIDATE_CHANNEL: &str = "cache_invalidate";

// ---------------------------------------------------------------------------
// Trigger payload
// ---------------------------------------------------------------------------

/// Payload emitted by the database triggers on every watched row mutation.
///
/// Bounded by the Postgres notification limit (8 KiB); in practice well
/// under 1 KiB. `project_id` is never absent — rows without one are skipped
/// at the trigger. For `project_members` rows, `id` is the composite
/// `"{projectId}:{userId}"` because that table has no single-column key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Singular table name, except `project_members` which stays as-is.
    pub resource: String,
    /// Row primary key, or the membership composite id.
    pub id: String,
    /// "INSERT" | "UPDATE" | "DELETE" (Postgres TG_OP spelling).
    pub action: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    /// ISO-8601 with timezone, as Postgres serializes `now()`.
    pub timestamp: String,
}

/// Watched resource names as they appear in `ChangeNotification::resource`.
pub mod resources {
    pub const PROJECT: &str = "project";
    pub const SPRINT: &str = "sprint";
    pub const TASK: &str = "task";
    pub const MESSAGE: &str = "message";
    pub const PROJECT_MEMBERS: &str = "project_members";

    pub fn is_known(resource: &str) -> bool {
        matches!(
            resource,
            PROJECT | SPRINT | TASK | MESSAGE | PROJECT_MEMBERS
        )
    }
}

/// Mutation actions as emitted by the triggers.
pub mod actions {
    pub const INSERT: &str = "INSERT";
    pub const UPDATE: &str = "UPDATE";
    pub const DELETE: &str = "DELETE";
}

// ---------------------------------------------------------------------------
// Server -> client frames
// ---------------------------------------------------------------------------

/// Frame types originated by the server outside the per-handler events.
pub mod frame_types {
    pub const CACHE_INVALIDATE: &str = "cache_invalidate";
    pub const RECONNECT: &str = "reconnect";
}

/// Full-payload event types published by request handlers after commit.
pub mod event_types {
    pub const MESSAGE_CREATED: &str = "message_created";
    pub const MEMBER_ADDED: &str = "member_added";
    pub const MEMBER_REMOVED: &str = "member_removed";
    pub const TASK_CREATED: &str = "task_created";
    pub const TASK_UPDATED: &str = "task_updated";
    pub const TASK_DELETED: &str = "task_deleted";
    pub const SPRINT_CREATED: &str = "sprint_created";
    pub const SPRINT_UPDATED: &str = "sprint_updated";
    pub const SPRINT_DELETED: &str = "sprint_deleted";
    pub const PROJECT_UPDATED: &str = "project_updated";
    pub const PROJECT_DELETED: &str = "project_deleted";
}

/// A client-bound frame.
///
/// `kind` is `cache_invalidate`, `reconnect`, or one of [`event_types`].
/// The resource/action/projectId fields are populated for
/// `cache_invalidate`; event frames carry `projectId` (and `userId` for
/// membership events) plus the full resource payload in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, rename = "projectId", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ServerFrame {
    /// The trigger-path frame: compact metadata, no resource body.
    pub fn cache_invalidate(note: &ChangeNotification) -> Self {
        Self {
            kind: frame_types::CACHE_INVALIDATE.to_owned(),
            resource: Some(note.resource.clone()),
            action: Some(note.action.clone()),
            project_id: Some(note.project_id.clone()),
            user_id: None,
            data: serde_json::json!({
                "id": note.id,
                "timestamp": note.timestamp,
            }),
        }
    }

    /// Sent once to every session after the listener recovers from a
    /// connection loss; clients refetch authoritative state.
    pub fn reconnect() -> Self {
        Self {
            kind: frame_types::RECONNECT.to_owned(),
            resource: None,
            action: None,
            project_id: None,
            user_id: None,
            data: serde_json::json!({ "reason": "notify_reconnect" }),
        }
    }

    /// A broadcast-path event frame with the full resource payload.
    pub fn event(kind: &str, project_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            kind: kind.to_owned(),
            resource: None,
            action: None,
            project_id: Some(project_id.to_string()),
            user_id: None,
            data,
        }
    }

    /// An event frame that also names the affected user (membership events).
    pub fn user_event(
        kind: &str,
        project_id: Uuid,
        user_id: Uuid,
        data: serde_json::Value,
    ) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::event(kind, project_id, data)
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> server frames
// ---------------------------------------------------------------------------

/// A client-originated frame.
///
/// Unknown `type` values decode to [`ClientFrame::Unknown`]; the server
/// logs and ignores them without dropping the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe this session to a project.
    JoinProject {
        #[serde(rename = "projectId")]
        project_id: String,
    },
    /// Clear this session's project scope.
    LeaveProject,
    /// Optional first frame carrying the auth token (preferred over the
    /// query string, which ends up in access logs) and initial scope.
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, rename = "projectId", skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
    },
    /// Application-level heartbeat; accepted silently. The transport-level
    /// ping/pong is what resets the read deadline.
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Close codes
// ---------------------------------------------------------------------------

/// WebSocket close codes used at the session endpoint.
pub mod close_codes {
    /// Normal closure, sent by the write pump when the hub closes the outbox.
    pub const NORMAL: u16 = 1000;
    /// Policy violation: upgrade without any token.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Invalid or expired token (private-range code).
    pub const AUTH_FAILURE: u16 = 4401;
}

// ---------------------------------------------------------------------------
// HTTP error envelope
// ---------------------------------------------------------------------------

/// Frozen HTTP error envelope used by all non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_notification_round_trips_with_camel_case_project_id() {
        let json = r#"{"resource":"task","id":"t1","action":"UPDATE","projectId":"p1","timestamp":"2026-08-01T12:00:00+00:00"}"#;
        let note: ChangeNotification = serde_json::from_str(json).expect("payload should parse");
        assert_eq!(note.resource, resources::TASK);
        assert_eq!(note.project_id, "p1");
        assert_eq!(serde_json::to_string(&note).expect("serialize"), json);
    }

    #[test]
    fn cache_invalidate_frame_copies_routing_fields() {
        let note = ChangeNotification {
            resource: resources::PROJECT_MEMBERS.to_owned(),
            id: "p1:u1".to_owned(),
            action: actions::INSERT.to_owned(),
            project_id: "p1".to_owned(),
            timestamp: "2026-08-01T12:00:00+00:00".to_owned(),
        };
        let frame = ServerFrame::cache_invalidate(&note);
        let value = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(value["type"], "cache_invalidate");
        assert_eq!(value["resource"], "project_members");
        assert_eq!(value["action"], "INSERT");
        assert_eq!(value["projectId"], "p1");
        assert_eq!(value["data"]["id"], "p1:u1");
        assert!(value.get("userId").is_none());
    }

    #[test]
    fn event_frame_omits_empty_optional_fields() {
        let project = Uuid::new_v4();
        let frame = ServerFrame::event(
            event_types::TASK_CREATED,
            project,
            serde_json::json!({ "title": "draft the roadmap" }),
        );
        let value = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(value["type"], "task_created");
        assert_eq!(value["projectId"], project.to_string());
        assert!(value.get("resource").is_none());
        assert!(value.get("action").is_none());
    }

    #[test]
    fn user_event_frame_carries_user_id() {
        let project = Uuid::new_v4();
        let user = Uuid::new_v4();
        let frame = ServerFrame::user_event(
            event_types::MEMBER_ADDED,
            project,
            user,
            serde_json::Value::Null,
        );
        assert_eq!(frame.user_id.as_deref(), Some(user.to_string().as_str()));
    }

    #[test]
    fn reconnect_frame_names_its_reason() {
        let value = serde_json::to_value(ServerFrame::reconnect()).expect("serialize");
        assert_eq!(value["type"], "reconnect");
        assert_eq!(value["data"]["reason"], "notify_reconnect");
    }

    #[test]
    fn client_frames_parse_by_type_tag() {
        let join: ClientFrame =
            serde_json::from_str(r#"{"type":"join_project","projectId":"p1"}"#).expect("join");
        assert_eq!(
            join,
            ClientFrame::JoinProject {
                project_id: "p1".to_owned()
            }
        );

        let leave: ClientFrame =
            serde_json::from_str(r#"{"type":"leave_project"}"#).expect("leave");
        assert_eq!(leave, ClientFrame::LeaveProject);

        let init: ClientFrame =
            serde_json::from_str(r#"{"type":"init","token":"tok","projectId":"p1"}"#)
                .expect("init");
        assert_eq!(
            init,
            ClientFrame::Init {
                token: Some("tok".to_owned()),
                project_id: Some("p1".to_owned()),
            }
        );

        let ping: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).expect("ping");
        assert_eq!(ping, ClientFrame::Ping);
    }

    #[test]
    fn unrecognized_client_frame_type_decodes_to_unknown() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe_everything"}"#).expect("unknown tag");
        assert_eq!(frame, ClientFrame::Unknown);
    }

    #[test]
    fn known_resources_cover_the_watched_tables() {
        for resource in ["project", "sprint", "task", "message", "project_members"] {
            assert!(resources::is_known(resource), "{resource} should be known");
        }
        assert!(!resources::is_known("projects"));
        assert!(!resources::is_known("audit_log"));
    }
}
