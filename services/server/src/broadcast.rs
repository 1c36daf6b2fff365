//! Write-path broadcaster: full-payload events published by request
//! handlers so peers can update their UI without a refetch round-trip.
//!
//! Call only after the mutation has committed — never inside the
//! transaction, or a rollback would publish an event for a row that does
//! not exist. The same mutation also produces a `cache_invalidate` frame
//! through the database trigger; clients deduplicate (see tl-protocol).

use crate::hub::Hub;
use tl_protocol::ServerFrame;
use tracing::error;
use uuid::Uuid;

/// Publish a full-payload event to every session scoped to the project.
///
/// Never blocks the caller: the hub fan-out is a lock-read plus a
/// non-blocking send per recipient. Failures are logged and swallowed —
/// the trigger path is the safety net.
pub fn publish(hub: &Hub, project_id: Uuid, event_type: &str, data: impl serde::Serialize) {
    match serde_json::to_value(data) {
        Ok(value) => {
            hub.broadcast_to_project(project_id, &ServerFrame::event(event_type, project_id, value));
        }
        Err(e) => {
            error!(error = %e, event_type, "write-path event dropped: payload not serializable");
        }
    }
}

/// As [`publish`], with the affected user on the frame (membership events).
pub fn publish_with_user(
    hub: &Hub,
    project_id: Uuid,
    user_id: Uuid,
    event_type: &str,
    data: impl serde::Serialize,
) {
    match serde_json::to_value(data) {
        Ok(value) => {
            hub.broadcast_to_project(
                project_id,
                &ServerFrame::user_event(event_type, project_id, user_id, value),
            );
        }
        Err(e) => {
            error!(error = %e, event_type, "write-path event dropped: payload not serializable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Session;
    use std::time::Duration;
    use tl_protocol::event_types;

    #[tokio::test]
    async fn publish_delivers_full_payload_to_project_sessions() {
        let (hub, runner) = Hub::new();
        tokio::spawn(runner.run());
        let project = Uuid::new_v4();
        let (_session, handle, mut rx) = Session::open(Uuid::new_v4(), Some(project));
        hub.register(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        publish(
            &hub,
            project,
            event_types::TASK_CREATED,
            serde_json::json!({ "title": "ship it" }),
        );

        let json = rx.recv().await.expect("event should be delivered");
        let frame: ServerFrame = serde_json::from_str(&json).expect("frame should parse");
        assert_eq!(frame.kind, event_types::TASK_CREATED);
        assert_eq!(frame.project_id.as_deref(), Some(project.to_string().as_str()));
        assert_eq!(frame.data["title"], "ship it");
    }

    #[tokio::test]
    async fn publish_with_user_stamps_the_affected_member() {
        let (hub, runner) = Hub::new();
        tokio::spawn(runner.run());
        let project = Uuid::new_v4();
        let member = Uuid::new_v4();
        let (_session, handle, mut rx) = Session::open(Uuid::new_v4(), Some(project));
        hub.register(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        publish_with_user(
            &hub,
            project,
            member,
            event_types::MEMBER_ADDED,
            serde_json::Value::Null,
        );

        let json = rx.recv().await.expect("event should be delivered");
        let frame: ServerFrame = serde_json::from_str(&json).expect("frame should parse");
        assert_eq!(frame.kind, event_types::MEMBER_ADDED);
        assert_eq!(frame.user_id.as_deref(), Some(member.to_string().as_str()));
    }

    #[tokio::test]
    async fn unserializable_payload_is_swallowed() {
        struct Failing;
        impl serde::Serialize for Failing {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("always fails"))
            }
        }

        let (hub, runner) = Hub::new();
        tokio::spawn(runner.run());
        let project = Uuid::new_v4();
        let (_session, handle, mut rx) = Session::open(Uuid::new_v4(), Some(project));
        hub.register(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        publish(&hub, project, event_types::TASK_UPDATED, Failing);
        assert!(rx.try_recv().is_err(), "nothing should be delivered");
    }
}
