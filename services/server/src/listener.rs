use crate::hub::Hub;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tl_protocol::{actions, resources, ChangeNotification, ServerFrame, CACHE_INVALIDATE_CHANNEL};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Shutdown,
    ConnectionLost,
}

/// Where a notification fans out.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Route {
    /// Project creation/deletion invalidates every client's project list,
    /// whatever project they currently have selected.
    AllSessions,
    Project(Uuid),
}

/// Long-lived notification pump.
///
/// Holds its own `PgListener` connection — never one from the handler
/// pool — subscribed to the `cache_invalidate` channel, and forwards every
/// parsed notification to the hub. On connection loss it backs off
/// (1 s doubling to a 30 s cap), reconnects, re-subscribes, and tells all
/// sessions to refetch with a single `reconnect` frame. A shutdown signal
/// exits immediately without reconnecting.
pub async fn run(database_url: String, hub: Arc<Hub>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = INITIAL_BACKOFF;
    let mut recovering = false;
    loop {
        match subscribe(&database_url).await {
            Ok(mut listener) => {
                info!(channel = CACHE_INVALIDATE_CHANNEL, "change listener subscribed");
                if recovering {
                    hub.broadcast_to_all(&ServerFrame::reconnect());
                    recovering = false;
                }
                backoff = INITIAL_BACKOFF;
                match pump(&mut listener, &hub, &mut shutdown).await {
                    Exit::Shutdown => {
                        info!("change listener shut down");
                        return;
                    }
                    Exit::ConnectionLost => warn!("change listener connection lost"),
                }
            }
            Err(e) => {
                warn!(error = %e, "change listener failed to subscribe");
            }
        }

        recovering = true;
        tokio::select! {
            _ = shutdown.changed() => {
                info!("change listener shut down");
                return;
            }
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn subscribe(database_url: &str) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect(database_url).await?;
    listener.listen(CACHE_INVALIDATE_CHANNEL).await?;
    Ok(listener)
}

async fn pump(
    listener: &mut PgListener,
    hub: &Hub,
    shutdown: &mut watch::Receiver<bool>,
) -> Exit {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Exit::Shutdown,
            received = listener.try_recv() => match received {
                Ok(Some(notification)) => dispatch(hub, notification.payload()),
                Ok(None) => return Exit::ConnectionLost,
                Err(e) => {
                    warn!(error = %e, "change listener receive error");
                    return Exit::ConnectionLost;
                }
            }
        }
    }
}

/// Parse one payload and fan it out. A bad payload never affects the ones
/// after it: log and drop.
fn dispatch(hub: &Hub, payload: &str) {
    let note: ChangeNotification = match serde_json::from_str(payload) {
        Ok(note) => note,
        Err(e) => {
            warn!(error = %e, payload, "dropping malformed change notification");
            return;
        }
    };
    match classify(&note) {
        Some(Route::AllSessions) => hub.broadcast_to_all(&ServerFrame::cache_invalidate(&note)),
        Some(Route::Project(project_id)) => {
            hub.broadcast_to_project(project_id, &ServerFrame::cache_invalidate(&note));
        }
        None => {}
    }
}

pub(crate) fn classify(note: &ChangeNotification) -> Option<Route> {
    let Ok(project_id) = note.project_id.parse::<Uuid>() else {
        warn!(
            resource = %note.resource,
            project_id = %note.project_id,
            "dropping change notification without a valid project id"
        );
        return None;
    };
    // The triggers only emit watched resources; anything else arriving on
    // the channel is logged and dropped.
    if !resources::is_known(&note.resource) {
        warn!(resource = %note.resource, "dropping change notification for unknown resource");
        return None;
    }
    if note.resource == resources::PROJECT
        && (note.action == actions::INSERT || note.action == actions::DELETE)
    {
        Some(Route::AllSessions)
    } else {
        Some(Route::Project(project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(resource: &str, action: &str, project_id: &str) -> ChangeNotification {
        ChangeNotification {
            resource: resource.to_owned(),
            id: "row-1".to_owned(),
            action: action.to_owned(),
            project_id: project_id.to_owned(),
            timestamp: "2026-08-01T12:00:00+00:00".to_owned(),
        }
    }

    #[test]
    fn project_insert_and_delete_fan_out_to_all_sessions() {
        let project = Uuid::new_v4().to_string();
        assert_eq!(
            classify(&note("project", "INSERT", &project)),
            Some(Route::AllSessions)
        );
        assert_eq!(
            classify(&note("project", "DELETE", &project)),
            Some(Route::AllSessions)
        );
    }

    #[test]
    fn project_update_stays_project_scoped() {
        let project = Uuid::new_v4();
        assert_eq!(
            classify(&note("project", "UPDATE", &project.to_string())),
            Some(Route::Project(project))
        );
    }

    #[test]
    fn watched_resources_route_to_their_project() {
        let project = Uuid::new_v4();
        for resource in ["sprint", "task", "message", "project_members"] {
            assert_eq!(
                classify(&note(resource, "INSERT", &project.to_string())),
                Some(Route::Project(project)),
                "{resource} should be project-scoped"
            );
        }
    }

    #[test]
    fn empty_or_invalid_project_id_is_dropped() {
        assert_eq!(classify(&note("task", "UPDATE", "")), None);
        assert_eq!(classify(&note("task", "UPDATE", "not-a-uuid")), None);
    }

    #[test]
    fn unknown_resource_is_dropped() {
        let project = Uuid::new_v4().to_string();
        assert_eq!(classify(&note("audit_log", "INSERT", &project)), None);
    }

    #[tokio::test]
    async fn dispatch_drops_malformed_payload_without_panicking() {
        let (hub, runner) = Hub::new();
        tokio::spawn(runner.run());
        dispatch(&hub, "{not json");
        dispatch(&hub, r#"{"resource":"task"}"#);
    }

    #[tokio::test]
    async fn dispatch_delivers_to_scoped_session() {
        let (hub, runner) = Hub::new();
        tokio::spawn(runner.run());
        let project = Uuid::new_v4();
        let (_session, handle, mut rx) =
            crate::hub::Session::open(Uuid::new_v4(), Some(project));
        hub.register(handle);
        // Let the serializer process the registration.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let payload = serde_json::to_string(&note("task", "UPDATE", &project.to_string()))
            .expect("serialize");
        dispatch(&hub, &payload);

        let delivered = rx.recv().await.expect("frame should be delivered");
        assert!(delivered.contains("cache_invalidate"));
        assert!(delivered.contains(&project.to_string()));
    }
}
