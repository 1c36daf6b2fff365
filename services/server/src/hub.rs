use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tl_protocol::ServerFrame;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outbound frames buffered per session before the slow-consumer policy
/// kicks in. Overflow evicts the session; it does not grow the buffer.
pub const OUTBOX_CAPACITY: usize = 256;

/// One connected client, shared between the hub and the session's pumps.
///
/// `project_id` is written only by the session's own read pump (join/leave);
/// fan-out reads it while iterating the registry. A stale read delivers at
/// worst one frame to a session that just left the project.
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    project_id: RwLock<Option<Uuid>>,
    closed: AtomicBool,
}

impl Session {
    /// Create a session and its outbox. The returned handle goes to
    /// [`Hub::register`]; the receiver goes to the session's write pump.
    /// The handle holds the only outbox sender, so removing the handle
    /// from the registry is the single close of the outbox.
    pub fn open(
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) -> (Arc<Session>, SessionHandle, mpsc::Receiver<String>) {
        let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let session = Arc::new(Session {
            session_id: Uuid::new_v4(),
            user_id,
            project_id: RwLock::new(project_id),
            closed: AtomicBool::new(false),
        });
        let handle = SessionHandle {
            session: session.clone(),
            outbox,
        };
        (session, handle, outbox_rx)
    }

    pub fn project_id(&self) -> Option<Uuid> {
        match self.project_id.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_project(&self, project_id: Option<Uuid>) {
        let mut guard = match self.project_id.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = project_id;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// One-shot: returns true only for the caller that performed the
    /// false→true transition.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

/// Registry entry: the shared session plus its outbox sender.
pub struct SessionHandle {
    session: Arc<Session>,
    outbox: mpsc::Sender<String>,
}

enum HubCommand {
    Register(SessionHandle),
    Unregister { session_id: Uuid },
}

/// Snapshot returned by the observability endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsSnapshot {
    pub total_sessions: usize,
    pub project_sessions: usize,
    pub user_ids: Vec<Uuid>,
}

type SessionRegistry = Arc<RwLock<HashMap<Uuid, SessionHandle>>>;

/// Process-wide session multiplexer.
///
/// Registry mutation is serialized by [`HubRunner`]; fan-out iterates the
/// registry under the read lock and never blocks on a single session:
/// a full outbox evicts its session (close, schedule removal) instead of
/// stalling the broadcast. Frames are serialized once per broadcast, not
/// once per recipient.
pub struct Hub {
    sessions: SessionRegistry,
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl Hub {
    /// Build the hub and the serializer loop that owns registry mutation.
    /// The runner must be spawned before the listener or any session
    /// endpoint starts.
    pub fn new() -> (Arc<Hub>, HubRunner) {
        let sessions: SessionRegistry = Arc::new(RwLock::new(HashMap::new()));
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let hub = Arc::new(Hub {
            sessions: sessions.clone(),
            commands,
        });
        let runner = HubRunner {
            sessions,
            commands: commands_rx,
        };
        (hub, runner)
    }

    pub fn register(&self, handle: SessionHandle) {
        let _ = self.commands.send(HubCommand::Register(handle));
    }

    /// Idempotent: a second unregister for the same session is a no-op.
    pub fn unregister(&self, session_id: Uuid) {
        let _ = self.commands.send(HubCommand::Unregister { session_id });
    }

    /// Fan out a frame to every session scoped to `project_id`.
    pub fn broadcast_to_project(&self, project_id: Uuid, frame: &ServerFrame) {
        if let Some(json) = serialize_once(frame) {
            self.fan_out(Some(project_id), &json);
        }
    }

    /// Fan out a frame to every session regardless of scope.
    pub fn broadcast_to_all(&self, frame: &ServerFrame) {
        if let Some(json) = serialize_once(frame) {
            self.fan_out(None, &json);
        }
    }

    fn fan_out(&self, scope: Option<Uuid>, json: &str) {
        let mut evicted: Vec<Arc<Session>> = Vec::new();
        {
            let sessions = read_registry(&self.sessions);
            for handle in sessions.values() {
                if handle.session.is_closed() {
                    continue;
                }
                if let Some(project_id) = scope {
                    if handle.session.project_id() != Some(project_id) {
                        continue;
                    }
                }
                match handle.outbox.try_send(json.to_owned()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_))
                    | Err(mpsc::error::TrySendError::Closed(_)) => {
                        evicted.push(handle.session.clone());
                    }
                }
            }
        }
        for session in evicted {
            if session.mark_closed() {
                warn!(
                    session_id = %session.session_id,
                    user_id = %session.user_id,
                    "evicting slow session: outbox full"
                );
            }
            self.unregister(session.session_id);
        }
    }

    /// Observability snapshot: total live sessions, sessions scoped to
    /// `project_id`, and the user ids behind those scoped sessions.
    pub fn project_connections(&self, project_id: Uuid) -> ConnectionsSnapshot {
        let sessions = read_registry(&self.sessions);
        let mut user_ids = Vec::new();
        for handle in sessions.values() {
            if handle.session.project_id() == Some(project_id) {
                user_ids.push(handle.session.user_id);
            }
        }
        ConnectionsSnapshot {
            total_sessions: sessions.len(),
            project_sessions: user_ids.len(),
            user_ids,
        }
    }
}

fn serialize_once(frame: &ServerFrame) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(json),
        Err(e) => {
            error!(error = %e, kind = %frame.kind, "dropping unserializable frame");
            None
        }
    }
}

fn read_registry(sessions: &SessionRegistry) -> RwLockReadGuard<'_, HashMap<Uuid, SessionHandle>> {
    match sessions.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_registry(
    sessions: &SessionRegistry,
) -> RwLockWriteGuard<'_, HashMap<Uuid, SessionHandle>> {
    match sessions.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The hub's serialization point: processes register/unregister strictly
/// sequentially, so a session is visible to fan-out only after its
/// registration and its outbox is closed exactly once, on removal.
pub struct HubRunner {
    sessions: SessionRegistry,
    commands: mpsc::UnboundedReceiver<HubCommand>,
}

impl HubRunner {
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register(handle) => {
                    let session_id = handle.session.session_id;
                    let replaced = write_registry(&self.sessions).insert(session_id, handle);
                    if replaced.is_some() {
                        // Should be unreachable: session ids are fresh v4 UUIDs.
                        warn!(session_id = %session_id, "duplicate session registration");
                    } else {
                        debug!(session_id = %session_id, "session registered");
                    }
                }
                HubCommand::Unregister { session_id } => {
                    if let Some(handle) = write_registry(&self.sessions).remove(&session_id) {
                        handle.session.mark_closed();
                        debug!(session_id = %session_id, "session unregistered");
                        // Dropping the handle drops the only outbox sender;
                        // the write pump observes the close and exits.
                    }
                }
            }
        }
        info!("hub serializer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(kind: &str) -> ServerFrame {
        ServerFrame {
            kind: kind.to_owned(),
            resource: None,
            action: None,
            project_id: None,
            user_id: None,
            data: serde_json::Value::Null,
        }
    }

    async fn started_hub() -> Arc<Hub> {
        let (hub, runner) = Hub::new();
        tokio::spawn(runner.run());
        hub
    }

    async fn wait_for_total(hub: &Hub, expected: usize) {
        for _ in 0..200 {
            if read_registry(&hub.sessions).len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("registry never reached {expected} sessions");
    }

    #[tokio::test]
    async fn project_scoped_fan_out_reaches_only_matching_sessions() {
        let hub = started_hub().await;
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        let (_a, a_handle, mut a_rx) = Session::open(Uuid::new_v4(), Some(p1));
        let (_b, b_handle, mut b_rx) = Session::open(Uuid::new_v4(), Some(p2));
        let (_c, c_handle, mut c_rx) = Session::open(Uuid::new_v4(), None);
        hub.register(a_handle);
        hub.register(b_handle);
        hub.register(c_handle);
        wait_for_total(&hub, 3).await;

        hub.broadcast_to_project(p1, &frame("task_updated"));

        let delivered = a_rx.recv().await.expect("scoped session should receive");
        assert!(delivered.contains("task_updated"));
        assert!(b_rx.try_recv().is_err(), "other project must not receive");
        assert!(c_rx.try_recv().is_err(), "unscoped session must not receive");
    }

    #[tokio::test]
    async fn broadcast_to_all_ignores_project_scope() {
        let hub = started_hub().await;
        let (_a, a_handle, mut a_rx) = Session::open(Uuid::new_v4(), Some(Uuid::new_v4()));
        let (_b, b_handle, mut b_rx) = Session::open(Uuid::new_v4(), None);
        hub.register(a_handle);
        hub.register(b_handle);
        wait_for_total(&hub, 2).await;

        hub.broadcast_to_all(&frame("reconnect"));

        assert!(a_rx.recv().await.expect("scoped").contains("reconnect"));
        assert!(b_rx.recv().await.expect("unscoped").contains("reconnect"));
    }

    #[tokio::test]
    async fn serialized_payload_is_identical_for_every_recipient() {
        let hub = started_hub().await;
        let p1 = Uuid::new_v4();
        let (_a, a_handle, mut a_rx) = Session::open(Uuid::new_v4(), Some(p1));
        let (_b, b_handle, mut b_rx) = Session::open(Uuid::new_v4(), Some(p1));
        hub.register(a_handle);
        hub.register(b_handle);
        wait_for_total(&hub, 2).await;

        hub.broadcast_to_project(p1, &frame("sprint_updated"));
        assert_eq!(a_rx.recv().await, b_rx.recv().await);
    }

    #[tokio::test]
    async fn slow_session_is_evicted_and_peers_get_every_frame() {
        let hub = started_hub().await;
        let p1 = Uuid::new_v4();

        // A never drains its outbox; B drains concurrently.
        let (a, a_handle, _a_rx) = Session::open(Uuid::new_v4(), Some(p1));
        let (_b, b_handle, mut b_rx) = Session::open(Uuid::new_v4(), Some(p1));
        hub.register(a_handle);
        hub.register(b_handle);
        wait_for_total(&hub, 2).await;

        let drained = tokio::spawn(async move {
            let mut count = 0usize;
            while b_rx.recv().await.is_some() {
                count += 1;
                if count == OUTBOX_CAPACITY + 1 {
                    break;
                }
            }
            count
        });

        for _ in 0..=OUTBOX_CAPACITY {
            hub.broadcast_to_project(p1, &frame("task_updated"));
            // Let B's drain task keep pace; A still never drains.
            tokio::task::yield_now().await;
        }

        // Evicted before the overflowing fan-out returned.
        assert!(a.is_closed(), "overflowed session must be closed");
        assert_eq!(drained.await.expect("join"), OUTBOX_CAPACITY + 1);
        wait_for_total(&hub, 1).await;
    }

    #[tokio::test]
    async fn unregister_closes_outbox_and_is_idempotent() {
        let hub = started_hub().await;
        let (session, handle, mut rx) = Session::open(Uuid::new_v4(), None);
        hub.register(handle);
        wait_for_total(&hub, 1).await;

        hub.unregister(session.session_id);
        assert_eq!(rx.recv().await, None, "outbox must close on unregister");
        assert!(session.is_closed());

        hub.unregister(session.session_id);
        wait_for_total(&hub, 0).await;
    }

    #[tokio::test]
    async fn closed_sessions_are_skipped_by_fan_out() {
        let hub = started_hub().await;
        let p1 = Uuid::new_v4();
        let (session, handle, mut rx) = Session::open(Uuid::new_v4(), Some(p1));
        hub.register(handle);
        wait_for_total(&hub, 1).await;

        session.mark_closed();
        hub.broadcast_to_project(p1, &frame("task_updated"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rescoping_a_session_redirects_fan_out() {
        let hub = started_hub().await;
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let (session, handle, mut rx) = Session::open(Uuid::new_v4(), Some(p1));
        hub.register(handle);
        wait_for_total(&hub, 1).await;

        session.set_project(Some(p2));
        hub.broadcast_to_project(p1, &frame("message_created"));
        assert!(rx.try_recv().is_err(), "left project must go silent");

        hub.broadcast_to_project(p2, &frame("message_created"));
        assert!(rx.recv().await.is_some(), "joined project must deliver");
    }

    #[tokio::test]
    async fn connections_snapshot_counts_scoped_sessions() {
        let hub = started_hub().await;
        let p1 = Uuid::new_v4();
        let user_a = Uuid::new_v4();
        let (_a, a_handle, _a_rx) = Session::open(user_a, Some(p1));
        let (_b, b_handle, _b_rx) = Session::open(Uuid::new_v4(), None);
        hub.register(a_handle);
        hub.register(b_handle);
        wait_for_total(&hub, 2).await;

        let snapshot = hub.project_connections(p1);
        assert_eq!(snapshot.total_sessions, 2);
        assert_eq!(snapshot.project_sessions, 1);
        assert_eq!(snapshot.user_ids, vec![user_a]);
    }

    #[test]
    fn connections_snapshot_serializes_camel_case() {
        let snapshot = ConnectionsSnapshot {
            total_sessions: 2,
            project_sessions: 1,
            user_ids: vec![],
        };
        let value = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(value["totalSessions"], 2);
        assert_eq!(value["projectSessions"], 1);
        assert!(value["userIds"].as_array().expect("array").is_empty());
    }
}
