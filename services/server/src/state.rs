use crate::hub::Hub;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared handler state: the request pool and the session hub.
///
/// The listener pump deliberately does not live here — it owns its own
/// dedicated connection and only holds the hub.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(pool: PgPool, hub: Arc<Hub>) -> Self {
        Self { pool, hub }
    }
}
