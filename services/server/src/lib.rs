pub mod auth;
pub mod broadcast;
pub mod db;
pub mod http;
pub mod hub;
pub mod listener;
pub mod repo;
pub mod state;
pub mod ws_sessions;

pub use state::AppState;

use axum::{
    routing::{delete, get, patch},
    Router,
};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/v1/sessions", get(ws_sessions::ws_session_handler))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route(
            "/api/v1/projects",
            get(http::projects::list_projects).post(http::projects::create_project),
        )
        .route(
            "/api/v1/projects/:project_id",
            get(http::projects::get_project)
                .patch(http::projects::patch_project)
                .delete(http::projects::delete_project),
        )
        .route(
            "/api/v1/projects/:project_id/connections",
            get(http::connections::get_connections),
        )
        .route(
            "/api/v1/projects/:project_id/members",
            get(http::members::list_members).post(http::members::add_member),
        )
        .route(
            "/api/v1/projects/:project_id/members/:user_id",
            delete(http::members::remove_member),
        )
        .route(
            "/api/v1/projects/:project_id/sprints",
            get(http::sprints::list_sprints).post(http::sprints::create_sprint),
        )
        .route(
            "/api/v1/sprints/:sprint_id",
            patch(http::sprints::patch_sprint).delete(http::sprints::delete_sprint),
        )
        .route(
            "/api/v1/projects/:project_id/tasks",
            get(http::tasks::list_tasks).post(http::tasks::create_task),
        )
        .route(
            "/api/v1/tasks/:task_id",
            patch(http::tasks::patch_task).delete(http::tasks::delete_task),
        )
        .route(
            "/api/v1/projects/:project_id/messages",
            get(http::messages::list_messages).post(http::messages::post_message),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
