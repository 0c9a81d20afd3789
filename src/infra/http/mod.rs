pub mod error;
pub mod handlers;
mod middleware;
mod state;

pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use state::HttpState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, patch, post, put},
};

use middleware::{log_responses, set_request_context};

pub fn build_router(state: HttpState) -> Router {
    let body_limit = state.body_limit;

    let admin = Router::new()
        .route("/api/admin/verify", post(handlers::verify_admin))
        .route("/api/admin/config", patch(handlers::update_config))
        .route("/api/admin/works", put(handlers::replace_works))
        .route("/api/admin/author-icon", post(handlers::upload_author_icon))
        .route(
            "/api/admin/works/{id}/thumbnail",
            post(handlers::upload_work_thumbnail),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/config", get(handlers::get_config))
        .route("/api/works", get(handlers::get_works))
        .route("/api/scraps", get(handlers::list_scraps))
        .route("/api/scraps/{slug}", get(handlers::get_scrap))
        .route("/api/pages/{page}", get(handlers::get_page))
        .merge(admin)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
