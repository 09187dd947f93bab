//! HTTP server and routes.

mod extract;
mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.uploads.max_request_bytes();
    let uploads_root = state.catalog.uploads().root().to_path_buf();

    let auth_routes = Router::new()
        .route("/register", post(handlers::auth_register))
        .route("/login", post(handlers::auth_login))
        .route(
            "/profile",
            get(handlers::auth_profile).put(handlers::auth_update_profile),
        );

    let book_routes = Router::new()
        .route(
            "/",
            get(handlers::books_list).merge(
                post(handlers::books_create).layer(DefaultBodyLimit::max(upload_limit)),
            ),
        )
        .route("/genres", get(handlers::books_genres))
        .route("/user/stats", get(handlers::books_user_stats))
        .route("/samples/create", post(handlers::books_create_samples))
        .route(
            "/{id}",
            get(handlers::books_get)
                .put(handlers::books_update)
                .delete(handlers::books_delete),
        )
        .route("/{id}/pdf", get(handlers::books_pdf))
        .route("/{id}/progress", post(handlers::books_progress));

    Router::new()
        .route("/api/health", get(handlers::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/books", book_routes)
        .nest_service("/uploads", ServeDir::new(uploads_root))
        .fallback(handlers::route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
