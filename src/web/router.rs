use super::AppState;
use super::handlers;
use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Every route the service answers, for any deployment entry point.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/parcels",
            get(handlers::list_parcels)
                .post(handlers::create_parcel)
                .delete(handlers::delete_parcel_by_query),
        )
        .route("/parcels/user/:email", get(handlers::list_parcels_by_email))
        .route(
            "/parcels/:id",
            get(handlers::get_parcel).delete(handlers::delete_parcel),
        )
        // Some hosts only forward paths under `/api`.
        .route("/api/parcels/:id", delete(handlers::delete_parcel))
        .route("/create-payment-intent", post(handlers::create_payment_intent))
        .route("/webhook", post(handlers::payment_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
