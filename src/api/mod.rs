//! HTTP handlers.

pub mod conversion;
pub mod health;
pub mod pdf;
pub mod sse;

use axum::Router;

use crate::AppState;

/// Every route of the service.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/conversion", conversion::router())
        .nest("/pdf", pdf::router())
}
