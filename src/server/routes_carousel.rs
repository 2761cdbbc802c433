//! Homepage carousel API routes.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use vitrine_common::ProductId;

use super::{error_response, AppContext};

/// Create carousel routes.
pub fn carousel_routes() -> Router<AppContext> {
    Router::new().route("/carousel", get(list_carousel).put(assign_slot))
}

/// A slot assignment. `position: null` clears the product's slot.
#[derive(Debug, Deserialize)]
pub struct AssignSlotRequest {
    pub product_id: ProductId,
    pub position: Option<u32>,
}

/// List occupied carousel slots in ascending position order.
async fn list_carousel(State(ctx): State<AppContext>) -> impl IntoResponse {
    match ctx.carousel.list() {
        Ok(slots) => Json(slots).into_response(),
        Err(e) => error_response(e),
    }
}

/// Assign or clear a product's carousel position.
///
/// A position held by another product yields 409 with the holder; the
/// client clears or moves the holder explicitly and retries.
async fn assign_slot(
    State(ctx): State<AppContext>,
    Json(req): Json<AssignSlotRequest>,
) -> impl IntoResponse {
    match ctx.carousel.assign(req.product_id, req.position) {
        Ok(()) => Json(serde_json::json!({
            "product_id": req.product_id,
            "position": req.position,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
