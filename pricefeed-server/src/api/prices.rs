use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use pricefeed_sdk::objects::PriceResponse;
use uuid::Uuid;

use super::ApiError;
use crate::state::AppState;

/// `GET /api/prices`: everything this instance's subscriber has seen.
pub(super) async fn list_prices(state: State<AppState>) -> impl IntoResponse {
    let mut prices: Vec<PriceResponse> = state
        .prices
        .snapshot()
        .await
        .into_iter()
        .map(|(id, price)| PriceResponse { id, price })
        .collect();
    prices.sort_by_key(|p| p.id);
    Json(prices)
}

/// `GET /api/prices/{id}`
pub(super) async fn get_price(
    state: State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let price = state.prices.get(id).await.ok_or(ApiError::PriceNotFound)?;
    Ok(Json(PriceResponse { id, price }))
}
