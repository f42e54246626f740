use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use pricefeed_core::catalog::NewItem;
use pricefeed_sdk::objects::{CreateItemRequest, CreateItemResponse, UpdatePriceRequest};
use uuid::Uuid;

use super::{ApiError, to_response};
use crate::state::AppState;

/// `GET /api/items`
pub(super) async fn list_items(state: State<AppState>) -> impl IntoResponse {
    let items: Vec<_> = state
        .catalog
        .list()
        .await
        .into_iter()
        .map(to_response)
        .collect();
    Json(items)
}

/// `POST /api/items`: store a new item and send its initial price.
pub(super) async fn create_item(
    state: State<AppState>,
    Json(request): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .catalog
        .create(NewItem {
            name: request.name,
            color: request.color,
            age: request.age,
            price: request.price,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CreateItemResponse { id: item.id })))
}

/// `GET /api/items/{id}`
pub(super) async fn get_item(
    state: State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.catalog.get(id).await?;
    Ok(Json(to_response(item)))
}

/// `DELETE /api/items/{id}`
pub(super) async fn delete_item(
    state: State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete(id).await?;
    Ok(StatusCode::OK)
}

/// `PUT /api/items/{id}/price`: change the price and send it.
pub(super) async fn update_price(
    state: State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePriceRequest>,
) -> Result<StatusCode, ApiError> {
    state.catalog.update_price(id, request.price).await?;
    Ok(StatusCode::OK)
}
