//! Inventory endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        inventory::{InventoryView, UpdateInventory},
        user::RequestContext,
    },
};

/// Stock, condition, status and live counts of a book
#[utoipa::path(
    get,
    path = "/inventory/{book_id}",
    tag = "inventory",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Inventory with availability", body = InventoryView),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_inventory(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(book_id): Path<i32>,
) -> AppResult<Json<InventoryView>> {
    let inventory = state.services.catalog.get_inventory(&ctx, book_id).await?;
    Ok(Json(inventory))
}

#[utoipa::path(
    put,
    path = "/inventory/{book_id}",
    tag = "inventory",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateInventory,
    responses(
        (status = 200, description = "Inventory updated", body = InventoryView),
        (status = 404, description = "Book not found"),
        (status = 422, description = "Quantity below the copies on loan or on hold")
    )
)]
pub async fn update_inventory(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(book_id): Path<i32>,
    Json(data): Json<UpdateInventory>,
) -> AppResult<Json<InventoryView>> {
    let inventory = state
        .services
        .catalog
        .update_inventory(&ctx, book_id, data)
        .await?;
    Ok(Json(inventory))
}
