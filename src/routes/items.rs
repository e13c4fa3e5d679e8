use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use serde::{Deserialize, Serialize};
use crate::auth::AuthenticatedUser;
use crate::store::{DonatedItem, ItemStatus, NewItem, User, UserRole};
use crate::AppState;

#[derive(Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub description: String,
    pub category: String,
    pub image_url: String,
}

/// A donor-dashboard row: the listing plus, when reserved, who reserved it
/// and the conversation to jump into.
#[derive(Serialize)]
pub struct DonorItem {
    #[serde(flatten)]
    pub item: DonatedItem,
    pub reserved_by: Option<User>,
    pub thread_id: Option<String>,
}

pub async fn list_items(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let items = state
        .store
        .list_available_items(params.q.as_deref().unwrap_or(""));
    AxumJson(serde_json::json!({ "items": items }))
}

pub async fn my_items(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> impl IntoResponse {
    let rows: Vec<DonorItem> = state
        .store
        .items_for_donor(&user.id)
        .into_iter()
        .map(|item| {
            let key = if item.status == ItemStatus::Reserved {
                state.store.find_reservation(&user.id, &item.id)
            } else {
                None
            };
            let reserved_by = key
                .as_ref()
                .and_then(|k| state.store.find_user_by_id(&k.ngo_id));
            DonorItem {
                thread_id: key.map(|k| k.to_string()),
                reserved_by,
                item,
            }
        })
        .collect();

    AxumJson(serde_json::json!({ "items": rows }))
}

pub async fn create_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(req): Json<CreateItemRequest>,
) -> impl IntoResponse {
    if user.role != UserRole::Donor {
        return (StatusCode::FORBIDDEN, "Only donors can post items").into_response();
    }
    if req.name.trim().is_empty()
        || req.description.trim().is_empty()
        || req.category.trim().is_empty()
        || req.image_url.trim().is_empty()
    {
        return (StatusCode::BAD_REQUEST, "Please fill all fields").into_response();
    }

    let item = state.store.add_item(NewItem {
        donor_id: user.id,
        name: req.name.trim().to_string(),
        description: req.description.trim().to_string(),
        category: req.category.trim().to_string(),
        image_url: req.image_url.trim().to_string(),
    });
    tracing::info!("New listing {} ({})", item.id, item.name);

    (StatusCode::CREATED, AxumJson(item)).into_response()
}

pub async fn get_item(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(item) = state.store.find_item(&id) else {
        return (StatusCode::NOT_FOUND, "Item not found").into_response();
    };
    let Some(donor) = state.store.find_user_by_id(&item.donor_id) else {
        return (StatusCode::NOT_FOUND, "Donor not found").into_response();
    };
    AxumJson(serde_json::json!({ "item": item, "donor": donor })).into_response()
}

/// Donor confirms the handover happened; Reserved moves to its terminal
/// Donated state.
pub async fn mark_donated(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(item) = state.store.find_item(&id) else {
        return (StatusCode::NOT_FOUND, "Item not found").into_response();
    };
    if item.donor_id != user.id {
        return (StatusCode::FORBIDDEN, "Only the owning donor can mark an item donated")
            .into_response();
    }

    match state.store.update_item_status(&id, ItemStatus::Donated) {
        Ok(true) => {
            let updated = state.store.find_item(&id);
            AxumJson(serde_json::json!({ "status": "updated", "item": updated })).into_response()
        }
        Ok(false) => (StatusCode::NOT_FOUND, "Item not found").into_response(),
        Err(e) => (StatusCode::CONFLICT, e.to_string()).into_response(),
    }
}
