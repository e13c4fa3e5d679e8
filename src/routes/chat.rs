use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use serde::Deserialize;
use crate::auth::AuthenticatedUser;
use crate::reply::ReplyOracle;
use crate::store::{
    ChatMessage, DonatedItem, ItemStatus, Store, ThreadKey, User, UserRole, AI_SENDER_PREFIX,
};
use crate::AppState;

/// Appended in place of a reply when the generative-language call fails.
pub const APOLOGY_REPLY: &str = "Sorry, an error occurred.";

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Opens (or re-enters) the conversation about an item.
///
/// For an NGO this is the "Chat with Donor to Arrange Pickup" action: the
/// item is reserved and, if the thread is new, the standard introduction is
/// sent on the NGO's behalf. A donor can only enter a thread an NGO already
/// opened; donor-side opens never auto-send.
pub async fn open_item_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<String>,
) -> impl IntoResponse {
    let Some(item) = state.store.find_item(&item_id) else {
        return (StatusCode::NOT_FOUND, "Item not found").into_response();
    };
    let Some(donor) = state.store.find_user_by_id(&item.donor_id) else {
        return (StatusCode::NOT_FOUND, "Donor not found").into_response();
    };

    let key = match user.role {
        UserRole::Ngo => {
            let Some(ngo) = state.store.find_user_by_id(&user.id) else {
                return (StatusCode::UNAUTHORIZED, "Session expired").into_response();
            };
            match reserve_and_greet(&state.store, &item, &donor, &ngo) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!("Reserve failed for item {}: {}", item.id, e);
                    return (StatusCode::CONFLICT, e.to_string()).into_response();
                }
            }
        }
        UserRole::Donor => {
            if item.donor_id != user.id {
                return (StatusCode::FORBIDDEN, "Not your listing").into_response();
            }
            match state.store.find_reservation(&user.id, &item.id) {
                Some(key) => key,
                None => {
                    return (StatusCode::NOT_FOUND, "No one has reserved this item yet")
                        .into_response()
                }
            }
        }
    };

    let messages = state.store.get_thread(&key);
    let counterpart = state.store.find_user_by_id(key.counterpart_of(&user.id));
    AxumJson(serde_json::json!({
        "thread_id": key.to_string(),
        "messages": messages,
        "counterpart": counterpart,
    }))
    .into_response()
}

pub async fn get_thread(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    let key: ThreadKey = match thread_id.parse() {
        Ok(key) => key,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    if key.donor_id != user.id && key.ngo_id != user.id {
        return (StatusCode::FORBIDDEN, "Not a participant in this conversation").into_response();
    }

    AxumJson(serde_json::json!({ "messages": state.store.get_thread(&key) })).into_response()
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(thread_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let key: ThreadKey = match thread_id.parse() {
        Ok(key) => key,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    if key.donor_id != user.id && key.ngo_id != user.id {
        return (StatusCode::FORBIDDEN, "Not a participant in this conversation").into_response();
    }
    let text = req.text.trim();
    if text.is_empty() {
        return (StatusCode::BAD_REQUEST, "Message text is required").into_response();
    }

    let messages =
        exchange(&state.store, state.oracle.as_ref(), &key, &user.id, user.role, text).await;
    AxumJson(serde_json::json!({ "messages": messages })).into_response()
}

/// NGO-side opening move: advance the item to Reserved and, when the thread
/// has no history yet, send the introduction as the NGO.
pub fn reserve_and_greet(
    store: &Store,
    item: &DonatedItem,
    donor: &User,
    ngo: &User,
) -> Result<ThreadKey, crate::store::StoreError> {
    if item.status == ItemStatus::Available {
        store.update_item_status(&item.id, ItemStatus::Reserved)?;
    }

    let key = ThreadKey::new(item.donor_id.clone(), ngo.id.clone(), item.id.clone());
    if store.get_thread(&key).is_empty() {
        let intro = format!(
            "Hi {}, I'm from {} and I'm interested in the {} you posted.",
            donor.full_name, ngo.full_name, item.name
        );
        store.append_message(&key, &ngo.id, &intro);
    }
    Ok(key)
}

/// One full chat turn: append the human message, ask the oracle for the
/// simulated counterpart's reply, and append that reply — or the fixed
/// apology when the oracle fails. Oracle failure never propagates.
pub async fn exchange(
    store: &Store,
    oracle: &dyn ReplyOracle,
    key: &ThreadKey,
    sender_id: &str,
    sender_role: UserRole,
    text: &str,
) -> Vec<ChatMessage> {
    store.append_message(key, sender_id, text);

    // Snapshot after the append so the human message is part of the context.
    let history = store.get_thread(key);
    let simulate = sender_role.opposite();

    let reply = match store.find_item(&key.item_id) {
        Some(item) => match oracle.reply(&history, &item, simulate).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("AI reply failed: {}", e);
                APOLOGY_REPLY.to_string()
            }
        },
        None => {
            tracing::error!("Thread {} references unknown item {}", key, key.item_id);
            APOLOGY_REPLY.to_string()
        }
    };

    let ai_sender = format!("{}{}", AI_SENDER_PREFIX, key.counterpart_of(sender_id));
    store.append_message(key, &ai_sender, &reply)
}
