use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, put},
    Json, Router,
};
use shared::error::ErrorCode;
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Clone, Default)]
struct ServerState {
    list_queries: Arc<Mutex<Vec<String>>>,
    positions: Arc<Mutex<Vec<(String, PositionUpdate)>>>,
    created: Arc<Mutex<Vec<CreateItemRequest>>>,
    patches: Arc<Mutex<Vec<(String, ItemPatch)>>>,
}

async fn handle_list(
    State(state): State<ServerState>,
    Query(query): Query<ListItemsQuery>,
) -> Json<Vec<Item>> {
    state
        .list_queries
        .lock()
        .await
        .push(query.context.0.clone());
    Json(vec![
        Item::new("a", Lane::Todo, 0, "first"),
        Item::new("b", Lane::Done, 3, "second"),
    ])
}

async fn handle_position(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(update): Json<PositionUpdate>,
) -> impl IntoResponse {
    if id == "locked" {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "code": "conflict",
                "message": "item is locked by another editor"
            })),
        )
            .into_response();
    }
    state.positions.lock().await.push((id, update));
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_create(
    State(state): State<ServerState>,
    Json(request): Json<CreateItemRequest>,
) -> Json<Item> {
    let mut item = Item::new("new-1", request.item.lane, 7, request.item.title.clone());
    item.priority = request.item.priority;
    state.created.lock().await.push(request);
    Json(item)
}

async fn handle_patch(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(patch): Json<ItemPatch>,
) -> Json<Item> {
    let mut item = Item::new(id.clone(), Lane::Review, 1, "patched");
    if let Some(title) = &patch.title {
        item.title = title.clone();
    }
    item.archived = patch.archived.unwrap_or(false);
    state.patches.lock().await.push((id, patch));
    Json(item)
}

async fn handle_delete(Path(id): Path<String>) -> impl IntoResponse {
    if id == "gone" {
        return (StatusCode::BAD_GATEWAY, "upstream exploded").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn spawn_item_server() -> (String, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/items", get(handle_list).post(handle_create))
        .route("/api/items/:id", patch(handle_patch).delete(handle_delete))
        .route("/api/items/:id/position", put(handle_position))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/api/"), state)
}

#[tokio::test]
async fn list_sends_context_as_query_parameter() {
    let (server_url, state) = spawn_item_server().await;
    let store = HttpItemStore::new(&server_url).expect("store");

    let items = store
        .list(&ContextKey::from("project 42"))
        .await
        .expect("list");

    assert_eq!(items.len(), 2);
    assert_eq!(items[1].rank, 3);
    assert_eq!(state.list_queries.lock().await.clone(), vec!["project 42"]);
}

#[tokio::test]
async fn update_position_puts_lane_and_index() {
    let (server_url, state) = spawn_item_server().await;
    let store = HttpItemStore::new(&server_url).expect("store");

    store
        .update_position(&ItemId::from("card-9"), Lane::InProgress, 2)
        .await
        .expect("update position");

    assert_eq!(
        state.positions.lock().await.clone(),
        vec![(
            "card-9".to_string(),
            PositionUpdate {
                lane: Lane::InProgress,
                index: 2
            }
        )]
    );
}

#[tokio::test]
async fn api_error_bodies_are_surfaced_as_is() {
    let (server_url, _state) = spawn_item_server().await;
    let store = HttpItemStore::new(&server_url).expect("store");

    let err = store
        .update_position(&ItemId::from("locked"), Lane::Done, 0)
        .await
        .expect_err("conflict");

    match err {
        StoreError::Api(api) => {
            assert_eq!(api.code, ErrorCode::Conflict);
            assert_eq!(api.message, "item is locked by another editor");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_bodies_keep_status_and_text() {
    let (server_url, _state) = spawn_item_server().await;
    let store = HttpItemStore::new(&server_url).expect("store");

    let err = store
        .delete(&ItemId::from("gone"))
        .await
        .expect_err("bad gateway");

    assert_eq!(
        err,
        StoreError::Status {
            status: 502,
            body: "upstream exploded".to_string()
        }
    );
    store.delete(&ItemId::from("fine")).await.expect("delete");
}

#[tokio::test]
async fn create_and_update_round_trip_through_the_backend() {
    let (server_url, state) = spawn_item_server().await;
    let store = HttpItemStore::new(&server_url).expect("store");

    let mut new_item = NewItem::new("renew vps", Lane::Backlog);
    new_item.priority = shared::domain::Priority::Urgent;
    let created = store
        .create(&ContextKey::from("infra"), &new_item)
        .await
        .expect("create");
    assert_eq!(created.id, ItemId::from("new-1"));
    assert_eq!(created.priority, shared::domain::Priority::Urgent);

    let recorded = state.created.lock().await.clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].context, ContextKey::from("infra"));
    assert_eq!(recorded[0].item, new_item);

    let archived = store
        .update(&ItemId::from("new-1"), &ItemPatch::archive())
        .await
        .expect("archive");
    assert!(archived.archived);
    assert_eq!(
        state.patches.lock().await.clone(),
        vec![("new-1".to_string(), ItemPatch::archive())]
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let store = HttpItemStore::new(&format!("http://{addr}")).expect("store");

    let err = store
        .list(&ContextKey::from("p"))
        .await
        .expect_err("connection refused");

    assert!(matches!(err, StoreError::Transport(_)), "{err:?}");
}

#[test]
fn rejects_urls_that_cannot_be_a_base() {
    assert!(matches!(
        HttpItemStore::new("mailto:board@example.com"),
        Err(StoreError::InvalidUrl { .. })
    ));
    assert!(matches!(
        HttpItemStore::new("not a url"),
        Err(StoreError::InvalidUrl { .. })
    ));
}

#[test]
fn endpoints_escape_item_ids_and_keep_base_path() {
    let store = HttpItemStore::new("https://crm.example.com/api").expect("store");
    let url = store
        .endpoint(&["items", "a/b c", "position"])
        .expect("endpoint");
    assert_eq!(
        url.as_str(),
        "https://crm.example.com/api/items/a%2Fb%20c/position"
    );
}
