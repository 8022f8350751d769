pub mod auth;
pub mod chat;
pub mod health;
pub mod inventory;
pub mod objects;
pub mod room_users;
pub mod rooms;
pub mod tools;
pub mod users;

pub use auth::AuthUser;

use axum::Router;
use serde::Deserialize;

use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .merge(health::health_routes())
        .with_state(state)
}

/// API v1 routes
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::auth_routes())
        .nest("/users", users::user_routes())
        .nest("/rooms", rooms::room_routes())
        .nest("/room-users", room_users::room_user_routes())
        .nest("/chat", chat::chat_routes())
        .nest("/tools", tools::tools_routes())
        .nest("/objects", objects::object_routes())
        .nest("/inventory", inventory::inventory_routes())
}

/// `?skip=&limit=` paging shared by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Stores;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Config::for_memory("api-test-secret"), Stores::memory(), None)
    }

    async fn call(state: &AppState, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register_and_login(state: &AppState, username: &str) -> String {
        let (status, _) = call(
            state,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": username })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            state,
            Method::POST,
            "/api/v1/auth/token",
            None,
            Some(json!({ "username": username, "password": "anything" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], json!("bearer"));
        body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_reports_memory_backend() {
        let state = test_state();
        let (status, body) = call(&state, Method::GET, "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["storage"], json!("memory"));
        assert_eq!(body["connections"], json!(0));
    }

    #[tokio::test]
    async fn test_register_conflict_and_unknown_login() {
        let state = test_state();
        register_and_login(&state, "alice").await;

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], json!(409));

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/auth/token",
            None,
            Some(json!({ "username": "nobody" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_room_requires_bearer() {
        let state = test_state();
        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/rooms",
            None,
            Some(json!({ "name": "cafe" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/rooms",
            Some("garbage"),
            Some(json!({ "name": "cafe" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_room_lifecycle_over_rest() {
        let state = test_state();
        let token = register_and_login(&state, "alice").await;

        let (status, body) = call(&state, Method::POST, "/api/v1/rooms", Some(&token), Some(json!({ "name": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (status, room) = call(
            &state,
            Method::POST,
            "/api/v1/rooms",
            Some(&token),
            Some(json!({ "name": "cafe" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let room_id = room["id"].as_i64().unwrap();

        call(
            &state,
            Method::POST,
            "/api/v1/rooms",
            Some(&token),
            Some(json!({ "name": "secret", "is_private": true })),
        )
        .await;

        let (_, listed) = call(&state, Method::GET, "/api/v1/rooms", None, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["name"], json!("cafe"));

        let (status, info) = call(&state, Method::GET, &format!("/api/v1/rooms/{}", room_id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["name"], json!("cafe"));
        assert_eq!(info["online_count"], json!(0));

        let (status, _) = call(&state, Method::GET, "/api/v1/rooms/9999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, users) = call(
            &state,
            Method::GET,
            &format!("/api/v1/room-users/room/{}", room_id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users, json!([]));
    }

    #[tokio::test]
    async fn test_chat_history_is_paged_newest_first() {
        let state = test_state();
        for text in ["one", "two", "three"] {
            state.stores.chat.append_message(4, 1, text).await.unwrap();
        }

        let (status, page) = call(
            &state,
            Method::GET,
            "/api/v1/chat/room/4?skip=1&limit=1",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page.as_array().unwrap().len(), 1);
        assert_eq!(page[0]["message"], json!("two"));

        let (_, tools) = call(&state, Method::GET, "/api/v1/tools/room/4", None, None).await;
        assert_eq!(tools, json!([]));
    }

    async fn create_room(state: &AppState, token: &str, name: &str) -> i64 {
        let (status, room) = call(
            state,
            Method::POST,
            "/api/v1/rooms",
            Some(token),
            Some(json!({ "name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        room["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_profile_read_update_delete() {
        let state = test_state();
        let alice = register_and_login(&state, "alice").await;
        register_and_login(&state, "bob").await;

        let (status, me) = call(&state, Method::GET, "/api/v1/users/me", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], json!("alice"));
        let alice_id = me["id"].as_i64().unwrap();

        let (status, _) = call(&state, Method::GET, "/api/v1/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (_, all) = call(&state, Method::GET, "/api/v1/users?limit=1", Some(&alice), None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);

        let (status, _) = call(&state, Method::GET, "/api/v1/users/999", Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &state,
            Method::PUT,
            "/api/v1/users/me",
            Some(&alice),
            Some(json!({ "username": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, updated) = call(
            &state,
            Method::PUT,
            "/api/v1/users/me",
            Some(&alice),
            Some(json!({ "avatar_url": "https://img/a.png" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["username"], json!("alice"));
        assert_eq!(updated["avatar_url"], json!("https://img/a.png"));

        let (status, body) = call(&state, Method::DELETE, "/api/v1/users/me", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "User deleted successfully" }));

        // The token now names a user that no longer exists
        let (status, _) = call(&state, Method::GET, "/api/v1/users/me", Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(state.stores.users.get_user(alice_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_user_route_matches_register() {
        let state = test_state();
        let (status, user) = call(
            &state,
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({ "username": "  carol  " })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["username"], json!("carol"));

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/users",
            None,
            Some(json!({ "username": "x".repeat(51) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_presence_over_rest() {
        let state = test_state();
        let token = register_and_login(&state, "alice").await;
        let room_id = create_room(&state, &token, "cafe").await;

        let (status, _) = call(&state, Method::POST, "/api/v1/room-users/room/77/join", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &state,
            Method::PUT,
            &format!("/api/v1/room-users/room/{}/position?x=1&y=1", room_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, joined) = call(
            &state,
            Method::POST,
            &format!("/api/v1/room-users/room/{}/join?x=5&y=6", room_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!((joined["x"].clone(), joined["y"].clone()), (json!(5), json!(6)));

        let (status, moved) = call(
            &state,
            Method::PUT,
            &format!("/api/v1/room-users/room/{}/position?x=9&y=-2", room_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!((moved["x"].clone(), moved["y"].clone()), (json!(9), json!(-2)));

        let (status, body) = call(
            &state,
            Method::POST,
            &format!("/api/v1/room-users/room/{}/leave", room_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Successfully left room" }));
        assert!(state.stores.rooms.room_users(room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_post_stores_message() {
        let state = test_state();
        let token = register_and_login(&state, "alice").await;
        let room_id = create_room(&state, &token, "cafe").await;
        let uri = format!("/api/v1/chat/room/{}?message=hello%20there", room_id);

        let (status, _) = call(&state, Method::POST, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, log) = call(&state, Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(log["message"], json!("hello there"));

        let (status, _) = call(
            &state,
            Method::POST,
            &format!("/api/v1/chat/room/{}?message=%20", room_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&state, Method::POST, "/api/v1/chat/room/404?message=hi", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(state.stores.chat.room_messages(room_id, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tools_use_requires_object_in_room() {
        let state = test_state();
        let token = register_and_login(&state, "alice").await;
        let bob = register_and_login(&state, "bob").await;
        let room_id = create_room(&state, &token, "cafe").await;
        let other_room = create_room(&state, &token, "library").await;

        let (status, pot) = call(
            &state,
            Method::POST,
            "/api/v1/objects",
            Some(&token),
            Some(json!({ "room_id": room_id, "type": "pot", "x": 3, "y": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let pot_id = pot["id"].as_i64().unwrap();

        let (status, _) = call(
            &state,
            Method::POST,
            &format!("/api/v1/tools/use?room_id={}&target_object_id={}&action=destroy", other_room, pot_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, log) = call(
            &state,
            Method::POST,
            &format!("/api/v1/tools/use?room_id={}&target_object_id={}&action=move", room_id, pot_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(log["action"], json!("move"));
        let user_id = log["user_id"].as_i64().unwrap();

        let uri = format!("/api/v1/tools/user/{}", user_id);
        let (status, mine) = call(&state, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let (status, body) = call(&state, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], json!(403));
    }

    #[tokio::test]
    async fn test_objects_listing_and_lookup() {
        let state = test_state();
        let token = register_and_login(&state, "alice").await;
        let room_id = create_room(&state, &token, "cafe").await;

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/objects",
            None,
            Some(json!({ "room_id": room_id, "type": "chair", "x": 0, "y": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/objects",
            Some(&token),
            Some(json!({ "room_id": 404, "type": "chair", "x": 0, "y": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for object_type in ["chair", "plant", "chair"] {
            call(
                &state,
                Method::POST,
                "/api/v1/objects",
                Some(&token),
                Some(json!({ "room_id": room_id, "type": object_type, "x": 1, "y": 2, "metadata": { "color": "red" } })),
            )
            .await;
        }

        let (_, chairs) = call(&state, Method::GET, "/api/v1/objects?type=chair", None, None).await;
        assert_eq!(chairs.as_array().unwrap().len(), 2);
        let (_, in_room) = call(&state, Method::GET, &format!("/api/v1/objects/room/{}", room_id), None, None).await;
        assert_eq!(in_room.as_array().unwrap().len(), 3);

        let first_id = chairs[0]["id"].as_i64().unwrap();
        let (status, chair) = call(&state, Method::GET, &format!("/api/v1/objects/{}", first_id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chair["type"], json!("chair"));
        assert_eq!(chair["metadata"], json!({ "color": "red" }));

        let (status, _) = call(&state, Method::GET, "/api/v1/objects/9999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_inventory_place_consumes_items() {
        let state = test_state();
        let token = register_and_login(&state, "alice").await;
        let bob = register_and_login(&state, "bob").await;
        let room_id = create_room(&state, &token, "cafe").await;

        let (status, item) = call(
            &state,
            Method::POST,
            "/api/v1/inventory",
            Some(&token),
            Some(json!({ "type": "balloon", "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let item_id = item["id"].as_i64().unwrap();

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/inventory",
            Some(&token),
            Some(json!({ "type": "balloon", "quantity": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let place = json!({ "inventory_item_id": item_id, "room_id": room_id, "x": 4, "y": 5 });

        // Someone else's item is as good as missing
        let (status, _) = call(&state, Method::POST, "/api/v1/inventory/place", Some(&bob), Some(place.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for remaining in [1, 0] {
            let (status, body) = call(
                &state,
                Method::POST,
                "/api/v1/inventory/place",
                Some(&token),
                Some(place.clone()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], json!("ok"));
            assert!(body["object_id"].is_i64());

            let (_, items) = call(&state, Method::GET, "/api/v1/inventory", Some(&token), None).await;
            let left: i64 = items.as_array().unwrap().iter().map(|i| i["quantity"].as_i64().unwrap()).sum();
            assert_eq!(left, remaining);
        }

        let (status, body) = call(&state, Method::POST, "/api/v1/inventory/place", Some(&token), Some(place)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("Inventory item not found"));

        let (_, objects) = call(&state, Method::GET, &format!("/api/v1/objects/room/{}", room_id), None, None).await;
        assert_eq!(objects.as_array().unwrap().len(), 2);
        assert_eq!(objects[0]["type"], json!("balloon"));
    }
}
