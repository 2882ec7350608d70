use crate::{client::Clients, dispatch::Registry, ws};
use uuid::Uuid;
use warp::{http::StatusCode, reply::json, Rejection, Reply};

type Result<T> = std::result::Result<T, Rejection>;

pub async fn ws_handler(ws: warp::ws::Ws, clients: Clients, registry: Registry) -> Result<impl Reply> {
    let id = Uuid::new_v4().as_simple().to_string();
    Ok(ws.on_upgrade(move |socket| ws::client_connection(socket, id, clients, registry)))
}

// Read-only lobby snapshot for clients that poll instead of holding a socket open
pub async fn lobby_handler(registry: Registry) -> Result<impl Reply> {
    let lobby = registry.read().await.list_waiting_sessions();
    Ok(json(&lobby))
}

pub async fn health_handler() -> Result<impl Reply> {
    Ok(StatusCode::OK)
}
