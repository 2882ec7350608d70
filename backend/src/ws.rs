use crate::client::{Client, Clients, Sender};
use crate::dispatch::{self, Delivery, Registry};
use common::messages::{Request, Response};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

// Lock order is always registry first, then clients. Responses are queued while the
// registry lock is held so every connection sees actions in the order they were applied.

pub async fn client_connection(ws: WebSocket, id: String, clients: Clients, registry: Registry) {
    let (client_ws_sender, mut client_ws_rcv) = ws.split();
    let (client_sender, client_rcv) = mpsc::unbounded_channel();

    let client_rcv = UnboundedReceiverStream::new(client_rcv);
    tokio::task::spawn(client_rcv.forward(client_ws_sender).map(|result| {
        if let Err(e) = result {
            error!("error sending websocket msg: {}", e);
        }
    }));

    {
        let registry = registry.read().await;
        let mut clients_map = clients.write().await;
        clients_map.insert(
            id.clone(),
            Client {
                sender: Sender(client_sender),
            },
        );
        dispatch::deliver(&*clients_map, dispatch::handle_connect(&*registry, &id));
    }

    info!("{} connected", id);

    while let Some(result) = client_ws_rcv.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                error!("error receiving ws message for {}: {}", id, e);
                break;
            }
        };
        client_msg(&id, msg, &clients, &registry).await;
    }

    client_disconnected(&id, &clients, &registry).await;
    info!("{} disconnected", id);
}

#[tracing::instrument(skip(msg, clients, registry))]
async fn client_msg(id: &str, msg: Message, clients: &Clients, registry: &Registry) {
    // Close, ping and binary frames carry no game messages
    let message = match msg.to_str() {
        Ok(v) => v.trim(),
        Err(_) => return,
    };

    if message == "ping" {
        return;
    }
    info!("received message from {}: {}", id, message);

    let mut registry = registry.write().await;
    let deliveries = match serde_json::from_str::<Request>(message) {
        Ok(request) => dispatch::handle_request(&mut *registry, id, request),
        Err(err) => {
            warn!("Failed to deserialize message into a request: {}", err);
            vec![Delivery::to(id, Response::Error(format!("Malformed message: {}", err)))]
        }
    };
    dispatch::deliver(&*clients.read().await, deliveries);
}

async fn client_disconnected(id: &str, clients: &Clients, registry: &Registry) {
    let mut registry = registry.write().await;
    let mut clients_map = clients.write().await;
    clients_map.remove(id);
    let deliveries = dispatch::handle_disconnect(&mut *registry, id);
    dispatch::deliver(&*clients_map, deliveries);
}
