use crate::client::Clients;
use crate::config::Config;
use crate::dispatch::Registry;
use clap::Parser;
use common::SessionRegistry;
use hashbrown::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;
use warp::{
    http::{header, Method},
    Filter,
};

mod client;
mod config;
mod dispatch;
mod handler;
mod util;
mod ws;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let clients: Clients = Arc::new(RwLock::new(HashMap::new()));
    let registry: Registry = Arc::new(RwLock::new(SessionRegistry::new()));
    info!("created clients map and session registry");

    tokio::spawn(run_maintenance(
        registry.clone(),
        clients.clone(),
        config.purge_interval(),
        config.max_waiting_age(),
    ));

    let health_route = warp::path!("health").and_then(handler::health_handler);

    let lobby_route = warp::path!("lobby")
        .and(warp::get())
        .and(with_registry(registry.clone()))
        .and_then(handler::lobby_handler);

    let ws_route = warp::path("ws")
        .and(warp::ws())
        .and(with_clients(clients.clone()))
        .and(with_registry(registry.clone()))
        .and_then(handler::ws_handler);

    let routes = health_route.or(lobby_route).or(ws_route).with(
        warp::cors()
            .allow_methods(&[Method::OPTIONS, Method::GET])
            .allow_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
            .max_age(300)
            .allow_any_origin(),
    );

    let addr = config.addr();
    info!(%addr, "server listening");
    warp::serve(routes).run(addr).await;
    Ok(())
}

// Sweeps abandoned lobby games on a fixed interval, under the same lock as player actions
async fn run_maintenance(registry: Registry, clients: Clients, every: Duration, max_age: Duration) {
    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick fires immediately
    timer.tick().await;

    loop {
        timer.tick().await;
        let mut registry = registry.write().await;
        let deliveries = dispatch::handle_purge(&mut *registry, max_age);
        dispatch::deliver(&*clients.read().await, deliveries);
    }
}

fn with_clients(clients: Clients) -> impl Filter<Extract = (Clients,), Error = Infallible> + Clone {
    warp::any().map(move || clients.clone())
}

fn with_registry(
    registry: Registry,
) -> impl Filter<Extract = (Registry,), Error = Infallible> + Clone {
    warp::any().map(move || registry.clone())
}
