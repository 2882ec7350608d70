use crate::client::SendMsg;
use crate::util;
use common::messages::{Request, Response};
use common::{
    CodeGenerator, Departure, LeaveEffect, PlayerNum, RegistryError, RematchOutcome,
    SessionRegistry,
};
use hashbrown::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

pub type Registry = Arc<RwLock<SessionRegistry>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Connection(String),
    Connections(Vec<String>),
    Everyone,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: Target,
    pub response: Response,
}

impl Delivery {
    pub fn to(id: impl Into<String>, response: Response) -> Self {
        Delivery {
            target: Target::Connection(id.into()),
            response,
        }
    }

    fn to_all(ids: Vec<String>, response: Response) -> Self {
        Delivery {
            target: Target::Connections(ids),
            response,
        }
    }

    fn everyone(response: Response) -> Self {
        Delivery {
            target: Target::Everyone,
            response,
        }
    }
}

type Deliveries = Result<Vec<Delivery>, RegistryError>;

fn lobby_update<G: CodeGenerator>(registry: &SessionRegistry<G>) -> Delivery {
    Delivery::everyone(Response::LobbyUpdate(registry.list_waiting_sessions()))
}

// A freshly connected socket gets the lobby straight away, before it has a name
pub fn handle_connect<G: CodeGenerator>(registry: &SessionRegistry<G>, id: &str) -> Vec<Delivery> {
    vec![Delivery::to(
        id,
        Response::LobbyUpdate(registry.list_waiting_sessions()),
    )]
}

/// Applies one inbound request and decides who hears about it.
///
/// Rejected requests produce a single error addressed to the sender and leave the
/// registry untouched.
pub fn handle_request<G: CodeGenerator>(
    registry: &mut SessionRegistry<G>,
    id: &str,
    request: Request,
) -> Vec<Delivery> {
    let result = match request {
        Request::JoinLobby(name) => join_lobby(registry, id, &name),
        Request::CreateGame => create_game(registry, id),
        Request::JoinGame(code) => join_game(registry, id, &code),
        Request::MakeMove(column) => make_move(registry, id, column),
        Request::LeaveGame => Ok(leave_game(registry, id)),
        Request::RequestRematch => request_rematch(registry, id),
    };
    match result {
        Ok(deliveries) => deliveries,
        Err(err) => {
            warn!(connection = id, %err, "request rejected");
            vec![Delivery::to(id, Response::Error(err.to_string()))]
        }
    }
}

// Same as leaving the game and then forgetting the participant
pub fn handle_disconnect<G: CodeGenerator>(
    registry: &mut SessionRegistry<G>,
    id: &str,
) -> Vec<Delivery> {
    let removal = match registry.remove_participant(id) {
        Some(removal) => removal,
        None => return vec![],
    };
    info!(connection = id, name = %removal.participant.name, "participant disconnected");
    let mut deliveries = removal
        .departure
        .map(|d| departure_notices(registry, &d))
        .unwrap_or_default();
    deliveries.push(lobby_update(registry));
    deliveries
}

pub fn handle_purge<G: CodeGenerator>(
    registry: &mut SessionRegistry<G>,
    max_age: Duration,
) -> Vec<Delivery> {
    let purged = registry.purge_stale(max_age);
    if purged == 0 {
        return vec![];
    }
    info!(purged, "cleaned up old waiting games");
    vec![lobby_update(registry)]
}

fn join_lobby<G: CodeGenerator>(registry: &mut SessionRegistry<G>, id: &str, name: &str) -> Deliveries {
    registry.register_participant(id, name)?;
    Ok(vec![lobby_update(registry)])
}

fn create_game<G: CodeGenerator>(registry: &mut SessionRegistry<G>, id: &str) -> Deliveries {
    let created = registry.create_session(id)?;
    let mut deliveries = created
        .departure
        .map(|d| departure_notices(registry, &d))
        .unwrap_or_default();
    deliveries.push(Delivery::to(id, Response::GameCreated(created.session)));
    deliveries.push(Delivery::to(id, Response::PlayerNumber(PlayerNum::P1)));
    deliveries.push(lobby_update(registry));
    Ok(deliveries)
}

fn join_game<G: CodeGenerator>(registry: &mut SessionRegistry<G>, id: &str, code: &str) -> Deliveries {
    // Codes are typed by hand, so be forgiving about case and stray spaces
    let code = code.trim().to_uppercase();
    let joined = registry.join_session(&code, id)?;
    let mut deliveries = joined
        .departure
        .map(|d| departure_notices(registry, &d))
        .unwrap_or_default();
    deliveries.push(Delivery::to(
        joined.guest.clone(),
        Response::GameJoined {
            game: joined.session.clone(),
            player_number: PlayerNum::P2,
        },
    ));
    deliveries.push(Delivery::to(
        joined.guest,
        Response::PlayerNumber(PlayerNum::P2),
    ));
    deliveries.push(Delivery::to(
        joined.host,
        Response::GameJoined {
            game: joined.session,
            player_number: PlayerNum::P1,
        },
    ));
    deliveries.push(lobby_update(registry));
    Ok(deliveries)
}

fn make_move<G: CodeGenerator>(registry: &mut SessionRegistry<G>, id: &str, column: usize) -> Deliveries {
    let placed = registry.make_move(id, column)?;
    let mut deliveries = vec![Delivery::to_all(
        placed.recipients.clone(),
        Response::MoveMade {
            column: placed.column,
            row: placed.row,
            player: placed.player,
        },
    )];
    if let Some(game_over) = placed.game_over {
        info!(session = %placed.session_id, winner = ?game_over.winner, "game over");
        deliveries.push(Delivery::to_all(
            placed.recipients,
            Response::GameOver {
                winner: game_over.winner,
                winning_cells: game_over.line,
            },
        ));
    }
    Ok(deliveries)
}

fn leave_game<G: CodeGenerator>(registry: &mut SessionRegistry<G>, id: &str) -> Vec<Delivery> {
    match registry.leave_session(id) {
        Some(departure) => {
            let mut deliveries = departure_notices(registry, &departure);
            deliveries.push(lobby_update(registry));
            deliveries
        }
        None => vec![],
    }
}

fn request_rematch<G: CodeGenerator>(registry: &mut SessionRegistry<G>, id: &str) -> Deliveries {
    let delivery = match registry.request_rematch(id)? {
        RematchOutcome::Requested { by, opponent } => {
            Delivery::to(opponent, Response::RematchRequested { by })
        }
        RematchOutcome::Restarted {
            session,
            recipients,
        } => {
            info!(session = %session.id(), "rematch accepted");
            Delivery::to_all(recipients, Response::RematchAccepted(session))
        }
    };
    Ok(vec![delivery])
}

// Tells the opponent left behind, if any, and shows them the final result of a forfeit
fn departure_notices<G: CodeGenerator>(
    registry: &SessionRegistry<G>,
    departure: &Departure,
) -> Vec<Delivery> {
    let opponent = match &departure.opponent {
        Some(opponent) => opponent,
        None => return vec![],
    };
    let mut deliveries = vec![Delivery::to(opponent.clone(), Response::OpponentLeft)];
    if let LeaveEffect::Forfeited { .. } = departure.effect {
        if let Some(session) = registry.session(&departure.session_id) {
            deliveries.push(Delivery::to(
                opponent.clone(),
                Response::GameState(session.clone()),
            ));
        }
    }
    deliveries
}

/// Serializes each response once and hands it to every connection it targets.
///
/// Connections that are already gone are skipped.
pub fn deliver<S: SendMsg>(connections: &HashMap<String, S>, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        let text = match serde_json::to_string(&delivery.response) {
            Ok(text) => text,
            Err(err) => {
                error!("failed to serialize response {:?}: {}", delivery.response, err);
                continue;
            }
        };
        match &delivery.target {
            Target::Connection(id) => send_to(connections, id, &text),
            Target::Connections(ids) => ids.iter().for_each(|id| send_to(connections, id, &text)),
            Target::Everyone => connections.values().for_each(|c| send(c, &text)),
        }
    }
}

fn send_to<S: SendMsg>(connections: &HashMap<String, S>, id: &str, text: &str) {
    match connections.get(id) {
        Some(connection) => send(connection, text),
        None => warn!("no open connection for {}", id),
    }
}

fn send<S: SendMsg>(connection: &S, text: &str) {
    // If the message fails to send even after retries, there's not much we can do but proceed
    let _ = util::retry(1, || connection.send(text));
}
