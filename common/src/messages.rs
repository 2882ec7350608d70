use crate::connect_four::{CellPosition, LobbyEntry, PlayerNum, Session};
use serde::{Deserialize, Serialize};

// Every message on the wire looks like {"event": "make-move", "data": 3}.
// Events without a payload omit "data".

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Request {
    JoinLobby(String),
    CreateGame,
    JoinGame(String),
    MakeMove(usize),
    LeaveGame,
    RequestRematch,
}

#[derive(Serialize, Clone, Debug)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Response {
    LobbyUpdate(Vec<LobbyEntry>),
    GameCreated(Session),
    GameJoined {
        game: Session,
        player_number: PlayerNum,
    },
    GameState(Session),
    MoveMade {
        column: usize,
        row: usize,
        player: PlayerNum,
    },
    GameOver {
        winner: Option<PlayerNum>,
        winning_cells: Option<Vec<CellPosition>>,
    },
    OpponentLeft,
    RematchRequested {
        by: String,
    },
    RematchAccepted(Session),
    Error(String),
    PlayerNumber(PlayerNum),
}
