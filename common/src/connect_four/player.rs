use serde::{Deserialize, Serialize};
use std::fmt;

/// A participant's fixed seat in a session. The host always plays `P1`.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlayerNum {
    P1,
    P2,
}

impl PlayerNum {
    pub fn opponent(self) -> PlayerNum {
        match self {
            PlayerNum::P1 => PlayerNum::P2,
            PlayerNum::P2 => PlayerNum::P1,
        }
    }
}

impl fmt::Display for PlayerNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerNum::P1 => write!(f, "player 1"),
            PlayerNum::P2 => write!(f, "player 2"),
        }
    }
}

/// A connected participant's name and connection as recorded inside a session.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Seat {
    pub connection_id: String,
    pub name: String,
}

impl Seat {
    pub fn new(connection_id: impl Into<String>, name: impl Into<String>) -> Self {
        Seat {
            connection_id: connection_id.into(),
            name: name.into(),
        }
    }
}
