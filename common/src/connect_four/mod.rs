mod board;
mod player;
mod registry;
mod session;

pub use board::{Board, BoardError, Cell, CellPosition, COLS, CONNECT_LENGTH, ROWS};
pub use player::{PlayerNum, Seat};
pub use registry::{
    CodeGenerator, Created, Departure, Joined, LobbyEntry, Participant, PlacedMove, RandomCodes,
    RegistryError, RematchOutcome, Removal, SessionRegistry, CODE_LENGTH, MAX_CODE_ATTEMPTS,
    MAX_NAME_LENGTH,
};
pub use session::{
    now_millis, GameOver, LeaveEffect, Outcome, RematchStep, Session, SessionError, Status,
};
