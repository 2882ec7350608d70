use crate::connect_four::board::{Board, CellPosition, COLS};
use crate::connect_four::player::{PlayerNum, Seat};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

// Milliseconds since the Unix epoch. A clock set before 1970 reads as zero.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Waiting,
    Playing,
    Finished,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Waiting => write!(f, "waiting"),
            Status::Playing => write!(f, "playing"),
            Status::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Game is {actual}, not {expected}")]
    WrongState { expected: Status, actual: Status },
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Invalid column {0}")]
    InvalidColumn(usize),
    #[error("Column {0} is full")]
    ColumnFull(usize),
    #[error("Game already has two players")]
    GuestPresent,
    #[error("Not a player in this game")]
    NotParticipant,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    Win {
        winner: PlayerNum,
        line: Vec<CellPosition>,
    },
    // The opponent left mid-game
    Forfeit {
        winner: PlayerNum,
    },
    Draw,
}

impl Outcome {
    pub fn winner(&self) -> Option<PlayerNum> {
        match self {
            Outcome::Win { winner, .. } | Outcome::Forfeit { winner } => Some(*winner),
            Outcome::Draw => None,
        }
    }

    pub fn line(&self) -> Option<&[CellPosition]> {
        match self {
            Outcome::Win { line, .. } => Some(line),
            _ => None,
        }
    }
}

/// The result of a finished game as announced to both players.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct GameOver {
    pub winner: Option<PlayerNum>,
    pub line: Option<Vec<CellPosition>>,
}

impl From<&Outcome> for GameOver {
    fn from(outcome: &Outcome) -> Self {
        GameOver {
            winner: outcome.winner(),
            line: outcome.line().map(<[CellPosition]>::to_vec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveEffect {
    // Nobody had joined yet, so the session should be discarded
    Abandoned,
    Forfeited { winner: PlayerNum },
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchStep {
    // Waiting for the other player to agree
    Pending,
    Restarted,
}

/// A single room: the board, whose turn it is and how the game ended.
///
/// Every transition either succeeds or returns a [`SessionError`] without touching any
/// field, so a rejected call can be retried straight away.
#[derive(Serialize, Clone, Debug)]
pub struct Session {
    id: String,
    host: Seat,
    guest: Option<Seat>,
    board: Board,
    turn: PlayerNum,
    status: Status,
    outcome: Option<Outcome>,
    rematch_requested_by: Option<String>,
    created_at: u64,
}

impl Session {
    pub fn new(id: String, host: Seat, created_at: u64) -> Self {
        Session {
            id,
            host,
            guest: None,
            board: Board::new(),
            turn: PlayerNum::P1,
            status: Status::Waiting,
            outcome: None,
            rematch_requested_by: None,
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &Seat {
        &self.host
    }

    pub fn guest(&self) -> Option<&Seat> {
        self.guest.as_ref()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> PlayerNum {
        self.turn
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn rematch_requested_by(&self) -> Option<&str> {
        self.rematch_requested_by.as_deref()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn player_num(&self, connection_id: &str) -> Option<PlayerNum> {
        if self.host.connection_id == connection_id {
            Some(PlayerNum::P1)
        } else if self
            .guest
            .as_ref()
            .map_or(false, |g| g.connection_id == connection_id)
        {
            Some(PlayerNum::P2)
        } else {
            None
        }
    }

    pub fn seat(&self, player_num: PlayerNum) -> Option<&Seat> {
        match player_num {
            PlayerNum::P1 => Some(&self.host),
            PlayerNum::P2 => self.guest.as_ref(),
        }
    }

    // Given a participant's connection, gets the other participant in this session
    pub fn opponent_of(&self, connection_id: &str) -> Option<&Seat> {
        self.player_num(connection_id)
            .and_then(|num| self.seat(num.opponent()))
    }

    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        std::iter::once(&self.host).chain(self.guest.as_ref())
    }

    pub fn is_stale(&self, now: u64, max_age: Duration) -> bool {
        self.status == Status::Waiting
            && u128::from(now.saturating_sub(self.created_at)) > max_age.as_millis()
    }

    pub fn expect_status(&self, expected: Status) -> Result<(), SessionError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(SessionError::WrongState {
                expected,
                actual: self.status,
            })
        }
    }

    pub fn add_guest(&mut self, guest: Seat) -> Result<(), SessionError> {
        if self.guest.is_some() {
            return Err(SessionError::GuestPresent);
        }
        self.expect_status(Status::Waiting)?;
        info!(session = %self.id, guest = %guest.name, "guest joined");
        self.guest = Some(guest);
        self.status = Status::Playing;
        Ok(())
    }

    /// Drops a piece for `connection_id` into `column` and returns the row it landed in.
    pub fn make_move(&mut self, connection_id: &str, column: usize) -> Result<usize, SessionError> {
        self.expect_status(Status::Playing)?;
        if self.player_num(connection_id) != Some(self.turn) {
            return Err(SessionError::NotYourTurn);
        }
        if column >= COLS {
            return Err(SessionError::InvalidColumn(column));
        }
        let row = self
            .board
            .lowest_empty_row(column)
            .ok_or(SessionError::ColumnFull(column))?;
        let position =
            CellPosition::new(row, column).map_err(|_| SessionError::InvalidColumn(column))?;

        self.board.place(position, self.turn);
        debug!(session = %self.id, player = %self.turn, %position, "piece placed");

        if let Some(line) = self.board.detect_line(position) {
            self.finish(Outcome::Win {
                winner: self.turn,
                line,
            });
        } else if self.board.is_top_row_full() {
            self.finish(Outcome::Draw);
        } else {
            self.turn = self.turn.opponent();
        }
        Ok(row)
    }

    pub fn leave(&mut self, connection_id: &str) -> LeaveEffect {
        match self.status {
            Status::Waiting => LeaveEffect::Abandoned,
            Status::Finished => LeaveEffect::Unchanged,
            Status::Playing => match self.player_num(connection_id) {
                Some(leaver) => {
                    let winner = leaver.opponent();
                    self.finish(Outcome::Forfeit { winner });
                    LeaveEffect::Forfeited { winner }
                }
                None => LeaveEffect::Unchanged,
            },
        }
    }

    pub fn request_rematch(&mut self, connection_id: &str) -> Result<RematchStep, SessionError> {
        self.expect_status(Status::Finished)?;
        if self.player_num(connection_id).is_none() {
            return Err(SessionError::NotParticipant);
        }
        let confirmed = matches!(
            &self.rematch_requested_by,
            Some(holder) if holder != connection_id
        );
        if confirmed {
            self.reset();
            return Ok(RematchStep::Restarted);
        }
        self.rematch_requested_by = Some(connection_id.to_string());
        Ok(RematchStep::Pending)
    }

    fn finish(&mut self, outcome: Outcome) {
        info!(session = %self.id, ?outcome, "game finished");
        self.status = Status::Finished;
        self.outcome = Some(outcome);
    }

    fn reset(&mut self) {
        info!(session = %self.id, "rematch started");
        self.board = Board::new();
        self.turn = PlayerNum::P1;
        self.status = Status::Playing;
        self.outcome = None;
        self.rematch_requested_by = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect_four::board::{Cell, ROWS};

    // A column order for 42 alternating moves that fills the board without any four in a row
    const DRAW_SEQUENCE: [usize; 42] = [
        5, 4, 5, 0, 6, 2, 4, 5, 5, 0, 4, 1, 1, 0, 4, 5, 6, 5, 3, 1, 1, 2, 2, 6, 2, 6, 6, 3, 6, 2,
        0, 3, 0, 3, 3, 4, 3, 1, 4, 2, 1, 0,
    ];

    fn playing_session() -> Session {
        let mut session = Session::new("ABC123".to_string(), Seat::new("host", "Alice"), 0);
        session.add_guest(Seat::new("guest", "Bob")).unwrap();
        session
    }

    fn pos(row: usize, column: usize) -> CellPosition {
        CellPosition::new(row, column).unwrap()
    }

    fn play(session: &mut Session, columns: &[usize]) {
        for column in columns {
            let mover = match session.turn() {
                PlayerNum::P1 => "host",
                PlayerNum::P2 => "guest",
            };
            session.make_move(mover, *column).unwrap();
        }
    }

    #[test]
    fn test_new_session_is_waiting() {
        let session = Session::new("ABC123".to_string(), Seat::new("host", "Alice"), 7);
        assert_eq!(session.status(), Status::Waiting);
        assert_eq!(session.turn(), PlayerNum::P1);
        assert_eq!(session.created_at(), 7);
        assert!(session.guest().is_none());
        assert!(session.outcome().is_none());
    }

    #[test]
    fn test_add_guest() {
        let mut session = playing_session();
        assert_eq!(session.status(), Status::Playing);
        assert_eq!(session.player_num("host"), Some(PlayerNum::P1));
        assert_eq!(session.player_num("guest"), Some(PlayerNum::P2));
        assert_eq!(session.opponent_of("guest").unwrap().name, "Alice");
        assert_eq!(session.seats().count(), 2);

        let err = session.add_guest(Seat::new("third", "Carol")).unwrap_err();
        assert_eq!(err, SessionError::GuestPresent);
        assert_eq!(session.guest().unwrap().connection_id, "guest");
    }

    #[test]
    fn test_move_rejected_while_waiting() {
        let mut session = Session::new("ABC123".to_string(), Seat::new("host", "Alice"), 0);
        assert_eq!(
            session.make_move("host", 0),
            Err(SessionError::WrongState {
                expected: Status::Playing,
                actual: Status::Waiting
            })
        );
        assert_eq!(session.board(), &Board::new());
    }

    #[test]
    fn test_move_rejections_leave_state_unchanged() {
        let mut session = playing_session();
        assert_eq!(session.make_move("guest", 0), Err(SessionError::NotYourTurn));
        assert_eq!(session.make_move("stranger", 0), Err(SessionError::NotYourTurn));
        assert_eq!(
            session.make_move("host", COLS),
            Err(SessionError::InvalidColumn(COLS))
        );
        assert_eq!(session.board(), &Board::new());
        assert_eq!(session.turn(), PlayerNum::P1);

        play(&mut session, &[2, 2, 2, 2, 2, 2]);
        assert_eq!(session.make_move("host", 2), Err(SessionError::ColumnFull(2)));
        assert_eq!(session.turn(), PlayerNum::P1);
        assert_eq!(session.status(), Status::Playing);
    }

    #[test]
    fn test_turns_alternate() {
        let mut session = playing_session();
        assert_eq!(session.make_move("host", 3), Ok(ROWS - 1));
        assert_eq!(session.turn(), PlayerNum::P2);
        assert_eq!(session.make_move("guest", 3), Ok(ROWS - 2));
        assert_eq!(session.turn(), PlayerNum::P1);
        assert_eq!(
            session.board().cell(pos(ROWS - 1, 3)),
            Cell::Piece {
                player_num: PlayerNum::P1
            }
        );
        assert_eq!(
            session.board().cell(pos(ROWS - 2, 3)),
            Cell::Piece {
                player_num: PlayerNum::P2
            }
        );
    }

    #[test]
    fn test_vertical_win() {
        let mut session = playing_session();
        play(&mut session, &[3, 0, 3, 0, 3, 0]);
        assert_eq!(session.make_move("host", 3), Ok(2));
        assert_eq!(session.status(), Status::Finished);
        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.winner(), Some(PlayerNum::P1));
        assert_eq!(
            outcome.line().unwrap(),
            &[pos(2, 3), pos(3, 3), pos(4, 3), pos(5, 3)]
        );
        // Turn stays with the winner
        assert_eq!(session.turn(), PlayerNum::P1);
        assert_eq!(
            session.make_move("guest", 0),
            Err(SessionError::WrongState {
                expected: Status::Playing,
                actual: Status::Finished
            })
        );
    }

    #[test]
    fn test_draw() {
        let mut session = playing_session();
        play(&mut session, &DRAW_SEQUENCE[..41]);
        assert_eq!(session.status(), Status::Playing);
        play(&mut session, &DRAW_SEQUENCE[41..]);
        assert!(session.board().is_top_row_full());
        assert_eq!(session.status(), Status::Finished);
        assert_eq!(session.outcome(), Some(&Outcome::Draw));
        assert_eq!(GameOver::from(session.outcome().unwrap()).winner, None);
    }

    #[test]
    fn test_leave_while_playing_forfeits() {
        let mut session = playing_session();
        assert_eq!(
            session.leave("guest"),
            LeaveEffect::Forfeited {
                winner: PlayerNum::P1
            }
        );
        assert_eq!(session.status(), Status::Finished);
        let game_over = GameOver::from(session.outcome().unwrap());
        assert_eq!(game_over.winner, Some(PlayerNum::P1));
        assert_eq!(game_over.line, None);

        // A second departure does not overwrite the result
        assert_eq!(session.leave("host"), LeaveEffect::Unchanged);
        assert_eq!(session.outcome().unwrap().winner(), Some(PlayerNum::P1));
    }

    #[test]
    fn test_leave_while_waiting_abandons() {
        let mut session = Session::new("ABC123".to_string(), Seat::new("host", "Alice"), 0);
        assert_eq!(session.leave("host"), LeaveEffect::Abandoned);
        assert_eq!(session.status(), Status::Waiting);
    }

    #[test]
    fn test_rematch_requires_both_players() {
        let mut session = playing_session();
        assert!(matches!(
            session.request_rematch("host"),
            Err(SessionError::WrongState { .. })
        ));
        play(&mut session, &[3, 0, 3, 0, 3, 0, 3]);

        assert_eq!(session.request_rematch("host"), Ok(RematchStep::Pending));
        assert_eq!(session.rematch_requested_by(), Some("host"));
        assert_eq!(session.request_rematch("host"), Ok(RematchStep::Pending));
        assert_eq!(session.status(), Status::Finished);
        assert_eq!(
            session.request_rematch("stranger"),
            Err(SessionError::NotParticipant)
        );

        assert_eq!(session.request_rematch("guest"), Ok(RematchStep::Restarted));
        assert_eq!(session.id(), "ABC123");
        assert_eq!(session.status(), Status::Playing);
        assert_eq!(session.turn(), PlayerNum::P1);
        assert_eq!(session.board(), &Board::new());
        assert!(session.outcome().is_none());
        assert!(session.rematch_requested_by().is_none());
    }

    #[test]
    fn test_is_stale() {
        let session = Session::new("ABC123".to_string(), Seat::new("host", "Alice"), 1_000);
        let max_age = Duration::from_secs(1);
        assert!(!session.is_stale(2_000, max_age));
        assert!(session.is_stale(2_001, max_age));
        assert!(!playing_session().is_stale(u64::MAX, max_age));
    }
}
