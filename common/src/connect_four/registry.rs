use crate::connect_four::player::{PlayerNum, Seat};
use crate::connect_four::session::{
    now_millis, GameOver, LeaveEffect, RematchStep, Session, SessionError, Status,
};
use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_NAME_LENGTH: usize = 20;
pub const CODE_LENGTH: usize = 6;
pub const MAX_CODE_ATTEMPTS: usize = 1000;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Please enter a username first")]
    NotRegistered,
    #[error("Username is required")]
    InvalidName,
    #[error("Game {0} not found")]
    SessionNotFound(String),
    #[error("You cannot join your own game")]
    SelfJoin,
    #[error("Not in a game")]
    NotInGame,
    #[error("Your opponent has left the game")]
    OpponentLeft,
    #[error("Could not generate a unique game code after {0} attempts")]
    CodeSpaceExhausted(usize),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub trait CodeGenerator {
    fn generate(&mut self) -> String;
}

#[derive(Debug)]
pub struct RandomCodes {
    rng: StdRng,
}

impl Default for RandomCodes {
    fn default() -> Self {
        RandomCodes {
            rng: StdRng::from_entropy(),
        }
    }
}

impl CodeGenerator for RandomCodes {
    fn generate(&mut self) -> String {
        (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[self.rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect()
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: String,
    pub name: String,
    pub session: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LobbyEntry {
    pub id: String,
    pub host_name: String,
    pub created_at: u64,
}

impl From<&Session> for LobbyEntry {
    fn from(session: &Session) -> Self {
        LobbyEntry {
            id: session.id().to_string(),
            host_name: session.host().name.clone(),
            created_at: session.created_at(),
        }
    }
}

/// What happened to a session when a participant was detached from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub session_id: String,
    pub effect: LeaveEffect,
    // The other participant, if they are still attached and should hear about it
    pub opponent: Option<String>,
    pub session_removed: bool,
}

#[derive(Debug, Clone)]
pub struct Created {
    pub session: Session,
    pub departure: Option<Departure>,
}

#[derive(Debug, Clone)]
pub struct Joined {
    pub session: Session,
    pub host: String,
    pub guest: String,
    pub departure: Option<Departure>,
}

#[derive(Debug, Clone)]
pub struct PlacedMove {
    pub session_id: String,
    pub column: usize,
    pub row: usize,
    pub player: PlayerNum,
    pub recipients: Vec<String>,
    // Present only on the move that ended the game
    pub game_over: Option<GameOver>,
}

#[derive(Debug, Clone)]
pub enum RematchOutcome {
    // Relay the request to the opponent
    Requested { by: String, opponent: String },
    // Both agreed, send the fresh game to both
    Restarted {
        session: Session,
        recipients: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Removal {
    pub participant: Participant,
    pub departure: Option<Departure>,
}

/// Owns every live session and connected participant.
///
/// A participant is attached to at most one session at a time. Creating or joining a
/// session first detaches the participant from wherever they were, running the same
/// leave transition an explicit leave would.
#[derive(Debug)]
pub struct SessionRegistry<G: CodeGenerator = RandomCodes> {
    participants: HashMap<String, Participant>,
    sessions: HashMap<String, Session>,
    codes: G,
    // Creation timestamps are kept strictly increasing so lobby order is total
    last_created_at: u64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        SessionRegistry::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry::with_generator(RandomCodes::default())
    }
}

impl<G: CodeGenerator> SessionRegistry<G> {
    pub fn with_generator(codes: G) -> Self {
        SessionRegistry {
            participants: HashMap::new(),
            sessions: HashMap::new(),
            codes,
            last_created_at: 0,
        }
    }

    pub fn participant(&self, connection_id: &str) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn session_of(&self, connection_id: &str) -> Option<&Session> {
        self.participants
            .get(connection_id)
            .and_then(|p| p.session.as_ref())
            .and_then(|id| self.sessions.get(id))
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn register_participant(
        &mut self,
        connection_id: &str,
        name: &str,
    ) -> Result<&Participant, RegistryError> {
        let name: String = name.trim().chars().take(MAX_NAME_LENGTH).collect();
        // Trimming again drops whitespace exposed by the cut
        let name = name.trim_end().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        info!(connection = connection_id, %name, "participant registered");
        let participant = self
            .participants
            .entry(connection_id.to_string())
            .and_modify(|p| p.name = name.clone())
            .or_insert_with(|| Participant {
                connection_id: connection_id.to_string(),
                name,
                session: None,
            });
        Ok(participant)
    }

    pub fn create_session(&mut self, host_id: &str) -> Result<Created, RegistryError> {
        let name = self
            .participants
            .get(host_id)
            .map(|p| p.name.clone())
            .ok_or(RegistryError::NotRegistered)?;
        let code = self.unique_code()?;
        let departure = self.detach(host_id);

        let created_at = self.next_created_at();
        let session = Session::new(code.clone(), Seat::new(host_id, name), created_at);
        self.sessions.insert(code.clone(), session.clone());
        self.attach(host_id, &code);
        info!(session = %code, host = host_id, "session created");

        Ok(Created { session, departure })
    }

    pub fn join_session(
        &mut self,
        session_id: &str,
        guest_id: &str,
    ) -> Result<Joined, RegistryError> {
        let name = self
            .participants
            .get(guest_id)
            .map(|p| p.name.clone())
            .ok_or(RegistryError::NotRegistered)?;
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;
        if session.host().connection_id == guest_id {
            return Err(RegistryError::SelfJoin);
        }
        session.expect_status(Status::Waiting)?;

        let departure = self.detach(guest_id);
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;
        session.add_guest(Seat::new(guest_id, name))?;
        let joined = Joined {
            session: session.clone(),
            host: session.host().connection_id.clone(),
            guest: guest_id.to_string(),
            departure,
        };
        self.attach(guest_id, session_id);
        Ok(joined)
    }

    // Not being in a session is not an error here, disconnect races make it routine
    pub fn leave_session(&mut self, connection_id: &str) -> Option<Departure> {
        self.detach(connection_id)
    }

    pub fn make_move(
        &mut self,
        connection_id: &str,
        column: usize,
    ) -> Result<PlacedMove, RegistryError> {
        let session_id = self.attached_session_id(connection_id)?;
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::NotInGame)?;
        let player = session
            .player_num(connection_id)
            .ok_or(SessionError::NotParticipant)?;
        let row = session.make_move(connection_id, column)?;
        let game_over = session.outcome().map(GameOver::from);
        Ok(PlacedMove {
            session_id: session_id.clone(),
            column,
            row,
            player,
            recipients: self.attached_seats(&session_id),
            game_over,
        })
    }

    pub fn request_rematch(&mut self, connection_id: &str) -> Result<RematchOutcome, RegistryError> {
        let session_id = self.attached_session_id(connection_id)?;
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(RegistryError::NotInGame)?;
        session.expect_status(Status::Finished)?;
        let opponent = session
            .opponent_of(connection_id)
            .map(|seat| seat.connection_id.clone())
            .filter(|id| self.is_attached(id, &session_id))
            .ok_or(RegistryError::OpponentLeft)?;

        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(RegistryError::NotInGame)?;
        match session.request_rematch(connection_id)? {
            RematchStep::Pending => {
                let by = self
                    .participants
                    .get(connection_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                debug!(session = %session_id, %by, "rematch requested");
                Ok(RematchOutcome::Requested { by, opponent })
            }
            RematchStep::Restarted => {
                let session = session.clone();
                Ok(RematchOutcome::Restarted {
                    session,
                    recipients: self.attached_seats(&session_id),
                })
            }
        }
    }

    // Newest first
    pub fn list_waiting_sessions(&self) -> Vec<LobbyEntry> {
        let mut waiting: Vec<LobbyEntry> = self
            .sessions
            .values()
            .filter(|s| s.status() == Status::Waiting)
            .map(LobbyEntry::from)
            .collect();
        waiting.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        waiting
    }

    pub fn remove_participant(&mut self, connection_id: &str) -> Option<Removal> {
        let departure = self.detach(connection_id);
        let participant = self.participants.remove(connection_id)?;
        info!(connection = connection_id, name = %participant.name, "participant removed");
        Some(Removal {
            participant,
            departure,
        })
    }

    pub fn purge_stale(&mut self, max_age: Duration) -> usize {
        self.purge_stale_at(now_millis(), max_age)
    }

    pub fn purge_stale_at(&mut self, now: u64, max_age: Duration) -> usize {
        let stale: Vec<(String, String)> = self
            .sessions
            .values()
            .filter(|s| s.is_stale(now, max_age))
            .map(|s| (s.id().to_string(), s.host().connection_id.clone()))
            .collect();
        for (session_id, host_id) in &stale {
            self.sessions.remove(session_id);
            if let Some(host) = self.participants.get_mut(host_id) {
                if host.session.as_deref() == Some(session_id.as_str()) {
                    host.session = None;
                }
            }
            info!(session = %session_id, "stale session purged");
        }
        stale.len()
    }

    fn unique_code(&mut self) -> Result<String, RegistryError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = self.codes.generate();
            if !self.sessions.contains_key(&code) {
                return Ok(code);
            }
            debug!(%code, "session code collision");
        }
        warn!("session code space exhausted");
        Err(RegistryError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    fn next_created_at(&mut self) -> u64 {
        self.last_created_at = now_millis().max(self.last_created_at + 1);
        self.last_created_at
    }

    fn attach(&mut self, connection_id: &str, session_id: &str) {
        if let Some(participant) = self.participants.get_mut(connection_id) {
            participant.session = Some(session_id.to_string());
        }
    }

    fn attached_session_id(&self, connection_id: &str) -> Result<String, RegistryError> {
        self.participants
            .get(connection_id)
            .ok_or(RegistryError::NotRegistered)?
            .session
            .clone()
            .ok_or(RegistryError::NotInGame)
    }

    fn is_attached(&self, connection_id: &str, session_id: &str) -> bool {
        self.participants
            .get(connection_id)
            .and_then(|p| p.session.as_deref())
            == Some(session_id)
    }

    // Connections seated in the session that have not left it
    fn attached_seats(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .get(session_id)
            .map(|s| {
                s.seats()
                    .map(|seat| seat.connection_id.clone())
                    .filter(|id| self.is_attached(id, session_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    // Runs the session's leave transition and clears the attachment. A session is
    // dropped once it was abandoned before starting or nobody is left attached to it.
    fn detach(&mut self, connection_id: &str) -> Option<Departure> {
        let session_id = self.participants.get_mut(connection_id)?.session.take()?;
        let session = match self.sessions.get_mut(&session_id) {
            Some(session) => session,
            None => {
                debug!(session = %session_id, "attachment pointed at a removed session");
                return None;
            }
        };

        let effect = session.leave(connection_id);
        let opponent = session
            .opponent_of(connection_id)
            .map(|seat| seat.connection_id.clone())
            .filter(|id| {
                self.participants
                    .get(id)
                    .and_then(|p| p.session.as_deref())
                    == Some(session_id.as_str())
            });
        let session_removed = effect == LeaveEffect::Abandoned || opponent.is_none();
        if session_removed {
            self.sessions.remove(&session_id);
        }
        info!(
            session = %session_id,
            connection = connection_id,
            ?effect,
            session_removed,
            "participant left session"
        );

        Some(Departure {
            session_id,
            effect,
            opponent,
            session_removed,
        })
    }
}
