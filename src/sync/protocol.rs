//! Record Wire Format
//!
//! Maps the typed records onto the flat JSON documents kept in the store.
//!
//! Game sessions keep their historical shape with per-player field names:
//!
//! ```text
//! games/alice-A-vs-bob-B
//! {
//!   "player1": "alice-A", "player2": "bob-B", "status": "pending",
//!   "alice-AStatus": "pending", "alice-AMove": "idle",
//!   "bob-BStatus": "pending",   "bob-BMove": "idle"
//! }
//! ```
//!
//! Inside the crate those fields are explicit maps on [`GameSession`]; the
//! dynamic names exist only here.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::geo::Position;
use crate::game::moves::Move;
use crate::game::player::{Player, PlayerId, Team};
use crate::game::session::{GameSession, PlayerStatus, SessionId, SessionStatus};
use crate::store::{field, Document, StoreError};

/// Field holding the first player id.
pub const FIELD_PLAYER1: &str = "player1";
/// Field holding the second player id.
pub const FIELD_PLAYER2: &str = "player2";
/// Session-wide status field.
pub const FIELD_STATUS: &str = "status";
/// Player location field.
pub const FIELD_LOCATION: &str = "location";
/// Session a player is currently in.
pub const FIELD_CURRENT_GAME: &str = "currentGameId";

/// Name of a player's status field.
pub fn status_field(player: &PlayerId) -> String {
    format!("{}Status", player)
}

/// Name of a player's move field.
pub fn move_field(player: &PlayerId) -> String {
    format!("{}Move", player)
}

// =============================================================================
// GAME SESSIONS
// =============================================================================

/// Full document for a fresh session.
pub fn encode_session(session: &GameSession) -> Document {
    let mut document = Document::new();
    document.insert(FIELD_PLAYER1.into(), json!(session.player_a));
    document.insert(FIELD_PLAYER2.into(), json!(session.player_b));
    document.insert(FIELD_STATUS.into(), json!(session.status.as_str()));
    for player in [&session.player_a, &session.player_b] {
        document.insert(status_field(player), json!(session.status_of(player).as_str()));
        document.insert(move_field(player), json!(session.move_of(player).as_str()));
    }
    document
}

/// Decode a session document.
///
/// Missing per-player fields decode as pending / idle.
pub fn decode_session(id: &str, document: &Document) -> Result<GameSession, StoreError> {
    let player_a = PlayerId::new(required_str(document, FIELD_PLAYER1)?);
    let player_b = PlayerId::new(required_str(document, FIELD_PLAYER2)?);
    let status: SessionStatus = decode_field(document, FIELD_STATUS)?.unwrap_or_default();

    let mut session = GameSession::new(&player_a, &player_b);
    session.id = SessionId::from_raw(id);
    session.status = status;
    for player in [player_a, player_b] {
        let player_status: Option<PlayerStatus> = decode_field(document, &status_field(&player))?;
        let player_move: Option<Move> = decode_field(document, &move_field(&player))?;
        session.player_status.insert(player.clone(), player_status.unwrap_or_default());
        session.moves.insert(player, player_move.unwrap_or_default());
    }
    Ok(session)
}

/// Partial update setting one player's status.
pub fn player_status_update(player: &PlayerId, status: PlayerStatus) -> Document {
    field(status_field(player), status.as_str())
}

/// Partial update setting one player's move.
pub fn move_update(player: &PlayerId, mv: Move) -> Document {
    field(move_field(player), mv.as_str())
}

/// Partial update setting the session-wide status.
pub fn session_status_update(status: SessionStatus) -> Document {
    field(FIELD_STATUS, status.as_str())
}

// =============================================================================
// PLAYERS
// =============================================================================

#[derive(Deserialize)]
struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

/// Document written on login.
pub fn encode_new_player(name: &str, player: &Player) -> Document {
    let mut document = Document::new();
    document.insert("name".into(), json!(name));
    document.insert("team".into(), json!(player.team.to_string()));
    document.insert(FIELD_CURRENT_GAME.into(), json!(""));
    document.insert(FIELD_LOCATION.into(), encode_location(player.position));
    document
}

/// Location value, `null` when unknown.
pub fn encode_location(position: Option<Position>) -> Value {
    match position {
        Some(p) => json!({"latitude": p.latitude, "longitude": p.longitude}),
        None => Value::Null,
    }
}

/// Partial update of a player's location.
pub fn location_update(position: Position) -> Document {
    field(FIELD_LOCATION, encode_location(Some(position)))
}

/// Decode a player's location. Missing or `null` means unknown.
pub fn decode_location(document: &Document) -> Result<Option<Position>, StoreError> {
    let point: Option<GeoPoint> = decode_field(document, FIELD_LOCATION)?;
    Ok(point.map(|p| Position::new(p.latitude, p.longitude)))
}

/// Decode a player document.
pub fn decode_player(id: &str, document: &Document) -> Result<Player, StoreError> {
    let team: Team = required_str(document, "team")?
        .parse()
        .map_err(|e| StoreError::Malformed(format!("players/{}: {}", id, e)))?;
    Ok(Player {
        id: PlayerId::new(id),
        team,
        position: decode_location(document)?,
    })
}

// =============================================================================
// HELPERS
// =============================================================================

fn required_str(document: &Document, name: &str) -> Result<String, StoreError> {
    document
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StoreError::Malformed(format!("missing string field `{}`", name)))
}

fn decode_field<T: serde::de::DeserializeOwned>(document: &Document, name: &str) -> Result<Option<T>, StoreError> {
    match document.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| StoreError::Malformed(format!("field `{}`: {}", name, e))),
    }
}
