//! Moves and Round Resolution
//!
//! Rock beats scissors, scissors beats paper, paper beats rock.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// A player's move field in a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    /// No move submitted for the current round.
    #[default]
    Idle,
    /// Rock
    Rock,
    /// Paper
    Paper,
    /// Scissors
    Scissors,
}

impl Move {
    /// The three playable moves.
    pub const PLAYABLE: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// True for rock, paper or scissors.
    #[inline]
    pub fn is_playable(self) -> bool {
        !matches!(self, Move::Idle)
    }

    /// The move this one defeats, if playable.
    pub fn beats(self) -> Option<Move> {
        match self {
            Move::Rock => Some(Move::Scissors),
            Move::Scissors => Some(Move::Paper),
            Move::Paper => Some(Move::Rock),
            Move::Idle => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Move::Idle => "idle",
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized move name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown move: {0}")]
pub struct UnknownMove(pub String);

impl FromStr for Move {
    type Err = UnknownMove;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Move::Idle),
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            other => Err(UnknownMove(other.to_owned())),
        }
    }
}

/// Outcome of one round from the local ("main") player's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundResult {
    /// Equal moves; a new round starts.
    Draw,
    /// Local player wins; terminal.
    MainWins,
    /// Opponent wins; terminal.
    OpponentWins,
}

impl RoundResult {
    /// True for a decisive (session-ending) result.
    #[inline]
    pub fn is_decisive(self) -> bool {
        !matches!(self, RoundResult::Draw)
    }

    /// The same result seen from the other side.
    pub fn flipped(self) -> RoundResult {
        match self {
            RoundResult::Draw => RoundResult::Draw,
            RoundResult::MainWins => RoundResult::OpponentWins,
            RoundResult::OpponentWins => RoundResult::MainWins,
        }
    }
}

/// Resolve a round. Both moves should be playable; callers check that first.
pub fn resolve_round(main_move: Move, opponent_move: Move) -> RoundResult {
    if main_move == opponent_move {
        RoundResult::Draw
    } else if main_move.beats() == Some(opponent_move) {
        RoundResult::MainWins
    } else {
        RoundResult::OpponentWins
    }
}
