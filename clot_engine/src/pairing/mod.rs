//! Pairing strategies, one per tournament format.
//!
//! A strategy reads a [`PairingContext`] snapshot of the tournament and
//! returns a [`Proposal`]: rounds to open or finish, matches to create, byes,
//! child tournaments, and whether the tournament is complete. Strategies never
//! write anything themselves. A proposal that cannot be made legal this cycle
//! is simply smaller (often empty); the orchestrator calls again next cycle.
//!
//! [`Format`] carries each tournament's options and dispatches to its
//! strategy through `enum_dispatch`.

pub mod group_stage;
pub mod ladder;
pub mod monthly;
pub mod round_robin;
pub mod seeded;
pub mod swiss;

use chrono::{DateTime, Utc};
use enum_dispatch::enum_dispatch;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::matches::{BracketSlot, LifecyclePolicy, Match, MatchHistory, Pairing};
use crate::standings;
use crate::tournament::{
    NewRound, Round, StartOptions, Team, TeamId, TemplateId, Tournament,
};

pub use group_stage::GroupStage;
pub use ladder::ContinuousLadder;
pub use monthly::MonthlyRotation;
pub use round_robin::{ByePolicy, RoundRobin};
pub use seeded::{SeededBracket, seed_list};
pub use swiss::Swiss;

/// Pairing errors
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Insufficient teams: need {needed}, have {current}")]
    InsufficientTeams { needed: usize, current: usize },

    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    #[error("Inconsistent tournament state: {0}")]
    Inconsistent(String),
}

impl PairingError {
    pub fn is_invariant(&self) -> bool {
        matches!(self, PairingError::Inconsistent(_))
    }
}

pub type PairingResult<T> = Result<T, PairingError>;

/// Format tag without options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatKind {
    Swiss,
    SeededBracket,
    RoundRobin,
    GroupStage,
    MonthlyRotation,
    ContinuousLadder,
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormatKind::Swiss => "swiss",
            FormatKind::SeededBracket => "seeded-bracket",
            FormatKind::RoundRobin => "round-robin",
            FormatKind::GroupStage => "group-stage",
            FormatKind::MonthlyRotation => "monthly-rotation",
            FormatKind::ContinuousLadder => "continuous-ladder",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FormatKind {
    type Err = PairingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "swiss" => Ok(FormatKind::Swiss),
            "seeded" | "seeded-bracket" | "bracket" => Ok(FormatKind::SeededBracket),
            "round-robin" | "roundrobin" | "rr" => Ok(FormatKind::RoundRobin),
            "clan-league" => Ok(FormatKind::RoundRobin),
            "group-stage" | "groups" => Ok(FormatKind::GroupStage),
            "monthly" | "monthly-rotation" => Ok(FormatKind::MonthlyRotation),
            "ladder" | "continuous-ladder" => Ok(FormatKind::ContinuousLadder),
            other => Err(PairingError::InvalidSetup(format!("unknown format '{other}'"))),
        }
    }
}

/// A group or knockout child of a group stage, with its teams and matches.
#[derive(Debug, Clone)]
pub struct ChildView {
    pub tournament: Tournament,
    pub teams: Vec<Team>,
    pub matches: Vec<Match>,
}

/// Read-only snapshot a strategy works from.
#[derive(Debug, Clone, Copy)]
pub struct PairingContext<'a> {
    pub tournament: &'a Tournament,
    /// Every team of the tournament, inactive ones included
    pub teams: &'a [Team],
    pub rounds: &'a [Round],
    /// Matches that were not deleted
    pub matches: &'a [Match],
    pub history: &'a MatchHistory,
    pub children: &'a [ChildView],
    /// Whether each team may play the template currently in force
    pub template_access: &'a HashMap<TeamId, bool>,
    pub now: DateTime<Utc>,
}

impl<'a> PairingContext<'a> {
    pub fn team(&self, id: TeamId) -> Option<&'a Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn active_teams(&self) -> impl Iterator<Item = &'a Team> + 'a {
        self.teams.iter().filter(|t| t.active)
    }

    pub fn round(&self, number: u32) -> Option<&'a Round> {
        self.rounds.iter().find(|r| r.round_number == number)
    }

    pub fn matches_in_round(&self, number: u32) -> impl Iterator<Item = &'a Match> + 'a {
        self.matches.iter().filter(move |m| m.round_number == number)
    }

    /// The match of a round between the two teams, in either order.
    pub fn match_for(&self, round_number: u32, pairing: Pairing) -> Option<&'a Match> {
        self.matches
            .iter()
            .find(|m| m.round_number == round_number && m.pairing == pairing)
    }

    pub fn next_round_number(&self) -> u32 {
        self.rounds.iter().map(|r| r.round_number).max().unwrap_or(0) + 1
    }

    pub fn new_round(
        &self,
        round_number: u32,
        pairings: Vec<BracketSlot>,
        expected_match_count: u32,
        title: String,
    ) -> NewRound {
        NewRound {
            tournament_id: self.tournament.id,
            round_number,
            pairings,
            expected_match_count,
            calendar: None,
            template: None,
            title,
        }
    }
}

/// A match the orchestrator should create.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedMatch {
    pub round_number: u32,
    pub pairing: Pairing,
    /// Overrides the tournament template
    pub template: Option<TemplateId>,
    /// Extra host settings
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ProposedMatch {
    pub fn new(round_number: u32, pairing: Pairing) -> Self {
        Self {
            round_number,
            pairing,
            template: None,
            settings: serde_json::Map::new(),
        }
    }
}

/// A change to the round list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundUpdate {
    Open(NewRound),
    SetPairings {
        round_number: u32,
        pairings: Vec<BracketSlot>,
        expected_match_count: u32,
    },
    Finish {
        round_number: u32,
    },
}

/// A change to a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamUpdate {
    UsedBye(TeamId),
    MaxConcurrent { team: TeamId, cap: u32 },
}

/// A child tournament to create and start.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildSpec {
    pub name: String,
    pub format: Format,
    /// Teams to copy into the child, best seed first
    pub teams: Vec<Team>,
}

/// The tournament is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub winner: Option<TeamId>,
    /// Final place of every team, 1 for the best
    pub placements: Vec<(TeamId, u32)>,
    /// Buchholz recomputed from all results, when the format asks for it
    pub buchholz: Option<HashMap<TeamId, i32>>,
}

impl Completion {
    /// Winner is whoever is placed first.
    pub fn from_placements(placements: Vec<(TeamId, u32)>) -> Self {
        let winner = placements
            .iter()
            .find(|(_, place)| *place == 1)
            .map(|(id, _)| *id);
        Self {
            winner,
            placements,
            buchholz: None,
        }
    }

    /// Place teams after recomputing buchholz from every decided match, and
    /// carry the recomputed values so they get stored.
    pub fn with_buchholz(teams: &[Team], matches: &[Match]) -> Self {
        let buchholz = standings::recompute_buchholz(teams, matches);
        let scored: Vec<Team> = teams
            .iter()
            .cloned()
            .map(|mut t| {
                t.buchholz = buchholz.get(&t.id).copied().unwrap_or(0);
                t
            })
            .collect();

        let mut completion =
            Self::from_placements(standings::resolve_placements(&scored, matches));
        completion.buchholz = Some(buchholz);
        completion
    }
}

/// Everything a strategy wants done this cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Proposal {
    pub rounds: Vec<RoundUpdate>,
    pub teams: Vec<TeamUpdate>,
    pub pairings: Vec<ProposedMatch>,
    pub children: Vec<ChildSpec>,
    pub current_round: Option<u32>,
    pub completion: Option<Completion>,
    /// Human-readable notes for the audit trail
    pub notes: Vec<String>,
}

impl Proposal {
    /// Nothing to do this cycle, with the reason.
    pub fn deferred(reason: impl Into<String>) -> Self {
        Self {
            notes: vec![reason.into()],
            ..Self::default()
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Whether the proposal changes anything.
    pub fn is_noop(&self) -> bool {
        self.rounds.is_empty()
            && self.teams.is_empty()
            && self.pairings.is_empty()
            && self.children.is_empty()
            && self.current_round.is_none()
            && self.completion.is_none()
    }
}

/// Behaviour every format provides.
#[enum_dispatch]
pub trait PairingStrategy {
    /// Rounds and team settings laid out when the tournament starts. `ctx.teams`
    /// holds the starting teams in seed order.
    fn plan_start(
        &self,
        ctx: &PairingContext,
        start: &StartOptions,
        rng: &mut dyn RngCore,
    ) -> PairingResult<Proposal>;

    /// The next batch of work.
    fn propose_next_pairings(&self, ctx: &PairingContext, rng: &mut dyn RngCore) -> Proposal;

    /// Forced-loss rules for this format's matches.
    fn lifecycle_policy(&self, config: &EngineConfig) -> LifecyclePolicy {
        LifecyclePolicy {
            default_boot_threshold: chrono::Duration::minutes(config.default_boot_minutes),
            ..LifecyclePolicy::default()
        }
    }

    /// Template whose eligibility must be looked up before pairing.
    fn template_gate(&self, _rounds: &[Round], _now: DateTime<Utc>) -> Option<TemplateId> {
        None
    }

    /// Deactivate teams that did not show up to a resolved match.
    fn deactivates_no_shows(&self) -> bool {
        false
    }
}

/// A tournament format and its options.
#[enum_dispatch(PairingStrategy)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Format {
    Swiss(Swiss),
    SeededBracket(SeededBracket),
    RoundRobin(RoundRobin),
    GroupStage(GroupStage),
    MonthlyRotation(MonthlyRotation),
    ContinuousLadder(ContinuousLadder),
}

impl Format {
    pub fn kind(&self) -> FormatKind {
        match self {
            Format::Swiss(_) => FormatKind::Swiss,
            Format::SeededBracket(_) => FormatKind::SeededBracket,
            Format::RoundRobin(_) => FormatKind::RoundRobin,
            Format::GroupStage(_) => FormatKind::GroupStage,
            Format::MonthlyRotation(_) => FormatKind::MonthlyRotation,
            Format::ContinuousLadder(_) => FormatKind::ContinuousLadder,
        }
    }

    /// A format with options taken from the engine defaults.
    pub fn with_defaults(kind: FormatKind, config: &EngineConfig) -> Self {
        match kind {
            FormatKind::Swiss => Swiss::from_config(config).into(),
            FormatKind::SeededBracket => SeededBracket::default().into(),
            FormatKind::RoundRobin => RoundRobin::from_config(config).into(),
            FormatKind::GroupStage => GroupStage::from_config(config).into(),
            FormatKind::MonthlyRotation => MonthlyRotation::from_config(config).into(),
            FormatKind::ContinuousLadder => ContinuousLadder::from_config(config).into(),
        }
    }
}

/// Fewest teams a format can start with.
pub(crate) fn require_teams(current: usize, needed: usize) -> PairingResult<()> {
    if current < needed {
        return Err(PairingError::InsufficientTeams { needed, current });
    }
    Ok(())
}

/// Set every starting team's concurrency cap.
pub(crate) fn concurrency_updates(teams: &[Team], cap: u32) -> Vec<TeamUpdate> {
    teams
        .iter()
        .filter(|t| t.max_concurrent_matches != cap)
        .map(|t| TeamUpdate::MaxConcurrent { team: t.id, cap })
        .collect()
}
