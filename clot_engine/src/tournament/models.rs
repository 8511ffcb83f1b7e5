//! Tournament, team and round models.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::matches::BracketSlot;
use crate::pairing::{Format, FormatKind};

use super::errors::{TournamentError, TournamentResult};

/// Tournament ID type
pub type TournamentId = i64;

/// Team ID type
pub type TeamId = i64;

/// Round ID type
pub type RoundId = i64;

/// Host-side game template identifier
pub type TemplateId = i64;

/// Opaque host-side player identifier
pub type PlayerToken = String;

/// A tournament of any format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    /// Format and its per-tournament options
    pub format: Format,
    pub players_per_team: u32,
    pub max_teams: u32,
    /// Highest round with activity. Round-robin schedules use it to count
    /// consumed creation waves.
    pub current_round: u32,
    pub is_finished: bool,
    pub has_started: bool,
    /// Whether results update team ratings
    pub carry_rating: bool,
    /// Pairing is paused while false; reconciliation still runs
    pub game_creation_allowed: bool,
    /// Host template used for created matches
    pub template: Option<TemplateId>,
    /// Owning group stage, for group and knockout children
    pub parent: Option<TournamentId>,
    pub winning_team: Option<TeamId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Tournament {
    pub fn kind(&self) -> FormatKind {
        self.format.kind()
    }

    /// Flip `has_started`. Fails if it already flipped.
    pub fn mark_started(&mut self, now: DateTime<Utc>) -> TournamentResult<()> {
        if self.has_started {
            return Err(TournamentError::AlreadyStarted);
        }
        self.has_started = true;
        self.started_at = Some(now);
        Ok(())
    }

    /// Flip `is_finished`. Returns false if the tournament was already finished,
    /// in which case nothing changes.
    pub fn mark_finished(&mut self, winner: Option<TeamId>, now: DateTime<Utc>) -> bool {
        if self.is_finished {
            return false;
        }
        self.is_finished = true;
        self.winning_team = winner;
        self.finished_at = Some(now);
        true
    }
}

/// Tournament creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub name: String,
    pub format: Format,
    pub players_per_team: u32,
    pub max_teams: u32,
    pub carry_rating: bool,
    pub template: Option<TemplateId>,
    pub parent: Option<TournamentId>,
}

impl TournamentConfig {
    /// One player per team, 64 teams, rated.
    pub fn new(name: impl Into<String>, format: Format) -> Self {
        Self {
            name: name.into(),
            format,
            players_per_team: 1,
            max_teams: 64,
            carry_rating: true,
            template: None,
            parent: None,
        }
    }

    pub fn with_players_per_team(mut self, players: u32) -> Self {
        self.players_per_team = players;
        self
    }

    pub fn with_max_teams(mut self, max_teams: u32) -> Self {
        self.max_teams = max_teams;
        self
    }

    pub fn with_template(mut self, template: TemplateId) -> Self {
        self.template = Some(template);
        self
    }

    pub fn unrated(mut self) -> Self {
        self.carry_rating = false;
        self
    }

    pub fn validate(&self) -> TournamentResult<()> {
        if self.name.trim().is_empty() {
            return Err(TournamentError::InvalidSetup(
                "tournament name must not be empty".to_string(),
            ));
        }
        if self.players_per_team == 0 {
            return Err(TournamentError::InvalidSetup(
                "players per team must be at least 1".to_string(),
            ));
        }
        if self.max_teams < 2 {
            return Err(TournamentError::InvalidSetup(
                "max teams must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// A participant of one tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub tournament_id: TournamentId,
    pub name: String,
    pub players: Vec<PlayerToken>,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    pub buchholz: i32,
    pub seed: Option<u32>,
    pub placement: Option<u32>,
    /// False when withdrawn or paused
    pub active: bool,
    pub max_concurrent_matches: u32,
    pub has_used_bye: bool,
    pub joined_at: DateTime<Utc>,
    /// Ladder templates this team refuses to play
    pub vetoed_templates: Vec<TemplateId>,
    /// Parent-tournament team this stage copy was made from
    pub origin: Option<TeamId>,
}

impl Team {
    pub fn has_player(&self, player: &str) -> bool {
        self.players.iter().any(|p| p == player)
    }

    pub fn is_full(&self, players_per_team: u32) -> bool {
        self.players.len() == players_per_team as usize
    }

    pub fn has_vetoed(&self, template: TemplateId) -> bool {
        self.vetoed_templates.contains(&template)
    }

    /// Win/loss differential used by buchholz.
    pub fn score(&self) -> i32 {
        self.wins as i32 - self.losses as i32
    }

    /// The id results should be reported under in the parent tournament.
    pub fn root_id(&self) -> TeamId {
        self.origin.unwrap_or(self.id)
    }

    /// A fresh registration of this team in a child tournament.
    pub fn stage_copy(&self, tournament_id: TournamentId, carry_rating: bool) -> NewTeam {
        NewTeam {
            tournament_id,
            name: self.name.clone(),
            players: self.players.clone(),
            rating: if carry_rating {
                Some(self.rating)
            } else {
                None
            },
            max_concurrent_matches: self.max_concurrent_matches,
            joined_at: self.joined_at,
            seed: self.seed,
            origin: Some(self.root_id()),
        }
    }
}

/// Team registration parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeam {
    pub tournament_id: TournamentId,
    pub name: String,
    pub players: Vec<PlayerToken>,
    /// Starting rating; the engine default when unset
    pub rating: Option<i32>,
    pub max_concurrent_matches: u32,
    pub joined_at: DateTime<Utc>,
    pub seed: Option<u32>,
    pub origin: Option<TeamId>,
}

/// A calendar month used by monthly rotations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
}

impl CalendarMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month >= 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl std::fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One round of a tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub tournament_id: TournamentId,
    /// 1-based and contiguous within a tournament
    pub round_number: u32,
    pub is_finished: bool,
    /// Intended pairings in bracket order
    pub pairings: Vec<BracketSlot>,
    pub expected_match_count: u32,
    pub calendar: Option<CalendarMonth>,
    pub template: Option<TemplateId>,
    pub title: String,
}

/// Round creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRound {
    pub tournament_id: TournamentId,
    pub round_number: u32,
    pub pairings: Vec<BracketSlot>,
    pub expected_match_count: u32,
    pub calendar: Option<CalendarMonth>,
    pub template: Option<TemplateId>,
    pub title: String,
}

/// Display title for a round given how many rounds the bracket has.
pub fn round_title(round_number: u32, total_rounds: u32) -> String {
    match total_rounds.checked_sub(round_number) {
        Some(0) => "Final".to_string(),
        Some(1) => "Semifinals".to_string(),
        Some(2) => "Quarterfinals".to_string(),
        Some(remaining) if remaining < 8 => format!("Round of {}", 1u32 << (remaining + 1)),
        _ => format!("Round {round_number}"),
    }
}

/// How teams are ordered or grouped when a tournament starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartOptions {
    /// Existing seeds, then registration order
    #[default]
    Registration,
    /// Explicit seed order, best first
    Seeds(Vec<TeamId>),
    /// Explicit group partition for group stages
    Groups(Vec<Vec<TeamId>>),
}

/// One row of a standings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingRow {
    pub team_id: TeamId,
    pub name: String,
    pub wins: u32,
    pub losses: u32,
    pub rating: i32,
    pub buchholz: i32,
    pub placement: Option<u32>,
    pub active: bool,
}

impl From<&Team> for StandingRow {
    fn from(team: &Team) -> Self {
        Self {
            team_id: team.id,
            name: team.name.clone(),
            wins: team.wins,
            losses: team.losses,
            rating: team.rating,
            buchholz: team.buchholz,
            placement: team.placement,
            active: team.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::Swiss;
    use chrono::TimeZone;

    fn tournament() -> Tournament {
        Tournament {
            id: 1,
            name: "Autumn Swiss".to_string(),
            format: Format::Swiss(Swiss::default()),
            players_per_team: 1,
            max_teams: 8,
            current_round: 0,
            is_finished: false,
            has_started: false,
            carry_rating: true,
            game_creation_allowed: true,
            template: None,
            parent: None,
            winning_team: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_started_flips_once() {
        let mut t = tournament();
        let now = Utc::now();
        assert!(t.mark_started(now).is_ok());
        assert!(matches!(
            t.mark_started(now),
            Err(TournamentError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_finished_is_monotonic() {
        let mut t = tournament();
        let now = Utc::now();
        assert!(t.mark_finished(Some(3), now));
        assert!(!t.mark_finished(Some(4), now));
        assert_eq!(t.winning_team, Some(3));
    }

    #[test]
    fn test_round_titles() {
        assert_eq!(round_title(3, 3), "Final");
        assert_eq!(round_title(2, 3), "Semifinals");
        assert_eq!(round_title(1, 3), "Quarterfinals");
        assert_eq!(round_title(1, 4), "Round of 16");
    }

    #[test]
    fn test_calendar_month_rolls_over_year() {
        assert_eq!(CalendarMonth::new(2024, 12).next(), CalendarMonth::new(2025, 1));
        assert_eq!(CalendarMonth::new(2024, 3).to_string(), "2024-03");
    }

    #[test]
    fn test_config_validation() {
        let config = TournamentConfig::new("", Format::Swiss(Swiss::default()));
        assert!(config.validate().is_err());

        let config = TournamentConfig::new("League", Format::Swiss(Swiss::default()))
            .with_max_teams(1);
        assert!(config.validate().is_err());
    }
}
