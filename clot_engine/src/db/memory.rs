//! In-memory repository.
//!
//! Keeps every entity in ordered maps behind one `RwLock`. Round pairings are
//! stored in their persisted string form and decoded on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::audit::AuditRecord;
use crate::matches::{Match, MatchEntry, MatchId, MatchState, NewMatch, pairing_list};
use crate::tournament::{
    CalendarMonth, NewRound, NewTeam, Round, RoundId, Team, TeamId, TemplateId, Tournament,
    TournamentConfig, TournamentId,
};

use super::errors::{RepositoryError, RepositoryResult};
use super::repository::{
    AuditRepository, MatchRepository, RoundRepository, TeamRepository, TournamentRepository,
};

/// Round as stored
#[derive(Debug, Clone)]
struct RoundRow {
    id: RoundId,
    tournament_id: TournamentId,
    round_number: u32,
    is_finished: bool,
    games: String,
    expected_match_count: u32,
    calendar: Option<CalendarMonth>,
    template: Option<TemplateId>,
    title: String,
}

impl RoundRow {
    fn decode(&self) -> RepositoryResult<Round> {
        Ok(Round {
            id: self.id,
            tournament_id: self.tournament_id,
            round_number: self.round_number,
            is_finished: self.is_finished,
            pairings: pairing_list::decode(&self.games)?,
            expected_match_count: self.expected_match_count,
            calendar: self.calendar,
            template: self.template,
            title: self.title.clone(),
        })
    }

    fn encode(id: RoundId, round: &Round) -> Self {
        Self {
            id,
            tournament_id: round.tournament_id,
            round_number: round.round_number,
            is_finished: round.is_finished,
            games: pairing_list::encode(&round.pairings),
            expected_match_count: round.expected_match_count,
            calendar: round.calendar,
            template: round.template,
            title: round.title.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    next_id: i64,
    tournaments: BTreeMap<TournamentId, Tournament>,
    teams: BTreeMap<TeamId, Team>,
    rounds: BTreeMap<RoundId, RoundRow>,
    matches: BTreeMap<MatchId, Match>,
    entries: Vec<MatchEntry>,
    audit: Vec<AuditRecord>,
    failing_match_inserts: u32,
}

impl Store {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Repository backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` match inserts fail with a backend error.
    pub async fn fail_next_match_inserts(&self, count: u32) {
        self.store.write().await.failing_match_inserts = count;
    }
}

#[async_trait]
impl TournamentRepository for InMemoryRepository {
    async fn create_tournament(
        &self,
        config: &TournamentConfig,
        created_at: DateTime<Utc>,
    ) -> RepositoryResult<Tournament> {
        let mut store = self.store.write().await;
        let id = store.allocate();

        let tournament = Tournament {
            id,
            name: config.name.clone(),
            format: config.format.clone(),
            players_per_team: config.players_per_team,
            max_teams: config.max_teams,
            current_round: 0,
            is_finished: false,
            has_started: false,
            carry_rating: config.carry_rating,
            game_creation_allowed: true,
            template: config.template,
            parent: config.parent,
            winning_team: None,
            created_at,
            started_at: None,
            finished_at: None,
        };

        store.tournaments.insert(id, tournament.clone());
        Ok(tournament)
    }

    async fn find_tournament(&self, id: TournamentId) -> RepositoryResult<Option<Tournament>> {
        Ok(self.store.read().await.tournaments.get(&id).cloned())
    }

    async fn save_tournament(&self, tournament: &Tournament) -> RepositoryResult<()> {
        let mut store = self.store.write().await;
        let slot = store
            .tournaments
            .get_mut(&tournament.id)
            .ok_or_else(|| RepositoryError::not_found("Tournament", tournament.id))?;
        *slot = tournament.clone();
        Ok(())
    }

    async fn child_tournaments(&self, parent: TournamentId) -> RepositoryResult<Vec<Tournament>> {
        Ok(self
            .store
            .read()
            .await
            .tournaments
            .values()
            .filter(|t| t.parent == Some(parent))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TeamRepository for InMemoryRepository {
    async fn create_team(&self, team: &NewTeam, initial_rating: i32) -> RepositoryResult<Team> {
        let mut store = self.store.write().await;
        if !store.tournaments.contains_key(&team.tournament_id) {
            return Err(RepositoryError::not_found("Tournament", team.tournament_id));
        }
        let id = store.allocate();

        let created = Team {
            id,
            tournament_id: team.tournament_id,
            name: team.name.clone(),
            players: team.players.clone(),
            rating: team.rating.unwrap_or(initial_rating),
            wins: 0,
            losses: 0,
            buchholz: 0,
            seed: team.seed,
            placement: None,
            active: true,
            max_concurrent_matches: team.max_concurrent_matches,
            has_used_bye: false,
            joined_at: team.joined_at,
            vetoed_templates: Vec::new(),
            origin: team.origin,
        };

        store.teams.insert(id, created.clone());
        Ok(created)
    }

    async fn find_team(&self, id: TeamId) -> RepositoryResult<Option<Team>> {
        Ok(self.store.read().await.teams.get(&id).cloned())
    }

    async fn teams_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<Team>> {
        Ok(self
            .store
            .read()
            .await
            .teams
            .values()
            .filter(|t| t.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn save_team(&self, team: &Team) -> RepositoryResult<()> {
        let mut store = self.store.write().await;
        let slot = store
            .teams
            .get_mut(&team.id)
            .ok_or_else(|| RepositoryError::not_found("Team", team.id))?;
        *slot = team.clone();
        Ok(())
    }
}

#[async_trait]
impl RoundRepository for InMemoryRepository {
    async fn create_round(&self, round: &NewRound) -> RepositoryResult<Round> {
        let mut store = self.store.write().await;
        let taken = store.rounds.values().any(|r| {
            r.tournament_id == round.tournament_id && r.round_number == round.round_number
        });
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "round {} already exists in tournament {}",
                round.round_number, round.tournament_id
            )));
        }
        let id = store.allocate();

        let created = Round {
            id,
            tournament_id: round.tournament_id,
            round_number: round.round_number,
            is_finished: false,
            pairings: round.pairings.clone(),
            expected_match_count: round.expected_match_count,
            calendar: round.calendar,
            template: round.template,
            title: round.title.clone(),
        };

        store.rounds.insert(id, RoundRow::encode(id, &created));
        Ok(created)
    }

    async fn rounds_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<Round>> {
        let store = self.store.read().await;
        let mut rounds = store
            .rounds
            .values()
            .filter(|r| r.tournament_id == tournament_id)
            .map(RoundRow::decode)
            .collect::<RepositoryResult<Vec<_>>>()?;
        rounds.sort_by_key(|r| r.round_number);
        Ok(rounds)
    }

    async fn save_round(&self, round: &Round) -> RepositoryResult<()> {
        let mut store = self.store.write().await;
        if !store.rounds.contains_key(&round.id) {
            return Err(RepositoryError::not_found("Round", round.id));
        }
        store.rounds.insert(round.id, RoundRow::encode(round.id, round));
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for InMemoryRepository {
    async fn create_match(&self, new_match: &NewMatch) -> RepositoryResult<Match> {
        let mut store = self.store.write().await;
        if store.failing_match_inserts > 0 {
            store.failing_match_inserts -= 1;
            return Err(RepositoryError::Backend("insert rejected".to_string()));
        }
        if !store.rounds.contains_key(&new_match.round_id) {
            return Err(RepositoryError::not_found("Round", new_match.round_id));
        }
        let id = store.allocate();

        let created = Match {
            id,
            tournament_id: new_match.tournament_id,
            round_id: new_match.round_id,
            round_number: new_match.round_number,
            pairing: new_match.pairing,
            state: MatchState::Created,
            winning_team: None,
            outcome: None,
            host_match_id: Some(new_match.host_match_id.clone()),
            template: new_match.template,
            created_at: new_match.created_at,
            last_activity: new_match.created_at,
            boot_deadline: None,
            finished_at: None,
            needs_recreation: false,
        };

        store.entries.extend(MatchEntry::pair_for(&created));
        store.matches.insert(id, created.clone());
        Ok(created)
    }

    async fn find_match(&self, id: MatchId) -> RepositoryResult<Option<Match>> {
        Ok(self.store.read().await.matches.get(&id).cloned())
    }

    async fn matches_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<Match>> {
        Ok(self
            .store
            .read()
            .await
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn save_match(&self, game: &Match) -> RepositoryResult<()> {
        let mut store = self.store.write().await;
        let slot = store
            .matches
            .get_mut(&game.id)
            .ok_or_else(|| RepositoryError::not_found("Match", game.id))?;
        *slot = game.clone();
        Ok(())
    }

    async fn entries_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<MatchEntry>> {
        Ok(self
            .store
            .read()
            .await
            .entries
            .iter()
            .filter(|e| e.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn record_result(&self, game: &Match, teams: &[Team]) -> RepositoryResult<()> {
        let mut store = self.store.write().await;

        if !store.matches.contains_key(&game.id) {
            return Err(RepositoryError::not_found("Match", game.id));
        }
        if let Some(missing) = teams.iter().find(|t| !store.teams.contains_key(&t.id)) {
            return Err(RepositoryError::not_found("Team", missing.id));
        }

        store.matches.insert(game.id, game.clone());
        for team in teams {
            store.teams.insert(team.id, team.clone());
        }
        for entry in store.entries.iter_mut().filter(|e| e.match_id == game.id) {
            entry.is_finished = true;
        }
        Ok(())
    }

    async fn delete_match_entries(&self, match_id: MatchId) -> RepositoryResult<()> {
        self.store
            .write()
            .await
            .entries
            .retain(|e| e.match_id != match_id);
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for InMemoryRepository {
    async fn append_audit(&self, record: &AuditRecord) -> RepositoryResult<()> {
        self.store.write().await.audit.push(record.clone());
        Ok(())
    }

    async fn audit_for(&self, tournament_id: TournamentId) -> RepositoryResult<Vec<AuditRecord>> {
        Ok(self
            .store
            .read()
            .await
            .audit
            .iter()
            .filter(|r| r.tournament_id == tournament_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::{BracketSlot, Pairing};
    use crate::pairing::{Format, Swiss};

    async fn seeded_repo() -> (InMemoryRepository, Tournament) {
        let repo = InMemoryRepository::new();
        let config = TournamentConfig::new("Cup", Format::Swiss(Swiss::default()));
        let tournament = repo.create_tournament(&config, Utc::now()).await.unwrap();
        (repo, tournament)
    }

    fn new_team(tournament_id: TournamentId, player: &str) -> NewTeam {
        NewTeam {
            tournament_id,
            name: player.to_string(),
            players: vec![player.to_string()],
            rating: None,
            max_concurrent_matches: 2,
            joined_at: Utc::now(),
            seed: None,
            origin: None,
        }
    }

    fn new_round(tournament_id: TournamentId, number: u32) -> NewRound {
        NewRound {
            tournament_id,
            round_number: number,
            pairings: vec![BracketSlot::new(Some(3), None)],
            expected_match_count: 1,
            calendar: None,
            template: None,
            title: format!("Round {number}"),
        }
    }

    #[tokio::test]
    async fn test_team_gets_initial_rating() {
        let (repo, t) = seeded_repo().await;
        let team = repo.create_team(&new_team(t.id, "alice"), 1200).await.unwrap();
        assert_eq!(team.rating, 1200);
        assert_eq!(repo.teams_for(t.id).await.unwrap(), vec![team]);
    }

    #[tokio::test]
    async fn test_round_pairings_survive_storage() {
        let (repo, t) = seeded_repo().await;
        let round = repo.create_round(&new_round(t.id, 1)).await.unwrap();
        let loaded = repo.rounds_for(t.id).await.unwrap();
        assert_eq!(loaded, vec![round]);
    }

    #[tokio::test]
    async fn test_duplicate_round_number_conflicts() {
        let (repo, t) = seeded_repo().await;
        repo.create_round(&new_round(t.id, 1)).await.unwrap();
        let err = repo.create_round(&new_round(t.id, 1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_match_creates_two_entries_and_result_finishes_them() {
        let (repo, t) = seeded_repo().await;
        let a = repo.create_team(&new_team(t.id, "alice"), 1000).await.unwrap();
        let b = repo.create_team(&new_team(t.id, "bob"), 1000).await.unwrap();
        let round = repo.create_round(&new_round(t.id, 1)).await.unwrap();

        let mut game = repo
            .create_match(&NewMatch {
                tournament_id: t.id,
                round_id: round.id,
                round_number: 1,
                pairing: Pairing::new(a.id, b.id),
                host_match_id: "g-1".to_string(),
                template: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(repo.entries_for(t.id).await.unwrap().len(), 2);

        game.state = MatchState::Finished;
        repo.record_result(&game, &[a, b]).await.unwrap();
        assert!(repo
            .entries_for(t.id)
            .await
            .unwrap()
            .iter()
            .all(|e| e.is_finished));

        repo.delete_match_entries(game.id).await.unwrap();
        assert!(repo.entries_for(t.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_unknown_team_fails() {
        let (repo, t) = seeded_repo().await;
        let mut team = repo.create_team(&new_team(t.id, "alice"), 1000).await.unwrap();
        team.id = 999;
        assert!(matches!(
            repo.save_team(&team).await,
            Err(RepositoryError::NotFound { entity: "Team", id: 999 })
        ));
    }
}
