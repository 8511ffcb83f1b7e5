//! In-memory match host.
//!
//! Games live in a map and only change when a test (or the runner) scripts
//! them: players join, decline, win or vanish on command. Failures can be
//! injected per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::clock::Clock;
use crate::tournament::{PlayerToken, TemplateId};

use super::errors::{HostError, HostResult};
use super::models::{
    CreateMatchRequest, HostMatchId, HostMatchState, HostSettings, HostSnapshot,
    ParticipantState, ParticipantStatus, RECORD_MISSING,
};
use super::MatchHost;

#[derive(Debug, Clone)]
struct SimulatedGame {
    request: CreateMatchRequest,
    snapshot: HostSnapshot,
}

#[derive(Debug, Default)]
struct HostState {
    games: HashMap<HostMatchId, SimulatedGame>,
    /// Creation order, for stable iteration
    order: Vec<HostMatchId>,
    deleted: Vec<HostMatchId>,
    vacations: HashSet<PlayerToken>,
    denied_templates: HashSet<(PlayerToken, TemplateId)>,
    failing_creates: u32,
    failing_status: HashMap<HostMatchId, HostError>,
    failing_deletes: bool,
    create_calls: u32,
}

/// A scriptable [`MatchHost`].
pub struct SimulatedHost {
    clock: Arc<dyn Clock>,
    settings: HostSettings,
    state: Mutex<HostState>,
}

impl SimulatedHost {
    /// New host whose games report the given settings.
    pub fn new(clock: Arc<dyn Clock>, settings: HostSettings) -> Self {
        Self {
            clock,
            settings,
            state: Mutex::new(HostState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ids of every game ever created, oldest first.
    pub fn game_ids(&self) -> Vec<HostMatchId> {
        self.state().order.clone()
    }

    /// Ids of games still waiting or in progress.
    pub fn open_games(&self) -> Vec<HostMatchId> {
        let state = self.state();
        state
            .order
            .iter()
            .filter(|id| {
                state.games.get(*id).is_some_and(|g| {
                    matches!(
                        g.snapshot.state,
                        HostMatchState::WaitingForPlayers | HostMatchState::InProgress
                    )
                })
            })
            .cloned()
            .collect()
    }

    pub fn request(&self, id: &str) -> Option<CreateMatchRequest> {
        self.state().games.get(id).map(|g| g.request.clone())
    }

    pub fn deleted(&self) -> Vec<HostMatchId> {
        self.state().deleted.clone()
    }

    pub fn create_calls(&self) -> u32 {
        self.state().create_calls
    }

    /// Find the open game two players are both in.
    pub fn game_between(&self, a: &str, b: &str) -> Option<HostMatchId> {
        let state = self.state();
        state
            .order
            .iter()
            .rev()
            .find(|id| {
                state.games.get(*id).is_some_and(|g| {
                    let has = |p: &str| g.request.sides.iter().flatten().any(|x| x == p);
                    has(a) && has(b)
                })
            })
            .cloned()
    }

    pub fn set_participant_state(&self, id: &str, player: &str, to: ParticipantState) {
        let now = self.clock.now();
        if let Some(game) = self.state().games.get_mut(id) {
            for participant in &mut game.snapshot.participants {
                if participant.player == player {
                    participant.state = to;
                }
            }
            if to == ParticipantState::Joined
                && game
                    .snapshot
                    .participants
                    .iter()
                    .all(|p| p.state == ParticipantState::Joined)
            {
                game.snapshot.state = HostMatchState::InProgress;
            }
            game.snapshot.last_turn_time = Some(now);
        }
    }

    /// Finish a game with the side containing `winner` as the winner.
    pub fn finish(&self, id: &str, winner: &str) {
        let now = self.clock.now();
        if let Some(game) = self.state().games.get_mut(id) {
            let winning_side = game
                .request
                .sides
                .iter()
                .find(|side| side.iter().any(|p| p == winner))
                .cloned()
                .unwrap_or_default();
            for participant in &mut game.snapshot.participants {
                participant.state = if winning_side.contains(&participant.player) {
                    ParticipantState::Won
                } else {
                    ParticipantState::Lost
                };
            }
            game.snapshot.state = HostMatchState::Finished;
            game.snapshot.last_turn_time = Some(now);
        }
    }

    /// Make the host forget a game's record.
    pub fn lose_record(&self, id: &str) {
        if let Some(game) = self.state().games.get_mut(id) {
            game.snapshot = HostSnapshot::errored(RECORD_MISSING);
        }
    }

    pub fn set_last_turn_time(&self, id: &str, at: DateTime<Utc>) {
        if let Some(game) = self.state().games.get_mut(id) {
            game.snapshot.last_turn_time = Some(at);
        }
    }

    pub fn set_vacation(&self, player: &str, on_vacation: bool) {
        let mut state = self.state();
        if on_vacation {
            state.vacations.insert(player.to_string());
        } else {
            state.vacations.remove(player);
        }
    }

    pub fn deny_template(&self, player: &str, template: TemplateId) {
        self.state()
            .denied_templates
            .insert((player.to_string(), template));
    }

    /// Make the next `count` create calls fail.
    pub fn fail_next_creates(&self, count: u32) {
        self.state().failing_creates = count;
    }

    /// Make status polls for one game fail until cleared.
    pub fn fail_status(&self, id: &str, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_status.insert(
                id.to_string(),
                HostError::Transport("connection reset".to_string()),
            );
        } else {
            state.failing_status.remove(id);
        }
    }

    /// Answer status polls for one game with a coded rejection.
    pub fn reject_status(&self, id: &str, reason: &str) {
        self.state()
            .failing_status
            .insert(id.to_string(), HostError::rejected(reason));
    }

    pub fn fail_deletes(&self, failing: bool) {
        self.state().failing_deletes = failing;
    }

    /// Report `as_player` in place of `player` in a game's participant list.
    pub fn swap_participant(&self, id: &str, player: &str, as_player: &str) {
        if let Some(game) = self.state().games.get_mut(id) {
            for participant in &mut game.snapshot.participants {
                if participant.player == player {
                    participant.player = as_player.to_string();
                }
            }
        }
    }

    /// Play out every open game: all players join and a random side wins.
    /// Returns how many games were resolved.
    pub fn resolve_open_games<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let open = self.open_games();
        for id in &open {
            let Some(request) = self.request(id) else {
                continue;
            };
            let side = &request.sides[rng.random_range(0..2)];
            if let Some(winner) = side.first() {
                self.finish(id, winner);
            }
        }
        open.len()
    }
}

#[async_trait]
impl MatchHost for SimulatedHost {
    async fn create_match(&self, request: &CreateMatchRequest) -> HostResult<HostMatchId> {
        let now = self.clock.now();
        let mut state = self.state();
        state.create_calls += 1;

        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(HostError::rejected("ServerBusy"));
        }

        let id = Uuid::new_v4().to_string();
        let participants = request
            .sides
            .iter()
            .flatten()
            .map(|player| ParticipantStatus {
                player: player.clone(),
                state: ParticipantState::Invited,
            })
            .collect();

        state.games.insert(
            id.clone(),
            SimulatedGame {
                request: request.clone(),
                snapshot: HostSnapshot {
                    state: HostMatchState::WaitingForPlayers,
                    participants,
                    last_turn_time: Some(now),
                    settings: self.settings.clone(),
                },
            },
        );
        state.order.push(id.clone());
        Ok(id)
    }

    async fn match_status(&self, id: &HostMatchId) -> HostResult<HostSnapshot> {
        let state = self.state();
        if let Some(err) = state.failing_status.get(id) {
            return Err(err.clone());
        }
        Ok(state
            .games
            .get(id)
            .map(|g| g.snapshot.clone())
            .unwrap_or_else(|| HostSnapshot::errored(RECORD_MISSING)))
    }

    async fn delete_match(&self, id: &HostMatchId) -> HostResult<()> {
        let mut state = self.state();
        if state.failing_deletes {
            return Err(HostError::Transport("connection reset".to_string()));
        }
        if state.games.remove(id).is_none() {
            return Err(HostError::rejected(RECORD_MISSING));
        }
        state.deleted.push(id.clone());
        Ok(())
    }

    async fn is_on_vacation(&self, player: &PlayerToken) -> HostResult<bool> {
        Ok(self.state().vacations.contains(player))
    }

    async fn can_use_template(
        &self,
        player: &PlayerToken,
        template: TemplateId,
    ) -> HostResult<bool> {
        Ok(!self
            .state()
            .denied_templates
            .contains(&(player.clone(), template)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn host() -> SimulatedHost {
        SimulatedHost::new(Arc::new(SystemClock), HostSettings::default())
    }

    fn request() -> CreateMatchRequest {
        CreateMatchRequest {
            name: "Game".to_string(),
            template: Some(1),
            sides: [vec!["alice".to_string()], vec!["bob".to_string()]],
            settings: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_created_game_waits_for_players() {
        let host = host();
        let id = host.create_match(&request()).await.unwrap();
        let snapshot = host.match_status(&id).await.unwrap();
        assert_eq!(snapshot.state, HostMatchState::WaitingForPlayers);
        assert!(snapshot
            .participants
            .iter()
            .all(|p| p.state == ParticipantState::Invited));
    }

    #[tokio::test]
    async fn test_finish_marks_sides() {
        let host = host();
        let id = host.create_match(&request()).await.unwrap();
        host.finish(&id, "bob");
        let snapshot = host.match_status(&id).await.unwrap();
        assert_eq!(snapshot.state, HostMatchState::Finished);
        assert_eq!(snapshot.participants[0].state, ParticipantState::Lost);
        assert_eq!(snapshot.participants[1].state, ParticipantState::Won);
        assert!(host.open_games().is_empty());
    }

    #[tokio::test]
    async fn test_injected_create_failure() {
        let host = host();
        host.fail_next_creates(1);
        assert!(host.create_match(&request()).await.is_err());
        assert!(host.create_match(&request()).await.is_ok());
        assert_eq!(host.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_deleted_game_reports_missing_record() {
        let host = host();
        let id = host.create_match(&request()).await.unwrap();
        host.delete_match(&id).await.unwrap();
        assert!(host.match_status(&id).await.unwrap().is_record_missing());
        assert!(host.delete_match(&id).await.unwrap_err().is_record_missing());
    }

    #[tokio::test]
    async fn test_rejected_status_and_swapped_participant() {
        let host = host();
        let id = host.create_match(&request()).await.unwrap();

        host.swap_participant(&id, "alice", "zoe");
        let snapshot = host.match_status(&id).await.unwrap();
        assert!(snapshot.participants.iter().any(|p| p.player == "zoe"));
        assert!(snapshot.participants.iter().all(|p| p.player != "alice"));

        host.reject_status(&id, RECORD_MISSING);
        assert!(host.match_status(&id).await.unwrap_err().is_record_missing());
        host.fail_status(&id, false);
        assert!(host.match_status(&id).await.is_ok());

        host.fail_deletes(true);
        assert!(!host.delete_match(&id).await.unwrap_err().is_record_missing());
    }
}
