//! Match lifecycle reconciliation.
//!
//! [`reconcile`] compares one open match with a fresh host snapshot and
//! decides what should happen to it. It never mutates anything: the
//! orchestrator applies the returned [`Reconciliation`]. When the decision
//! depends on a vacation the engine has not looked up yet, the function asks
//! for it with [`Reconciliation::NeedsVacationStatus`] and is called again
//! once the answer is known.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::host::{HostMatchState, HostSnapshot, ParticipantState};
use crate::tournament::{Team, TeamId};

use super::errors::{MatchError, MatchResult};
use super::models::{Match, MatchOutcome, MatchState};

/// Format-dependent rules for forced losses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// The format honours vacations
    pub vacations_supported: bool,
    /// Longest a vacation may hold a match open; `None` holds it indefinitely
    pub vacation_ceiling: Option<Duration>,
    /// Boot threshold when the host reports none
    pub default_boot_threshold: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            vacations_supported: false,
            vacation_ceiling: None,
            default_boot_threshold: Duration::days(3),
        }
    }
}

/// Everything [`reconcile`] looks at.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub game: &'a Match,
    pub snapshot: &'a HostSnapshot,
    /// All teams of the match's tournament
    pub teams: &'a [Team],
    pub policy: &'a LifecyclePolicy,
    /// Vacation status per team, as far as it has been looked up
    pub vacations: &'a HashMap<TeamId, bool>,
    pub now: DateTime<Utc>,
}

/// A decided match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub winner: TeamId,
    pub loser: TeamId,
    pub outcome: MatchOutcome,
    /// Remove the game from the host
    pub delete_on_host: bool,
    /// Teams with a player who never took part
    pub no_show_teams: Vec<TeamId>,
}

/// Why a match was left alone this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The host reported an error other than a missing record
    HostError(String),
    /// A participant could not be mapped to any team
    UnknownPlayer(String),
}

/// What should happen to a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Still running
    Open {
        state: MatchState,
        boot_deadline: Option<DateTime<Utc>>,
    },
    /// A winner and loser were determined
    Decided(Resolution),
    /// Finish without a winner
    Voided { invalid_link: bool, reason: String },
    /// Look up this team's vacation status and call again
    NeedsVacationStatus(TeamId),
    /// Retry next cycle
    Skipped(SkipReason),
}

/// Decide what a snapshot means for a match.
///
/// # Errors
///
/// Returns a [`MatchError`] when a participant belongs to a tournament team
/// that is not part of this match.
pub fn reconcile(input: &ReconcileInput<'_>) -> MatchResult<Reconciliation> {
    match &input.snapshot.state {
        HostMatchState::Error(reason) => {
            if input.snapshot.is_record_missing() {
                Ok(Reconciliation::Voided {
                    invalid_link: true,
                    reason: reason.clone(),
                })
            } else {
                Ok(Reconciliation::Skipped(SkipReason::HostError(reason.clone())))
            }
        }
        HostMatchState::Finished => reconcile_finished(input),
        HostMatchState::WaitingForPlayers => reconcile_waiting(input),
        HostMatchState::InProgress => Ok(Reconciliation::Open {
            state: MatchState::InProgress,
            boot_deadline: None,
        }),
    }
}

/// Map every participant to its team, in snapshot order.
fn participant_teams(
    input: &ReconcileInput<'_>,
) -> MatchResult<Result<Vec<(TeamId, ParticipantState)>, SkipReason>> {
    let mut out = Vec::with_capacity(input.snapshot.participants.len());

    for participant in &input.snapshot.participants {
        let Some(team) = input
            .teams
            .iter()
            .find(|t| t.has_player(&participant.player))
        else {
            return Ok(Err(SkipReason::UnknownPlayer(participant.player.clone())));
        };

        if !input.game.involves(team.id) {
            return Err(MatchError::UnknownParticipant {
                match_id: input.game.id,
                player: participant.player.clone(),
            });
        }

        out.push((team.id, participant.state));
    }

    Ok(Ok(out))
}

fn no_show_teams(participants: &[(TeamId, ParticipantState)]) -> Vec<TeamId> {
    let mut teams = Vec::new();
    for (team, state) in participants {
        if state.is_no_show() && !teams.contains(team) {
            teams.push(*team);
        }
    }
    teams
}

fn reconcile_finished(input: &ReconcileInput<'_>) -> MatchResult<Reconciliation> {
    let participants = match participant_teams(input)? {
        Ok(p) => p,
        Err(skip) => return Ok(Reconciliation::Skipped(skip)),
    };

    let Some(winner) = participants
        .iter()
        .find(|(_, state)| *state == ParticipantState::Won)
        .map(|(team, _)| *team)
    else {
        return Ok(Reconciliation::Voided {
            invalid_link: false,
            reason: "host finished the game without a winner".to_string(),
        });
    };

    let loser = input
        .game
        .pairing
        .opponent_of(winner)
        .ok_or(MatchError::WinnerNotInMatch {
            match_id: input.game.id,
            team: winner,
        })?;

    Ok(Reconciliation::Decided(Resolution {
        winner,
        loser,
        outcome: MatchOutcome::Played,
        delete_on_host: false,
        no_show_teams: no_show_teams(&participants),
    }))
}

fn reconcile_waiting(input: &ReconcileInput<'_>) -> MatchResult<Reconciliation> {
    let participants = match participant_teams(input)? {
        Ok(p) => p,
        Err(skip) => return Ok(Reconciliation::Skipped(skip)),
    };

    let last_turn = input
        .snapshot
        .last_turn_time
        .unwrap_or(input.game.created_at);
    let threshold = input
        .snapshot
        .settings
        .boot_threshold()
        .unwrap_or(input.policy.default_boot_threshold);
    let boot_deadline = last_turn + threshold;
    let elapsed = input.now - last_turn;
    let vacations_supported =
        input.policy.vacations_supported || input.snapshot.settings.allow_vacations;

    let mut lost: Option<TeamId> = None;

    for (team, state) in &participants {
        if lost == Some(*team) {
            continue;
        }

        match state {
            ParticipantState::Declined => {
                if lost.is_none() {
                    lost = Some(*team);
                }
            }
            ParticipantState::Invited if elapsed > threshold => {
                if vacations_supported {
                    let Some(on_vacation) = input.vacations.get(team) else {
                        return Ok(Reconciliation::NeedsVacationStatus(*team));
                    };
                    if *on_vacation {
                        let held = match input.policy.vacation_ceiling {
                            Some(ceiling) => elapsed < ceiling,
                            None => true,
                        };
                        if held {
                            return Ok(Reconciliation::Open {
                                state: MatchState::WaitingForPlayers,
                                boot_deadline: Some(boot_deadline),
                            });
                        }
                    }
                }
                if lost.is_none() {
                    lost = Some(*team);
                }
            }
            _ => {}
        }
    }

    let Some(loser) = lost else {
        return Ok(Reconciliation::Open {
            state: MatchState::WaitingForPlayers,
            boot_deadline: Some(boot_deadline),
        });
    };

    // Last side standing wins.
    let winner = input
        .game
        .pairing
        .opponent_of(loser)
        .ok_or(MatchError::WinnerNotInMatch {
            match_id: input.game.id,
            team: loser,
        })?;

    Ok(Reconciliation::Decided(Resolution {
        winner,
        loser,
        outcome: MatchOutcome::ForcedLoss,
        delete_on_host: true,
        no_show_teams: no_show_teams(&participants),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostSettings, ParticipantStatus};
    use crate::matches::Pairing;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn team(id: TeamId, player: &str) -> Team {
        Team {
            id,
            tournament_id: 1,
            name: format!("Team {id}"),
            players: vec![player.to_string()],
            rating: 1000,
            wins: 0,
            losses: 0,
            buchholz: 0,
            seed: None,
            placement: None,
            active: true,
            max_concurrent_matches: 2,
            has_used_bye: false,
            joined_at: t0(),
            vetoed_templates: Vec::new(),
            origin: None,
        }
    }

    fn teams() -> Vec<Team> {
        vec![team(1, "alice"), team(2, "bob"), team(3, "carol")]
    }

    fn game() -> Match {
        Match {
            id: 50,
            tournament_id: 1,
            round_id: 1,
            round_number: 1,
            pairing: Pairing::new(1, 2),
            state: MatchState::WaitingForPlayers,
            winning_team: None,
            outcome: None,
            host_match_id: Some("g".to_string()),
            template: None,
            created_at: t0(),
            last_activity: t0(),
            boot_deadline: None,
            finished_at: None,
            needs_recreation: false,
        }
    }

    fn snapshot(state: HostMatchState, a: ParticipantState, b: ParticipantState) -> HostSnapshot {
        HostSnapshot {
            state,
            participants: vec![
                ParticipantStatus {
                    player: "alice".to_string(),
                    state: a,
                },
                ParticipantStatus {
                    player: "bob".to_string(),
                    state: b,
                },
            ],
            last_turn_time: Some(t0()),
            settings: HostSettings {
                auto_boot_minutes: Some(60),
                direct_boot_minutes: None,
                allow_vacations: false,
            },
        }
    }

    fn run(
        snapshot: &HostSnapshot,
        policy: &LifecyclePolicy,
        vacations: &HashMap<TeamId, bool>,
        now: DateTime<Utc>,
    ) -> MatchResult<Reconciliation> {
        let game = game();
        let teams = teams();
        reconcile(&ReconcileInput {
            game: &game,
            snapshot,
            teams: &teams,
            policy,
            vacations,
            now,
        })
    }

    fn decided(result: MatchResult<Reconciliation>) -> Resolution {
        match result.unwrap() {
            Reconciliation::Decided(resolution) => resolution,
            other => panic!("expected a decision, got {other:?}"),
        }
    }

    #[test]
    fn test_finished_game_picks_winner() {
        let snap = snapshot(
            HostMatchState::Finished,
            ParticipantState::Lost,
            ParticipantState::Won,
        );
        let resolution = decided(run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()));
        assert_eq!((resolution.winner, resolution.loser), (2, 1));
        assert_eq!(resolution.outcome, MatchOutcome::Played);
        assert!(!resolution.delete_on_host);
    }

    #[test]
    fn test_finished_without_winner_is_voided() {
        let snap = snapshot(
            HostMatchState::Finished,
            ParticipantState::EndedByVote,
            ParticipantState::EndedByVote,
        );
        let result = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()).unwrap();
        assert!(matches!(result, Reconciliation::Voided { invalid_link: false, .. }));
    }

    #[test]
    fn test_missing_record_voids_with_invalid_link() {
        let snap = HostSnapshot::errored("ServerGameKeyNotFound");
        let result = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()).unwrap();
        assert!(matches!(result, Reconciliation::Voided { invalid_link: true, .. }));
    }

    #[test]
    fn test_other_host_error_is_skipped() {
        let snap = HostSnapshot::errored("ServerBusy");
        let result = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()).unwrap();
        assert_eq!(
            result,
            Reconciliation::Skipped(SkipReason::HostError("ServerBusy".to_string()))
        );
    }

    #[test]
    fn test_decline_is_immediate_forced_loss() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Declined,
        );
        let resolution = decided(run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()));
        assert_eq!((resolution.winner, resolution.loser), (1, 2));
        assert_eq!(resolution.outcome, MatchOutcome::ForcedLoss);
        assert!(resolution.delete_on_host);
        assert_eq!(resolution.no_show_teams, vec![2]);
    }

    #[test]
    fn test_double_decline_first_observed_loses() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Declined,
            ParticipantState::Declined,
        );
        let resolution = decided(run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()));
        assert_eq!((resolution.winner, resolution.loser), (2, 1));
    }

    #[test]
    fn test_invited_within_threshold_stays_open() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Invited,
        );
        let now = t0() + Duration::minutes(30);
        let result = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), now).unwrap();
        assert_eq!(
            result,
            Reconciliation::Open {
                state: MatchState::WaitingForPlayers,
                boot_deadline: Some(t0() + Duration::minutes(60)),
            }
        );
    }

    #[test]
    fn test_invited_past_threshold_is_booted() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Invited,
        );
        let now = t0() + Duration::minutes(61);
        let resolution = decided(run(&snap, &LifecyclePolicy::default(), &HashMap::new(), now));
        assert_eq!((resolution.winner, resolution.loser), (1, 2));
    }

    #[test]
    fn test_vacation_status_requested_when_supported() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Invited,
        );
        let policy = LifecyclePolicy {
            vacations_supported: true,
            vacation_ceiling: Some(Duration::days(20)),
            ..LifecyclePolicy::default()
        };
        let now = t0() + Duration::hours(5);
        let result = run(&snap, &policy, &HashMap::new(), now).unwrap();
        assert_eq!(result, Reconciliation::NeedsVacationStatus(2));
    }

    #[test]
    fn test_vacation_holds_until_ceiling() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Invited,
        );
        let policy = LifecyclePolicy {
            vacations_supported: true,
            vacation_ceiling: Some(Duration::days(20)),
            ..LifecyclePolicy::default()
        };
        let vacations = HashMap::from([(2, true)]);

        let held = run(&snap, &policy, &vacations, t0() + Duration::days(5)).unwrap();
        assert!(matches!(held, Reconciliation::Open { .. }));

        let resolution = decided(run(&snap, &policy, &vacations, t0() + Duration::days(21)));
        assert_eq!(resolution.loser, 2);
    }

    #[test]
    fn test_vacation_without_ceiling_holds_indefinitely() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Invited,
        );
        let policy = LifecyclePolicy {
            vacations_supported: true,
            vacation_ceiling: None,
            ..LifecyclePolicy::default()
        };
        let vacations = HashMap::from([(2, true)]);
        let result = run(&snap, &policy, &vacations, t0() + Duration::days(400)).unwrap();
        assert!(matches!(result, Reconciliation::Open { .. }));
    }

    #[test]
    fn test_vacation_ignored_when_unsupported() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Invited,
        );
        let vacations = HashMap::from([(2, true)]);
        let resolution = decided(run(
            &snap,
            &LifecyclePolicy::default(),
            &vacations,
            t0() + Duration::days(2),
        ));
        assert_eq!(resolution.loser, 2);
    }

    #[test]
    fn test_unknown_player_skips_match() {
        let mut snap = snapshot(
            HostMatchState::Finished,
            ParticipantState::Won,
            ParticipantState::Lost,
        );
        snap.participants[1].player = "mallory".to_string();
        let result = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()).unwrap();
        assert_eq!(
            result,
            Reconciliation::Skipped(SkipReason::UnknownPlayer("mallory".to_string()))
        );
    }

    #[test]
    fn test_participant_from_other_team_is_violation() {
        let mut snap = snapshot(
            HostMatchState::Finished,
            ParticipantState::Won,
            ParticipantState::Lost,
        );
        snap.participants[0].player = "carol".to_string();
        let err = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), t0()).unwrap_err();
        assert!(matches!(err, MatchError::UnknownParticipant { match_id: 50, .. }));
    }

    #[test]
    fn test_reconcile_is_repeatable() {
        let snap = snapshot(
            HostMatchState::WaitingForPlayers,
            ParticipantState::Joined,
            ParticipantState::Invited,
        );
        let now = t0() + Duration::minutes(10);
        let first = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), now).unwrap();
        let second = run(&snap, &LifecyclePolicy::default(), &HashMap::new(), now).unwrap();
        assert_eq!(first, second);
    }
}
