//! Round-robin and clan-league pairing.
//!
//! Every pairing of the league is stored in round 1 when the tournament
//! starts. Each cycle creates as many of the remaining pairings as the teams'
//! caps allow. When byes are enabled and the active team count is odd, a team
//! that has not sat out yet gets a bye, but only if every other team can be
//! given a game in the same cycle.

use chrono::{Duration, NaiveDate};
use rand::RngCore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::matches::{BracketSlot, LifecyclePolicy, Pairing};
use crate::tournament::{StartOptions, Team, TeamId};

use super::{
    Completion, PairingContext, PairingResult, PairingStrategy, Proposal, ProposedMatch,
    RoundUpdate, TeamUpdate, concurrency_updates, require_teams,
};

/// When a team sits out a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByePolicy {
    #[default]
    Never,
    /// One team per cycle while the active team count is odd
    WhenOdd,
}

/// Round-robin options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRobin {
    /// Cap on unfinished matches set on every team at start
    pub max_concurrent: Option<u32>,
    /// New matches a team may receive per cycle
    pub created_per_cycle: u32,
    pub bye_policy: ByePolicy,
    /// Dates on which a new wave of matches may be created
    pub schedule: Vec<NaiveDate>,
    pub supports_vacations: bool,
    pub vacation_ceiling_days: Option<i64>,
    /// Reshuffles per bye candidate
    pub pairing_attempts: u32,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RoundRobin {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_concurrent: Some(config.default_max_concurrent),
            created_per_cycle: 2,
            bye_policy: ByePolicy::Never,
            schedule: Vec::new(),
            supports_vacations: false,
            vacation_ceiling_days: Some(config.vacation_ceiling_days),
            pairing_attempts: config.round_robin_pairing_attempts,
        }
    }

    /// Clan league: one new match per team per cycle, rotating byes and
    /// vacation support.
    pub fn clan_league(config: &EngineConfig) -> Self {
        Self {
            created_per_cycle: 1,
            bye_policy: ByePolicy::WhenOdd,
            supports_vacations: true,
            ..Self::from_config(config)
        }
    }

    pub fn with_schedule(mut self, schedule: Vec<NaiveDate>) -> Self {
        self.schedule = schedule;
        self.schedule.sort();
        self
    }

    /// Every pairing of the league, in team order.
    pub fn all_pairings(teams: &[TeamId]) -> Vec<Pairing> {
        teams
            .iter()
            .enumerate()
            .flat_map(|(i, &a)| teams[i + 1..].iter().map(move |&b| Pairing::new(a, b)))
            .collect()
    }

    /// Greedily take pairings in order while both teams have room.
    fn build_batch(
        &self,
        order: &[Pairing],
        capacity: &HashMap<TeamId, u32>,
        bye: Option<TeamId>,
    ) -> Vec<Pairing> {
        let mut created: HashMap<TeamId, u32> = HashMap::new();
        let mut batch = Vec::new();

        for pairing in order {
            if bye.is_some_and(|b| pairing.contains(b)) {
                continue;
            }
            let has_room = |team: TeamId, created: &HashMap<TeamId, u32>| {
                let used = created.get(&team).copied().unwrap_or(0);
                let room = capacity.get(&team).copied().unwrap_or(0);
                used < room && used < self.created_per_cycle
            };
            if has_room(pairing.first, &created) && has_room(pairing.second, &created) {
                *created.entry(pairing.first).or_default() += 1;
                *created.entry(pairing.second).or_default() += 1;
                batch.push(*pairing);
            }
        }

        batch
    }

    /// A batch that gives `bye` the cycle off and everyone else a game.
    fn full_batch_around(
        &self,
        bye: TeamId,
        remaining: &[Pairing],
        capacity: &HashMap<TeamId, u32>,
        rng: &mut dyn RngCore,
    ) -> Option<Vec<Pairing>> {
        let needed: HashSet<TeamId> = remaining
            .iter()
            .filter(|p| !p.contains(bye))
            .flat_map(|p| [p.first, p.second])
            .filter(|t| capacity.get(t).copied().unwrap_or(0) > 0)
            .collect();
        if needed.is_empty() {
            return None;
        }

        let mut order = remaining.to_vec();
        for _ in 0..self.pairing_attempts.max(1) {
            order.shuffle(rng);
            let batch = self.build_batch(&order, capacity, Some(bye));
            let covered: HashSet<TeamId> = batch.iter().flat_map(|p| [p.first, p.second]).collect();
            if needed.is_subset(&covered) {
                return Some(batch);
            }
        }
        None
    }
}

impl PairingStrategy for RoundRobin {
    fn plan_start(
        &self,
        ctx: &PairingContext,
        _start: &StartOptions,
        _rng: &mut dyn RngCore,
    ) -> PairingResult<Proposal> {
        require_teams(ctx.teams.len(), 2)?;

        let ids: Vec<TeamId> = ctx.teams.iter().map(|t| t.id).collect();
        let pairings = RoundRobin::all_pairings(&ids);
        let mut proposal = Proposal::default();
        proposal.note(format!(
            "round robin of {} teams, {} matches",
            ids.len(),
            pairings.len()
        ));
        proposal.rounds.push(RoundUpdate::Open(ctx.new_round(
            1,
            pairings.iter().copied().map(BracketSlot::from).collect(),
            pairings.len() as u32,
            "League".to_string(),
        )));
        if let Some(cap) = self.max_concurrent {
            proposal.teams = concurrency_updates(ctx.teams, cap);
        }
        Ok(proposal)
    }

    fn propose_next_pairings(&self, ctx: &PairingContext, rng: &mut dyn RngCore) -> Proposal {
        if ctx.tournament.is_finished {
            return Proposal::default();
        }
        let Some(league) = ctx.round(1) else {
            return Proposal::deferred("round robin has no pairing list");
        };

        let all: Vec<Pairing> = league.pairings.iter().filter_map(BracketSlot::as_pairing).collect();
        let active: HashSet<TeamId> = ctx.active_teams().map(|t| t.id).collect();
        let both_active = |p: &Pairing| active.contains(&p.first) && active.contains(&p.second);

        // Pairings with a withdrawn team that were never created drop out.
        let playable = all
            .iter()
            .filter(|p| both_active(p) || ctx.match_for(league.round_number, **p).is_some())
            .count();
        let finished = ctx.matches.iter().filter(|m| m.is_finished()).count();
        if finished >= playable {
            return complete(ctx, playable);
        }

        if !self.schedule.is_empty() {
            let today = ctx.now.date_naive();
            let due = self.schedule.iter().filter(|d| **d <= today).count() as u32;
            if ctx.tournament.current_round >= due {
                return Proposal::default();
            }
        }

        let remaining: Vec<Pairing> = all
            .iter()
            .copied()
            .filter(|p| both_active(p))
            .filter(|p| ctx.match_for(league.round_number, *p).is_none())
            .collect();
        if remaining.is_empty() {
            return Proposal::default();
        }

        let capacity: HashMap<TeamId, u32> = ctx
            .active_teams()
            .map(|t| {
                let open = ctx.history.unfinished_count(t.id);
                (t.id, t.max_concurrent_matches.saturating_sub(open))
            })
            .collect();

        let mut proposal = Proposal::default();
        let mut batch = None;

        if self.bye_policy == ByePolicy::WhenOdd && active.len() % 2 == 1 {
            let mut candidates: Vec<&Team> = ctx
                .active_teams()
                .filter(|t| !t.has_used_bye)
                .collect();
            candidates.shuffle(rng);

            for candidate in candidates {
                if let Some(full) = self.full_batch_around(candidate.id, &remaining, &capacity, rng) {
                    proposal.teams.push(TeamUpdate::UsedBye(candidate.id));
                    proposal.note(format!("team {} has a bye this cycle", candidate.id));
                    batch = Some(full);
                    break;
                }
            }
        }

        let batch = batch.unwrap_or_else(|| {
            let mut order = remaining.clone();
            order.shuffle(rng);
            self.build_batch(&order, &capacity, None)
        });
        if batch.is_empty() {
            return proposal;
        }

        proposal.note(format!("{} round robin matches this cycle", batch.len()));
        proposal.pairings = batch
            .into_iter()
            .map(|p| ProposedMatch::new(league.round_number, p))
            .collect();
        if !self.schedule.is_empty() || ctx.tournament.current_round == 0 {
            proposal.current_round = Some(ctx.tournament.current_round + 1);
        }
        proposal
    }

    fn lifecycle_policy(&self, config: &EngineConfig) -> LifecyclePolicy {
        LifecyclePolicy {
            vacations_supported: self.supports_vacations,
            vacation_ceiling: self.vacation_ceiling_days.map(Duration::days),
            default_boot_threshold: Duration::minutes(config.default_boot_minutes),
        }
    }
}

fn complete(ctx: &PairingContext, total: usize) -> Proposal {
    let completion = Completion::with_buchholz(ctx.teams, ctx.matches);

    let mut proposal = Proposal::default();
    proposal.rounds.push(RoundUpdate::Finish { round_number: 1 });
    proposal.note(format!("all {total} round robin matches finished"));
    proposal.completion = Some(completion);
    proposal
}
