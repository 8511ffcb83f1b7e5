//! Continuous real-time ladder.
//!
//! There are no rounds to speak of: every cycle, teams without an unfinished
//! game queue up in join order and each one is matched against a random
//! waiting opponent it has not played within the cooldown, on a random
//! template neither side has vetoed. Teams that do not show up to a ladder
//! game are taken off the ladder.

use chrono::Duration;
use rand::RngCore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::VecDeque;

use crate::config::EngineConfig;
use crate::matches::Pairing;
use crate::tournament::{StartOptions, Team, TemplateId};

use super::{
    PairingContext, PairingResult, PairingStrategy, Proposal, ProposedMatch, RoundUpdate,
    concurrency_updates,
};

/// Ladder options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousLadder {
    /// Templates games are drawn from
    pub templates: Vec<TemplateId>,
    /// No rematch within this many minutes
    pub cooldown_minutes: i64,
    /// Real-time boot timer
    pub boot_seconds: u32,
    /// Real-time bank
    pub bank_seconds: u32,
}

impl Default for ContinuousLadder {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ContinuousLadder {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            templates: Vec::new(),
            cooldown_minutes: config.ladder_cooldown_minutes,
            boot_seconds: 180,
            bank_seconds: 300,
        }
    }

    pub fn with_templates(mut self, templates: Vec<TemplateId>) -> Self {
        self.templates = templates;
        self
    }

    /// Host settings for a real-time game.
    pub fn realtime_settings(&self) -> Map<String, Value> {
        let boot_minutes = (self.boot_seconds / 60).max(1);
        let settings = json!({
            "Pace": "RealTime",
            "DirectBoot": boot_minutes,
            "AutoBoot": boot_minutes,
            "BankingBootTimes": self.bank_seconds / 60,
        });
        match settings {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn pick_template(
        &self,
        team: &Team,
        opponent: &Team,
        rng: &mut dyn RngCore,
    ) -> Option<TemplateId> {
        let mut templates = self.templates.clone();
        templates.shuffle(rng);
        templates
            .into_iter()
            .find(|t| !team.has_vetoed(*t) && !opponent.has_vetoed(*t))
    }
}

impl PairingStrategy for ContinuousLadder {
    fn plan_start(
        &self,
        ctx: &PairingContext,
        _start: &StartOptions,
        _rng: &mut dyn RngCore,
    ) -> PairingResult<Proposal> {
        let mut proposal = Proposal::default();
        proposal.rounds.push(RoundUpdate::Open(ctx.new_round(
            1,
            Vec::new(),
            0,
            "Ladder".to_string(),
        )));
        proposal.teams = concurrency_updates(ctx.teams, 1);
        proposal.current_round = Some(1);
        Ok(proposal)
    }

    fn propose_next_pairings(&self, ctx: &PairingContext, rng: &mut dyn RngCore) -> Proposal {
        if self.templates.is_empty() {
            return Proposal::deferred("ladder has no templates");
        }
        let Some(round) = ctx.round(1) else {
            return Proposal::deferred("ladder round is missing");
        };

        let mut queue: Vec<&Team> = ctx
            .active_teams()
            .filter(|t| ctx.history.unfinished_count(t.id) == 0)
            .collect();
        queue.sort_by_key(|t| (t.joined_at, t.id));

        let since = ctx.now - Duration::minutes(self.cooldown_minutes);
        let mut waiting: VecDeque<&Team> = queue.into();
        let mut proposal = Proposal::default();

        while let Some(team) = waiting.pop_front() {
            let mut candidates: Vec<&Team> = waiting
                .iter()
                .copied()
                .filter(|o| !ctx.history.met_since(team.id, o.id, since))
                .collect();
            candidates.shuffle(rng);

            let matched = candidates.into_iter().find_map(|opponent| {
                self.pick_template(team, opponent, rng)
                    .map(|template| (opponent, template))
            });
            let Some((opponent, template)) = matched else {
                continue;
            };

            waiting.retain(|t| t.id != opponent.id);
            proposal.pairings.push(ProposedMatch {
                template: Some(template),
                settings: self.realtime_settings(),
                ..ProposedMatch::new(round.round_number, Pairing::new(team.id, opponent.id))
            });
        }

        if !proposal.pairings.is_empty() {
            proposal.note(format!("{} ladder games", proposal.pairings.len()));
        }
        proposal
    }

    fn deactivates_no_shows(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::Format;
    use crate::pairing::test_support::{Fixture, open_match, teams, won_match};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn started(ladder: &ContinuousLadder, n: i64) -> Fixture {
        let mut fixture = Fixture::new(Format::ContinuousLadder(ladder.clone()), teams(n));
        let mut rng = StdRng::seed_from_u64(31);
        let proposal = ladder
            .plan_start(&fixture.ctx(), &StartOptions::Registration, &mut rng)
            .unwrap();
        fixture.apply(&proposal);
        fixture
    }

    #[test]
    fn test_defers_without_templates() {
        let ladder = ContinuousLadder::default();
        let fixture = started(&ladder, 4);
        let mut rng = StdRng::seed_from_u64(32);
        let proposal = ladder.propose_next_pairings(&fixture.ctx(), &mut rng);
        assert!(proposal.pairings.is_empty());
        assert_eq!(proposal.notes, vec!["ladder has no templates".to_string()]);
    }

    #[test]
    fn test_busy_teams_are_not_queued() {
        let ladder = ContinuousLadder::default().with_templates(vec![1]);
        let mut fixture = started(&ladder, 4);
        fixture.matches.push(open_match(1, 1, 1, 2));
        fixture.refresh();

        let mut rng = StdRng::seed_from_u64(33);
        let proposal = ladder.propose_next_pairings(&fixture.ctx(), &mut rng);
        assert_eq!(proposal.pairings.len(), 1);
        assert_eq!(proposal.pairings[0].pairing, Pairing::new(3, 4));
        assert_eq!(proposal.pairings[0].settings["Pace"], "RealTime");
    }

    #[test]
    fn test_cooldown_blocks_rematch() {
        let ladder = ContinuousLadder::default().with_templates(vec![1]);
        let mut fixture = started(&ladder, 2);
        fixture.matches.push(won_match(1, 1, 1, 2));
        fixture.refresh();

        let mut rng = StdRng::seed_from_u64(34);
        assert!(ladder.propose_next_pairings(&fixture.ctx(), &mut rng).pairings.is_empty());

        fixture.now += Duration::minutes(61);
        assert_eq!(ladder.propose_next_pairings(&fixture.ctx(), &mut rng).pairings.len(), 1);
    }

    #[test]
    fn test_vetoed_template_is_avoided() {
        let ladder = ContinuousLadder::default().with_templates(vec![1, 2]);
        let mut fixture = started(&ladder, 2);
        fixture.teams[0].vetoed_templates = vec![1];

        let mut rng = StdRng::seed_from_u64(35);
        for _ in 0..5 {
            let proposal = ladder.propose_next_pairings(&fixture.ctx(), &mut rng);
            assert_eq!(proposal.pairings[0].template, Some(2));
        }

        fixture.teams[1].vetoed_templates = vec![2];
        assert!(ladder.propose_next_pairings(&fixture.ctx(), &mut rng).pairings.is_empty());
    }

    #[test]
    fn test_queue_follows_join_order() {
        let ladder = ContinuousLadder::default().with_templates(vec![1]);
        let mut fixture = started(&ladder, 3);
        fixture.teams[2].joined_at = fixture.now - Duration::hours(1);

        let mut rng = StdRng::seed_from_u64(36);
        let proposal = ladder.propose_next_pairings(&fixture.ctx(), &mut rng);
        assert_eq!(proposal.pairings.len(), 1);
        assert!(proposal.pairings[0].pairing.contains(3));
    }
}
