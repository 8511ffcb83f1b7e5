//! Monthly rotation: one round per calendar month, each with its own template.

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::matches::Pairing;
use crate::tournament::{CalendarMonth, NewRound, Round, StartOptions, Team, TeamId, TemplateId};

use super::{
    PairingContext, PairingResult, PairingStrategy, Proposal, ProposedMatch, RoundUpdate,
    concurrency_updates,
};

/// Monthly rotation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRotation {
    /// Months kept scheduled after the current one
    pub rolling_months: u32,
    /// Unfinished games a team may have at once
    pub max_concurrent: u32,
}

impl Default for MonthlyRotation {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl MonthlyRotation {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            rolling_months: config.rolling_months,
            max_concurrent: config.default_max_concurrent,
        }
    }

    /// Months from the one containing `now` through the rolling horizon.
    pub fn horizon(&self, now: DateTime<Utc>) -> Vec<CalendarMonth> {
        std::iter::successors(Some(CalendarMonth::of(now)), |m| Some(m.next()))
            .take(self.rolling_months as usize + 1)
            .collect()
    }

    /// Rounds to open so the schedule covers the horizon.
    fn missing_months(&self, ctx: &PairingContext) -> Vec<NewRound> {
        let mut next = ctx.next_round_number();
        self.horizon(ctx.now)
            .into_iter()
            .filter(|month| !ctx.rounds.iter().any(|r| r.calendar == Some(*month)))
            .map(|month| {
                let mut round = ctx.new_round(next, Vec::new(), 0, month.to_string());
                round.calendar = Some(month);
                next += 1;
                round
            })
            .collect()
    }
}

fn current_round(rounds: &[Round], now: DateTime<Utc>) -> Option<&Round> {
    let month = CalendarMonth::of(now);
    rounds.iter().find(|r| r.calendar == Some(month))
}

impl PairingStrategy for MonthlyRotation {
    fn plan_start(
        &self,
        ctx: &PairingContext,
        _start: &StartOptions,
        _rng: &mut dyn RngCore,
    ) -> PairingResult<Proposal> {
        let mut proposal = Proposal::default();
        proposal.rounds = self
            .missing_months(ctx)
            .into_iter()
            .map(RoundUpdate::Open)
            .collect();
        proposal.teams = concurrency_updates(ctx.teams, self.max_concurrent);
        proposal.current_round = Some(1);
        Ok(proposal)
    }

    fn propose_next_pairings(&self, ctx: &PairingContext, rng: &mut dyn RngCore) -> Proposal {
        let mut proposal = Proposal::default();
        if ctx.tournament.is_finished {
            return proposal;
        }

        proposal.rounds = self
            .missing_months(ctx)
            .into_iter()
            .map(RoundUpdate::Open)
            .collect();

        let this_month = CalendarMonth::of(ctx.now);
        for round in ctx.rounds.iter().filter(|r| !r.is_finished) {
            let past = round.calendar.is_some_and(|m| m < this_month);
            if past && ctx.matches_in_round(round.round_number).all(|m| m.is_finished()) {
                proposal.rounds.push(RoundUpdate::Finish {
                    round_number: round.round_number,
                });
            }
        }

        let Some(round) = current_round(ctx.rounds, ctx.now) else {
            proposal.note(format!("{this_month} is not scheduled yet"));
            return proposal;
        };
        let Some(template) = round.template else {
            proposal.note(format!("no template validated for {this_month}"));
            return proposal;
        };

        let mut eligible: Vec<&Team> = ctx
            .active_teams()
            .filter(|t| ctx.template_access.get(&t.id).copied().unwrap_or(false))
            .collect();
        eligible.sort_by_key(|t| (std::cmp::Reverse(t.rating), t.id));

        let mut history = ctx.history.clone();
        let mut created = Vec::new();

        for team in &eligible {
            while history.unfinished_count(team.id) < team.max_concurrent_matches {
                let mut opponents: Vec<TeamId> = eligible
                    .iter()
                    .filter(|o| o.id != team.id)
                    .filter(|o| history.unfinished_count(o.id) < o.max_concurrent_matches)
                    .filter(|o| !history.met_in_round(team.id, o.id, round.round_number))
                    .map(|o| o.id)
                    .collect();
                opponents.shuffle(rng);
                let Some(opponent) = opponents.first().copied() else {
                    break;
                };

                let pairing = Pairing::new(team.id, opponent);
                history.record_pending(pairing, round.round_number, ctx.now);
                created.push(pairing);
            }
        }

        if !created.is_empty() {
            proposal.note(format!("{} games for {this_month}", created.len()));
        }
        proposal.pairings = created
            .into_iter()
            .map(|pairing| ProposedMatch {
                template: Some(template),
                ..ProposedMatch::new(round.round_number, pairing)
            })
            .collect();
        if ctx.tournament.current_round != round.round_number {
            proposal.current_round = Some(round.round_number);
        }
        proposal
    }

    fn template_gate(&self, rounds: &[Round], now: DateTime<Utc>) -> Option<TemplateId> {
        current_round(rounds, now).and_then(|r| r.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::Format;
    use crate::pairing::test_support::{Fixture, teams};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn started(n: i64) -> (Fixture, MonthlyRotation, StdRng) {
        let monthly = MonthlyRotation::default();
        let mut fixture = Fixture::new(Format::MonthlyRotation(monthly.clone()), teams(n));
        let mut rng = StdRng::seed_from_u64(21);
        let proposal = monthly
            .plan_start(&fixture.ctx(), &StartOptions::Registration, &mut rng)
            .unwrap();
        fixture.apply(&proposal);
        (fixture, monthly, rng)
    }

    #[test]
    fn test_start_schedules_rolling_months() {
        let (fixture, _, _) = started(4);
        assert_eq!(fixture.rounds.len(), 7);
        assert_eq!(fixture.rounds[0].title, "2024-06");
        assert_eq!(fixture.rounds[6].calendar, Some(CalendarMonth::new(2024, 12)));
    }

    #[test]
    fn test_defers_without_template() {
        let (fixture, monthly, mut rng) = started(4);
        let proposal = monthly.propose_next_pairings(&fixture.ctx(), &mut rng);
        assert!(proposal.pairings.is_empty());
        assert!(proposal.notes[0].contains("no template"));
    }

    #[test]
    fn test_pairs_eligible_teams_up_to_cap() {
        let (mut fixture, monthly, mut rng) = started(5);
        fixture.rounds[0].template = Some(99);
        for team in &fixture.teams {
            fixture.access.insert(team.id, team.id != 5);
        }

        let proposal = monthly.propose_next_pairings(&fixture.ctx(), &mut rng);
        assert!(proposal.pairings.iter().all(|p| p.template == Some(99)));
        assert!(proposal.pairings.iter().all(|p| !p.pairing.contains(5)));

        let unique: HashSet<_> = proposal.pairings.iter().map(|p| p.pairing).collect();
        assert_eq!(unique.len(), proposal.pairings.len());

        fixture.apply(&proposal);
        for id in 1..=4 {
            assert!(fixture.history.unfinished_count(id) <= 2);
        }
        assert!(fixture.matches.len() >= 2);
    }

    #[test]
    fn test_new_month_extends_schedule_and_closes_old_one() {
        let (mut fixture, monthly, mut rng) = started(2);
        fixture.now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 7, 2, 0, 0, 0).unwrap();
        let proposal = monthly.propose_next_pairings(&fixture.ctx(), &mut rng);
        assert!(proposal.rounds.contains(&RoundUpdate::Finish { round_number: 1 }));
        assert!(proposal.rounds.iter().any(|u| matches!(
            u,
            RoundUpdate::Open(r) if r.calendar == Some(CalendarMonth::new(2025, 1))
        )));
    }

    #[test]
    fn test_template_gate_follows_calendar() {
        let (mut fixture, monthly, _) = started(2);
        fixture.rounds[0].template = Some(5);
        assert_eq!(monthly.template_gate(&fixture.rounds, fixture.now), Some(5));
    }
}
