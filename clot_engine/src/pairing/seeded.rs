//! Seeded single elimination.
//!
//! The whole bracket is laid out when the tournament starts: round 1 from the
//! seed list, later rounds as open slots. Slot `i` of a round is fed by the
//! winners of slots `2i` and `2i + 1` of the round before it. A lone team in a
//! first-round slot has a bye and advances without playing.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::matches::BracketSlot;
use crate::tournament::{Round, StartOptions, TeamId, round_title};

use super::{
    Completion, PairingContext, PairingResult, PairingStrategy, Proposal, ProposedMatch,
    RoundUpdate, require_teams,
};

/// Bracket seed order for `teams` entrants, best seed first.
///
/// Starts from `[1]` and expands every entry `e` into `[e, l - e]` where `l`
/// is one more than twice the current length, until the list covers the next
/// power of two. Seeds beyond `teams` are byes and come back as `None`.
pub fn seed_list(teams: usize) -> Vec<Option<usize>> {
    let mut list = vec![1usize];
    while list.len() < teams {
        let l = 2 * list.len() + 1;
        list = list.iter().flat_map(|&e| [e, l - e]).collect();
    }
    list.into_iter()
        .map(|seed| (seed <= teams).then_some(seed))
        .collect()
}

/// Single-elimination bracket options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededBracket {}

impl SeededBracket {
    /// First-round slots for teams listed best seed first.
    pub fn first_round(teams: &[TeamId]) -> Vec<BracketSlot> {
        let seeded: Vec<Option<TeamId>> = seed_list(teams.len())
            .into_iter()
            .map(|seed| seed.and_then(|s| teams.get(s - 1).copied()))
            .collect();
        seeded
            .chunks(2)
            .map(|pair| BracketSlot::new(pair[0], pair.get(1).copied().flatten()))
            .collect()
    }

    /// Slot lists of every round, with decided occupants filled in.
    fn resolve_slots(ctx: &PairingContext, rounds: &[&Round]) -> Vec<Vec<BracketSlot>> {
        let mut slots: Vec<Vec<BracketSlot>> = rounds.iter().map(|r| r.pairings.clone()).collect();

        for idx in 1..slots.len() {
            let previous = rounds[idx - 1].round_number;
            for i in 0..slots[idx].len() {
                let first = advancer(ctx, previous, &slots[idx - 1], 2 * i);
                let second = advancer(ctx, previous, &slots[idx - 1], 2 * i + 1);
                let slot = &mut slots[idx][i];
                if slot.first.is_none() {
                    slot.first = first;
                }
                if slot.second.is_none() {
                    slot.second = second;
                }
            }
        }

        slots
    }
}

/// The team that leaves slot `index` of a round, once known.
fn advancer(
    ctx: &PairingContext,
    round_number: u32,
    slots: &[BracketSlot],
    index: usize,
) -> Option<TeamId> {
    let slot = slots.get(index)?;
    if round_number == 1 {
        if let Some(bye) = slot.lone_team() {
            return Some(bye);
        }
    }
    let pairing = slot.as_pairing()?;
    let game = ctx
        .match_for(round_number, pairing)
        .filter(|m| m.is_finished())?;
    // A voided match still sends someone through.
    Some(game.winning_team.unwrap_or(pairing.first))
}

fn slot_decided(ctx: &PairingContext, round_number: u32, slot: &BracketSlot) -> bool {
    if round_number == 1 && slot.lone_team().is_some() {
        return true;
    }
    slot.as_pairing()
        .and_then(|p| ctx.match_for(round_number, p))
        .is_some_and(|m| m.is_finished())
}

impl PairingStrategy for SeededBracket {
    fn plan_start(
        &self,
        ctx: &PairingContext,
        _start: &StartOptions,
        _rng: &mut dyn RngCore,
    ) -> PairingResult<Proposal> {
        require_teams(ctx.teams.len(), 2)?;

        let ids: Vec<TeamId> = ctx.teams.iter().map(|t| t.id).collect();
        let first = SeededBracket::first_round(&ids);
        let total = first.len().max(1).trailing_zeros() + 1;

        let mut proposal = Proposal::default();
        let mut width = first.len();
        for round_number in 1..=total {
            let (pairings, expected) = if round_number == 1 {
                let games = first.iter().filter(|s| s.as_pairing().is_some()).count();
                (first.clone(), games as u32)
            } else {
                width /= 2;
                (vec![BracketSlot::open(); width.max(1)], width.max(1) as u32)
            };
            proposal.rounds.push(RoundUpdate::Open(ctx.new_round(
                round_number,
                pairings,
                expected,
                round_title(round_number, total),
            )));
        }
        proposal.note(format!("bracket of {} teams over {total} rounds", ids.len()));

        // Rounds are not stored yet; round 1 is all that can be paired.
        for slot in &first {
            if let Some(pairing) = slot.as_pairing() {
                proposal.pairings.push(ProposedMatch::new(1, pairing));
            }
        }
        proposal.current_round = Some(1);
        Ok(proposal)
    }

    fn propose_next_pairings(&self, ctx: &PairingContext, _rng: &mut dyn RngCore) -> Proposal {
        let mut proposal = Proposal::default();
        if ctx.tournament.is_finished || ctx.rounds.is_empty() {
            return proposal;
        }

        let mut rounds: Vec<&Round> = ctx.rounds.iter().collect();
        rounds.sort_by_key(|r| r.round_number);
        let slots = SeededBracket::resolve_slots(ctx, &rounds);

        let mut current = ctx.tournament.current_round;
        for (round, resolved) in rounds.iter().zip(&slots) {
            if *resolved != round.pairings {
                proposal.rounds.push(RoundUpdate::SetPairings {
                    round_number: round.round_number,
                    pairings: resolved.clone(),
                    expected_match_count: round.expected_match_count,
                });
            }
            if round.is_finished {
                continue;
            }

            for pairing in resolved.iter().filter_map(BracketSlot::as_pairing) {
                if ctx.match_for(round.round_number, pairing).is_none() {
                    proposal
                        .pairings
                        .push(ProposedMatch::new(round.round_number, pairing));
                    current = current.max(round.round_number);
                }
            }

            if resolved
                .iter()
                .all(|slot| slot_decided(ctx, round.round_number, slot))
            {
                proposal.rounds.push(RoundUpdate::Finish {
                    round_number: round.round_number,
                });
            }
        }
        if current != ctx.tournament.current_round {
            proposal.current_round = Some(current);
        }

        let (Some(last), Some(final_slots)) = (rounds.last(), slots.last()) else {
            return proposal;
        };
        let champion = advancer(ctx, last.round_number, final_slots, 0);
        if let Some(winner) = champion {
            let placements = bracket_placements(ctx, winner);
            proposal.completion = Some(Completion {
                winner: Some(winner),
                placements,
                buchholz: None,
            });
            proposal.note(format!("bracket won by team {winner}"));
        }

        proposal
    }
}

/// Champion first, then by the round each team went out in, later rounds
/// ahead, ties by seed.
fn bracket_placements(ctx: &PairingContext, champion: TeamId) -> Vec<(TeamId, u32)> {
    let mut eliminated: HashMap<TeamId, u32> = HashMap::new();
    for game in ctx.matches.iter().filter(|m| m.is_finished()) {
        let loser = game.losing_team().unwrap_or(game.pairing.second);
        eliminated.insert(loser, game.round_number);
    }

    let mut others: Vec<(TeamId, u32, u32)> = ctx
        .teams
        .iter()
        .filter(|t| t.id != champion)
        .map(|t| {
            (
                t.id,
                eliminated.get(&t.id).copied().unwrap_or(0),
                t.seed.unwrap_or(u32::MAX),
            )
        })
        .collect();
    others.sort_by_key(|&(id, round, seed)| (Reverse(round), seed, id));

    std::iter::once(champion)
        .chain(others.into_iter().map(|(id, _, _)| id))
        .zip(1u32..)
        .collect()
}
