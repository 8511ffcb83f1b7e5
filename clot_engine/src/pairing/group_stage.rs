//! Group stage followed by a knockout bracket.
//!
//! The parent tournament never creates matches itself. At start it spawns one
//! round-robin child per group; once every group has finished, the top two of
//! each group are copied into a seeded-bracket child. The parent finishes
//! with the knockout and maps its placements back to its own teams.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::tournament::{StartOptions, Team, TeamId};

use super::{
    ChildSpec, ChildView, Completion, Format, FormatKind, PairingContext, PairingError,
    PairingResult, PairingStrategy, Proposal, RoundUpdate, RoundRobin, SeededBracket, seed_list,
};

/// Group stage options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStage {
    /// Teams per group when groups are drawn automatically
    pub group_size: usize,
    /// Options for every group
    pub group_format: RoundRobin,
}

impl Default for GroupStage {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl GroupStage {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            group_size: config.group_size,
            group_format: RoundRobin::from_config(config),
        }
    }

    /// Deal teams, best seed first, across `ceil(n / group_size)` groups.
    pub fn draw_groups(&self, teams: &[Team]) -> Vec<Vec<Team>> {
        let count = teams.len().div_ceil(self.group_size.max(2));
        let mut groups: Vec<Vec<Team>> = vec![Vec::new(); count.max(1)];
        for (idx, team) in teams.iter().enumerate() {
            groups[idx % count.max(1)].push(team.clone());
        }
        groups
    }
}

fn group_name(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    format!("Group {letter}")
}

/// Seed order for the knockout: group winners first, then runners-up,
/// swapped so no winner opens against the runner-up of their own group
/// where that can be avoided. Each group lists its teams best first.
pub fn knockout_order(groups: &[Vec<Team>]) -> Vec<Team> {
    let mut order: Vec<Team> = Vec::new();
    let mut group_of: Vec<usize> = Vec::new();
    for rank in 0..2 {
        for (g, teams) in groups.iter().enumerate() {
            if let Some(team) = teams.get(rank) {
                order.push(team.clone());
                group_of.push(g);
            }
        }
    }

    let mut opponent: Vec<Option<usize>> = vec![None; order.len()];
    for pair in seed_list(order.len()).chunks(2) {
        if let [Some(a), Some(b)] = pair {
            opponent[a - 1] = Some(b - 1);
            opponent[b - 1] = Some(a - 1);
        }
    }
    let clash = |group_of: &[usize], i: usize| {
        opponent[i].is_some_and(|o| group_of[o] == group_of[i])
    };

    let winners = groups.iter().filter(|g| !g.is_empty()).count();
    for i in winners..order.len() {
        if !clash(&group_of, i) {
            continue;
        }
        for j in winners..order.len() {
            if j == i {
                continue;
            }
            group_of.swap(i, j);
            if !clash(&group_of, i) && !clash(&group_of, j) {
                order.swap(i, j);
                break;
            }
            group_of.swap(i, j);
        }
    }

    order
}

impl GroupStage {
    fn groups_from(&self, ctx: &PairingContext, start: &StartOptions) -> PairingResult<Vec<Vec<Team>>> {
        let StartOptions::Groups(explicit) = start else {
            return Ok(self.draw_groups(ctx.teams));
        };

        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(explicit.len());
        for ids in explicit {
            let mut group = Vec::with_capacity(ids.len());
            for id in ids {
                let team = ctx.team(*id).ok_or_else(|| {
                    PairingError::InvalidSetup(format!("team {id} is not in the tournament"))
                })?;
                if !seen.insert(*id) {
                    return Err(PairingError::InvalidSetup(format!(
                        "team {id} is in more than one group"
                    )));
                }
                group.push(team.clone());
            }
            groups.push(group);
        }
        Ok(groups)
    }
}

impl PairingStrategy for GroupStage {
    fn plan_start(
        &self,
        ctx: &PairingContext,
        start: &StartOptions,
        _rng: &mut dyn RngCore,
    ) -> PairingResult<Proposal> {
        let groups = self.groups_from(ctx, start)?;
        if groups.len() < 2 || groups.iter().any(|g| g.len() < 2) {
            return Err(PairingError::InvalidSetup(format!(
                "group stage needs at least two groups of two, got sizes {:?}",
                groups.iter().map(Vec::len).collect::<Vec<_>>()
            )));
        }

        let mut proposal = Proposal::default();
        proposal.rounds.push(RoundUpdate::Open(ctx.new_round(
            1,
            Vec::new(),
            0,
            "Group stage".to_string(),
        )));
        proposal.current_round = Some(1);
        proposal.note(format!("{} groups drawn", groups.len()));
        proposal.children = groups
            .into_iter()
            .enumerate()
            .map(|(idx, teams)| ChildSpec {
                name: format!("{} - {}", ctx.tournament.name, group_name(idx)),
                format: Format::RoundRobin(self.group_format.clone()),
                teams,
            })
            .collect();
        Ok(proposal)
    }

    fn propose_next_pairings(&self, ctx: &PairingContext, _rng: &mut dyn RngCore) -> Proposal {
        if ctx.tournament.is_finished {
            return Proposal::default();
        }

        let mut groups: Vec<&ChildView> = ctx
            .children
            .iter()
            .filter(|c| c.tournament.kind() == FormatKind::RoundRobin)
            .collect();
        groups.sort_by_key(|c| c.tournament.id);
        if groups.is_empty() {
            return Proposal::deferred("group stage has no groups");
        }

        let knockout = ctx
            .children
            .iter()
            .find(|c| c.tournament.kind() == FormatKind::SeededBracket);

        match knockout {
            None => {
                if groups.iter().any(|g| !g.tournament.is_finished) {
                    return Proposal::default();
                }
                let ranked: Vec<Vec<Team>> = groups.iter().map(|g| by_placement(&g.teams)).collect();
                let seeded = knockout_order(&ranked);

                let mut proposal = Proposal::default();
                proposal.rounds.push(RoundUpdate::Finish { round_number: 1 });
                proposal.rounds.push(RoundUpdate::Open(ctx.new_round(
                    2,
                    Vec::new(),
                    0,
                    "Knockout".to_string(),
                )));
                proposal.current_round = Some(2);
                proposal.note(format!("{} teams qualified for the knockout", seeded.len()));
                proposal.children.push(ChildSpec {
                    name: format!("{} - Knockout", ctx.tournament.name),
                    format: Format::SeededBracket(SeededBracket::default()),
                    teams: seeded,
                });
                proposal
            }
            Some(bracket) if bracket.tournament.is_finished => {
                let mut proposal = Proposal::default();
                proposal.rounds.push(RoundUpdate::Finish { round_number: 2 });
                proposal.completion = Some(final_standing(ctx, &groups, bracket));
                proposal
            }
            Some(_) => Proposal::default(),
        }
    }
}

fn by_placement(teams: &[Team]) -> Vec<Team> {
    let mut ranked = teams.to_vec();
    ranked.sort_by_key(|t| (t.placement.unwrap_or(u32::MAX), t.seed, t.id));
    ranked
}

fn final_standing(ctx: &PairingContext, groups: &[&ChildView], bracket: &ChildView) -> Completion {
    let winner = bracket
        .tournament
        .winning_team
        .and_then(|id| bracket.teams.iter().find(|t| t.id == id))
        .map(Team::root_id);

    let mut order: Vec<TeamId> = by_placement(&bracket.teams)
        .iter()
        .map(Team::root_id)
        .collect();

    let mut group_rank: HashMap<TeamId, (u32, usize)> = HashMap::new();
    for (g, group) in groups.iter().enumerate() {
        for team in &group.teams {
            group_rank.insert(team.root_id(), (team.placement.unwrap_or(u32::MAX), g));
        }
    }

    let placed: HashSet<TeamId> = order.iter().copied().collect();
    let mut rest: Vec<TeamId> = ctx
        .teams
        .iter()
        .map(|t| t.id)
        .filter(|id| !placed.contains(id))
        .collect();
    rest.sort_by_key(|id| (group_rank.get(id).copied().unwrap_or((u32::MAX, usize::MAX)), *id));
    order.extend(rest);

    Completion {
        winner,
        placements: order.into_iter().zip(1u32..).collect(),
        buchholz: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::test_support::{Fixture, team, teams, tournament};

    fn stage_team(id: TeamId, origin: TeamId, placement: u32) -> Team {
        let mut t = team(id);
        t.origin = Some(origin);
        t.placement = Some(placement);
        t
    }

    fn child(id: i64, format: Format, teams: Vec<Team>, finished: bool) -> ChildView {
        let mut t = tournament(format);
        t.id = id;
        t.parent = Some(1);
        t.is_finished = finished;
        ChildView {
            tournament: t,
            teams,
            matches: Vec::new(),
        }
    }

    #[test]
    fn test_draw_deals_seeds_across_groups() {
        let stage = GroupStage::default();
        let groups = stage.draw_groups(&teams(8));
        assert_eq!(groups.len(), 2);
        let first: Vec<TeamId> = groups[0].iter().map(|t| t.id).collect();
        assert_eq!(first, vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_start_spawns_round_robin_groups() {
        let stage = GroupStage::default();
        let fixture = Fixture::new(Format::GroupStage(stage.clone()), teams(8));
        let mut rng = rand::rng();
        let proposal = stage
            .plan_start(&fixture.ctx(), &StartOptions::Registration, &mut rng)
            .unwrap();
        assert_eq!(proposal.children.len(), 2);
        assert!(proposal.children.iter().all(|c| c.format.kind() == FormatKind::RoundRobin));
        assert!(proposal.children[0].name.ends_with("Group A"));
    }

    #[test]
    fn test_rejects_single_group() {
        let stage = GroupStage::default();
        let fixture = Fixture::new(Format::GroupStage(stage.clone()), teams(3));
        let mut rng = rand::rng();
        let err = stage
            .plan_start(&fixture.ctx(), &StartOptions::Registration, &mut rng)
            .unwrap_err();
        assert!(matches!(err, PairingError::InvalidSetup(_)));
    }

    #[test]
    fn test_explicit_groups_must_not_overlap() {
        let stage = GroupStage::default();
        let fixture = Fixture::new(Format::GroupStage(stage.clone()), teams(4));
        let mut rng = rand::rng();
        let start = StartOptions::Groups(vec![vec![1, 2], vec![2, 3]]);
        assert!(stage.plan_start(&fixture.ctx(), &start, &mut rng).is_err());
    }

    #[test]
    fn test_knockout_avoids_own_group_runner_up() {
        // Three groups: seeds 3 and 6 would be the winner and runner-up of group C.
        let groups = vec![
            vec![team(1), team(4)],
            vec![team(2), team(5)],
            vec![team(3), team(6)],
        ];
        let order: Vec<TeamId> = knockout_order(&groups).iter().map(|t| t.id).collect();
        assert_eq!(&order[..3], &[1, 2, 3]);
        // Seed 3 faces seed 6 in a six-team bracket.
        assert_ne!(order[5], 6);
    }

    #[test]
    fn test_knockout_spawned_when_groups_finish() {
        let stage = GroupStage::default();
        let mut fixture = Fixture::new(Format::GroupStage(stage.clone()), teams(4));
        fixture.children = vec![
            child(2, Format::RoundRobin(RoundRobin::default()), vec![stage_team(10, 1, 2), stage_team(11, 3, 1)], true),
            child(3, Format::RoundRobin(RoundRobin::default()), vec![stage_team(12, 2, 1), stage_team(13, 4, 2)], false),
        ];
        let mut rng = rand::rng();
        assert!(stage.propose_next_pairings(&fixture.ctx(), &mut rng).is_noop());

        fixture.children[1].tournament.is_finished = true;
        let proposal = stage.propose_next_pairings(&fixture.ctx(), &mut rng);
        let knockout = &proposal.children[0];
        let seeds: Vec<TeamId> = knockout.teams.iter().map(|t| t.id).collect();
        assert_eq!(seeds, vec![11, 12, 10, 13]);
    }

    #[test]
    fn test_completion_maps_back_to_parent_teams() {
        let stage = GroupStage::default();
        let mut fixture = Fixture::new(Format::GroupStage(stage.clone()), teams(6));
        let mut bracket = child(
            4,
            Format::SeededBracket(SeededBracket::default()),
            vec![stage_team(20, 3, 1), stage_team(21, 1, 2), stage_team(22, 2, 3), stage_team(23, 4, 4)],
            true,
        );
        bracket.tournament.winning_team = Some(20);
        fixture.children = vec![
            child(2, Format::RoundRobin(RoundRobin::default()), vec![stage_team(10, 1, 1), stage_team(11, 2, 2), stage_team(14, 5, 3)], true),
            child(3, Format::RoundRobin(RoundRobin::default()), vec![stage_team(12, 3, 1), stage_team(13, 4, 2), stage_team(15, 6, 3)], true),
            bracket,
        ];

        let mut rng = rand::rng();
        let proposal = stage.propose_next_pairings(&fixture.ctx(), &mut rng);
        let completion = proposal.completion.unwrap();
        assert_eq!(completion.winner, Some(3));
        let order: Vec<TeamId> = completion.placements.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![3, 1, 2, 4, 5, 6]);
    }
}
