//! Tournament manager: setup operations and the poll-driven progression cycle.
//!
//! Each [`TournamentManager::advance`] call runs one cycle for a tournament:
//! reconcile open matches against the host, recreate flagged matches, ask the
//! format's pairing strategy for the next batch and persist it. Cycles on the
//! same tournament are serialized through [`TournamentLocks`]. A cycle that
//! finds nothing new changes nothing.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::audit::{self, AuditRecord};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::db::Repository;
use crate::host::models::is_record_missing_reason;
use crate::host::{CreateMatchRequest, HostError, HostSnapshot, MatchHost, timeouts::with_timeout};
use crate::matches::{
    LifecyclePolicy, Match, MatchHistory, MatchState, NewMatch, ReconcileInput, Reconciliation,
    Resolution, SkipReason, reconcile,
};
use crate::pairing::{
    ChildSpec, ChildView, Completion, Format, PairingContext, PairingStrategy, Proposal,
    ProposedMatch, RoundUpdate, TeamUpdate,
};
use crate::rating::rate_result;
use crate::standings;

use super::errors::{ErrorClass, TournamentError, TournamentResult};
use super::locks::TournamentLocks;
use super::models::{
    CalendarMonth, NewTeam, PlayerToken, Round, StandingRow, StartOptions, Team, TeamId,
    TemplateId, Tournament, TournamentConfig, TournamentId,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type CycleResult = TournamentResult<(AdvanceReport, Option<TournamentError>)>;

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub tournament_id: TournamentId,
    /// Open matches polled on the host
    pub polled: usize,
    /// Matches decided with a winner
    pub resolved: usize,
    /// Matches finished without a winner
    pub voided: usize,
    /// Matches left for the next cycle because of a recoverable error
    pub skipped: usize,
    /// Matches held back after breaking an invariant
    pub halted: usize,
    pub recreated: usize,
    /// Matches created from the strategy's proposal
    pub created: usize,
    pub finished: bool,
    /// Reports of child tournaments advanced in the same cycle
    pub children: Vec<AdvanceReport>,
}

impl AdvanceReport {
    fn new(tournament_id: TournamentId) -> Self {
        Self {
            tournament_id,
            ..Self::default()
        }
    }

    /// Whether anything happened in this cycle, children included.
    pub fn had_activity(&self) -> bool {
        self.resolved + self.voided + self.halted + self.recreated + self.created > 0
            || self.children.iter().any(AdvanceReport::had_activity)
    }
}

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    repo: Arc<dyn Repository>,
    host: Arc<dyn MatchHost>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    locks: TournamentLocks,
    rng: Arc<Mutex<StdRng>>,
}

impl TournamentManager {
    /// Create a new tournament manager
    pub fn new(
        repo: Arc<dyn Repository>,
        host: Arc<dyn MatchHost>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            repo,
            host,
            clock,
            config,
            locks: TournamentLocks::new(),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *rng)
    }

    async fn audit(&self, record: AuditRecord) {
        if let Err(e) = self.repo.append_audit(&record).await {
            log::error!(
                "Failed to append audit record for tournament {}: {}",
                record.tournament_id,
                e
            );
        }
    }

    /// Audit a failed item. Invariant violations are returned, everything else
    /// is swallowed so the cycle can continue.
    async fn contain(
        &self,
        tournament_id: TournamentId,
        match_id: Option<i64>,
        result: TournamentResult<()>,
    ) -> TournamentResult<bool> {
        let Err(err) = result else {
            return Ok(true);
        };
        match err.class() {
            ErrorClass::InvariantViolation => {
                self.audit(audit::violation(tournament_id, match_id, err.to_string(), self.now()))
                    .await;
                Err(err)
            }
            class => {
                self.audit(audit::recoverable(
                    tournament_id,
                    match_id,
                    class,
                    err.to_string(),
                    self.now(),
                ))
                .await;
                Ok(false)
            }
        }
    }

    async fn load(&self, id: TournamentId) -> TournamentResult<Tournament> {
        self.repo
            .find_tournament(id)
            .await?
            .ok_or(TournamentError::NotFound(id))
    }

    async fn load_team(&self, id: TeamId) -> TournamentResult<Team> {
        self.repo
            .find_team(id)
            .await?
            .ok_or(TournamentError::TeamNotFound(id))
    }

    // ---- setup -------------------------------------------------------------

    /// Create a new tournament
    pub async fn create_tournament(&self, config: TournamentConfig) -> TournamentResult<Tournament> {
        config.validate()?;
        let tournament = self.repo.create_tournament(&config, self.now()).await?;
        log::info!(
            "Created {} tournament {} '{}'",
            tournament.kind(),
            tournament.id,
            tournament.name
        );
        Ok(tournament)
    }

    /// Look up a tournament
    pub async fn tournament(&self, id: TournamentId) -> TournamentResult<Tournament> {
        self.load(id).await
    }

    /// Teams of a tournament in registration order
    pub async fn teams(&self, id: TournamentId) -> TournamentResult<Vec<Team>> {
        self.load(id).await?;
        Ok(self.repo.teams_for(id).await?)
    }

    /// Matches of a tournament, deleted ones included
    pub async fn matches(&self, id: TournamentId) -> TournamentResult<Vec<Match>> {
        Ok(self.repo.matches_for(id).await?)
    }

    /// Group and knockout tournaments spawned by a group stage
    pub async fn children(&self, id: TournamentId) -> TournamentResult<Vec<Tournament>> {
        Ok(self.repo.child_tournaments(id).await?)
    }

    /// Audit trail of a tournament, oldest first
    pub async fn audit_log(&self, id: TournamentId) -> TournamentResult<Vec<AuditRecord>> {
        Ok(self.repo.audit_for(id).await?)
    }

    /// Register a team before the tournament starts
    pub async fn register_team(
        &self,
        tournament_id: TournamentId,
        name: impl Into<String>,
        players: Vec<PlayerToken>,
    ) -> TournamentResult<Team> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.load(tournament_id).await?;

        // Check state
        if tournament.has_started {
            return Err(TournamentError::AlreadyStarted);
        }
        self.create_team_checked(&tournament, name.into(), players).await
    }

    async fn create_team_checked(
        &self,
        tournament: &Tournament,
        name: String,
        players: Vec<PlayerToken>,
    ) -> TournamentResult<Team> {
        if players.is_empty() || players.len() > tournament.players_per_team as usize {
            return Err(TournamentError::InvalidSetup(format!(
                "a team needs between 1 and {} players",
                tournament.players_per_team
            )));
        }

        let teams = self.repo.teams_for(tournament.id).await?;

        // Check if full
        if teams.len() >= tournament.max_teams as usize {
            return Err(TournamentError::TournamentFull);
        }

        // Check if already registered
        if let Some(player) = players
            .iter()
            .find(|p| teams.iter().any(|t| t.has_player(p)))
        {
            return Err(TournamentError::AlreadyRegistered(player.clone()));
        }

        let new_team = NewTeam {
            tournament_id: tournament.id,
            name,
            players,
            rating: None,
            max_concurrent_matches: self.config.default_max_concurrent,
            joined_at: self.now(),
            seed: None,
            origin: None,
        };
        let team = self
            .repo
            .create_team(&new_team, self.config.initial_rating)
            .await?;
        log::info!("Team {} '{}' joined tournament {}", team.id, team.name, tournament.id);
        Ok(team)
    }

    /// Withdraw a team; it is no longer paired
    pub async fn withdraw_team(&self, team_id: TeamId) -> TournamentResult<()> {
        let team = self.load_team(team_id).await?;
        let _guard = self.locks.acquire(team.tournament_id).await;

        let mut team = self.load_team(team_id).await?;
        if !team.active {
            return Ok(());
        }
        team.active = false;
        self.repo.save_team(&team).await?;
        log::info!("Team {} withdrew from tournament {}", team.id, team.tournament_id);
        Ok(())
    }

    /// Start a tournament, lay out its first rounds and run one cycle
    pub async fn start(
        &self,
        tournament_id: TournamentId,
        options: StartOptions,
    ) -> TournamentResult<AdvanceReport> {
        let _guard = self.locks.acquire(tournament_id).await;
        self.start_locked(tournament_id, options).await
    }

    fn start_locked(
        &self,
        tournament_id: TournamentId,
        options: StartOptions,
    ) -> BoxFuture<'_, TournamentResult<AdvanceReport>> {
        Box::pin(async move {
            let mut tournament = self.load(tournament_id).await?;
            if tournament.has_started {
                return Err(TournamentError::AlreadyStarted);
            }

            let registered = self.repo.teams_for(tournament_id).await?;
            let (mut starting, partial): (Vec<Team>, Vec<Team>) = registered
                .into_iter()
                .filter(|t| t.active)
                .partition(|t| t.is_full(tournament.players_per_team));

            order_for_start(&mut starting, &options)?;
            for (idx, team) in starting.iter_mut().enumerate() {
                team.seed = Some(idx as u32 + 1);
            }

            let now = self.now();
            let history = MatchHistory::default();
            let access = HashMap::new();
            let ctx = PairingContext {
                tournament: &tournament,
                teams: &starting,
                rounds: &[],
                matches: &[],
                history: &history,
                children: &[],
                template_access: &access,
                now,
            };
            let plan = self.with_rng(|rng| tournament.format.plan_start(&ctx, &options, rng))?;

            for mut team in partial {
                team.active = false;
                self.repo.save_team(&team).await?;
                self.audit(audit::pairing_cycle(
                    tournament_id,
                    format!("team {} excluded: incomplete roster", team.id),
                    now,
                ))
                .await;
            }
            for team in &starting {
                self.repo.save_team(team).await?;
            }

            tournament.mark_started(now)?;
            self.repo.save_tournament(&tournament).await?;
            log::info!(
                "Tournament {} started with {} teams",
                tournament_id,
                starting.len()
            );

            let mut report = AdvanceReport::new(tournament_id);
            self.apply_proposal(&mut tournament, plan, &mut report).await?;
            let cycle = self.advance_locked(tournament_id).await?;
            report.created += cycle.created;
            report.polled += cycle.polled;
            report.finished = cycle.finished;
            report.children.extend(cycle.children);
            Ok(report)
        })
    }

    /// Pause or resume pairing. Open matches keep being reconciled.
    pub async fn set_game_creation_allowed(
        &self,
        tournament_id: TournamentId,
        allowed: bool,
    ) -> TournamentResult<()> {
        let _guard = self.locks.acquire(tournament_id).await;
        let mut tournament = self.load(tournament_id).await?;
        if tournament.game_creation_allowed != allowed {
            tournament.game_creation_allowed = allowed;
            self.repo.save_tournament(&tournament).await?;
            log::info!(
                "Tournament {} game creation {}",
                tournament_id,
                if allowed { "resumed" } else { "paused" }
            );
        }
        Ok(())
    }

    /// Flag a match to be deleted and recreated on the next cycle
    pub async fn request_recreation(&self, match_id: i64) -> TournamentResult<()> {
        let game = self
            .repo
            .find_match(match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        let _guard = self.locks.acquire(game.tournament_id).await;

        let mut game = self
            .repo
            .find_match(match_id)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        if !game.is_open() {
            return Err(TournamentError::InvalidSetup(format!(
                "match {match_id} is already over"
            )));
        }
        game.needs_recreation = true;
        self.repo.save_match(&game).await?;
        Ok(())
    }

    // ---- ladder and monthly ------------------------------------------------

    fn require_ladder(tournament: &Tournament) -> TournamentResult<&crate::pairing::ContinuousLadder> {
        match &tournament.format {
            Format::ContinuousLadder(ladder) => Ok(ladder),
            other => Err(TournamentError::UnsupportedFormat(other.kind().to_string())),
        }
    }

    /// Join a ladder, or come back to it with a fresh place in the queue
    pub async fn join_ladder(
        &self,
        tournament_id: TournamentId,
        name: impl Into<String>,
        players: Vec<PlayerToken>,
    ) -> TournamentResult<Team> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.load(tournament_id).await?;
        Self::require_ladder(&tournament)?;

        let teams = self.repo.teams_for(tournament_id).await?;
        let returning = teams
            .into_iter()
            .find(|t| !players.is_empty() && players.iter().all(|p| t.has_player(p)));

        let team = match returning {
            Some(mut team) => {
                team.active = true;
                team.joined_at = self.now();
                self.repo.save_team(&team).await?;
                team
            }
            None => {
                let mut team = self
                    .create_team_checked(&tournament, name.into(), players)
                    .await?;
                if team.max_concurrent_matches != 1 {
                    team.max_concurrent_matches = 1;
                    self.repo.save_team(&team).await?;
                }
                team
            }
        };
        log::info!("Team {} is on ladder {}", team.id, tournament_id);
        Ok(team)
    }

    /// Leave a ladder; open games still finish
    pub async fn leave_ladder(&self, team_id: TeamId) -> TournamentResult<()> {
        let team = self.load_team(team_id).await?;
        let tournament = self.load(team.tournament_id).await?;
        Self::require_ladder(&tournament)?;
        self.withdraw_team(team_id).await
    }

    /// Veto one ladder template, replacing any earlier veto
    pub async fn veto_template(&self, team_id: TeamId, template: TemplateId) -> TournamentResult<()> {
        let team = self.load_team(team_id).await?;
        let _guard = self.locks.acquire(team.tournament_id).await;
        let tournament = self.load(team.tournament_id).await?;
        let ladder = Self::require_ladder(&tournament)?;
        if !ladder.templates.contains(&template) {
            return Err(TournamentError::InvalidSetup(format!(
                "template {template} is not played on this ladder"
            )));
        }

        let mut team = self.load_team(team_id).await?;
        team.vetoed_templates = vec![template];
        self.repo.save_team(&team).await?;
        Ok(())
    }

    /// Validate a month of a monthly rotation with its template
    pub async fn assign_month_template(
        &self,
        tournament_id: TournamentId,
        month: CalendarMonth,
        template: TemplateId,
    ) -> TournamentResult<()> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.load(tournament_id).await?;
        if !matches!(tournament.format, Format::MonthlyRotation(_)) {
            return Err(TournamentError::UnsupportedFormat(tournament.kind().to_string()));
        }

        let mut round = self
            .repo
            .rounds_for(tournament_id)
            .await?
            .into_iter()
            .find(|r| r.calendar == Some(month))
            .ok_or_else(|| TournamentError::InvalidSetup(format!("{month} is not scheduled")))?;
        round.template = Some(template);
        self.repo.save_round(&round).await?;
        log::info!("Tournament {tournament_id}: {month} plays template {template}");
        Ok(())
    }

    // ---- queries -----------------------------------------------------------

    /// Ordered standings table
    pub async fn get_standings(&self, tournament_id: TournamentId) -> TournamentResult<Vec<StandingRow>> {
        self.load(tournament_id).await?;
        let teams = self.repo.teams_for(tournament_id).await?;
        Ok(standings::table(&teams))
    }

    pub async fn is_finished(&self, tournament_id: TournamentId) -> TournamentResult<bool> {
        Ok(self.load(tournament_id).await?.is_finished)
    }

    // ---- the cycle ---------------------------------------------------------

    /// Run one reconciliation and pairing cycle
    pub async fn advance(&self, tournament_id: TournamentId) -> TournamentResult<AdvanceReport> {
        let _guard = self.locks.acquire(tournament_id).await;
        self.advance_locked(tournament_id).await
    }

    async fn advance_locked(&self, tournament_id: TournamentId) -> TournamentResult<AdvanceReport> {
        let (report, violation) = self.cycle_locked(tournament_id).await?;
        match violation {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// One cycle over the tournament and its children. The first invariant
    /// violation is handed back next to the report once every match has had
    /// its turn.
    fn cycle_locked(&self, tournament_id: TournamentId) -> BoxFuture<'_, CycleResult> {
        Box::pin(async move {
            let mut report = AdvanceReport::new(tournament_id);
            let mut tournament = self.load(tournament_id).await?;
            if !tournament.has_started {
                return Err(TournamentError::NotStarted);
            }
            if tournament.is_finished {
                report.finished = true;
                return Ok((report, None));
            }

            let mut violation = None;

            // Children first, each under its own lock
            for child in self.repo.child_tournaments(tournament_id).await? {
                if child.is_finished || !child.has_started {
                    continue;
                }
                let _child_guard = self.locks.acquire(child.id).await;
                let (child_report, child_violation) = match self.cycle_locked(child.id).await {
                    Ok(cycle) => cycle,
                    Err(e) => {
                        if let Err(e) = self.contain(tournament_id, None, Err(e)).await {
                            violation = violation.or(Some(e));
                        }
                        continue;
                    }
                };
                report.children.push(child_report);
                if let Some(e) = child_violation {
                    violation = violation.or(Some(e));
                }
            }

            if let Some(e) = self.reconcile_open_matches(&tournament, &mut report).await? {
                violation = violation.or(Some(e));
            }
            self.recreate_flagged(&tournament, &mut report).await?;

            if tournament.game_creation_allowed {
                let proposal = self.propose(&tournament).await?;
                if !proposal.is_noop() || !proposal.notes.is_empty() {
                    self.apply_proposal(&mut tournament, proposal, &mut report).await?;
                }
            } else {
                log::debug!("Tournament {} is paused; skipping pairing", tournament_id);
            }

            report.finished = tournament.is_finished;
            Ok((report, violation))
        })
    }

    /// Reconcile every polled match. A match that breaks an invariant is
    /// halted and its error returned after the rest have been processed.
    async fn reconcile_open_matches(
        &self,
        tournament: &Tournament,
        report: &mut AdvanceReport,
    ) -> TournamentResult<Option<TournamentError>> {
        let mut teams = self.repo.teams_for(tournament.id).await?;
        let policy = tournament.format.lifecycle_policy(&self.config);
        let open: Vec<Match> = self
            .repo
            .matches_for(tournament.id)
            .await?
            .into_iter()
            .filter(Match::needs_polling)
            .collect();

        let mut violation = None;
        for game in open {
            let held = game.clone();
            let result = self
                .reconcile_one(tournament, &mut teams, game, &policy, report)
                .await;
            match result {
                Ok(true) => {}
                Ok(false) => report.skipped += 1,
                Err(e) => match self.contain(tournament.id, Some(held.id), Err(e)).await {
                    Ok(_) => report.skipped += 1,
                    Err(e) => {
                        self.halt(held).await?;
                        report.halted += 1;
                        violation = violation.or(Some(e));
                    }
                },
            }
        }
        Ok(violation)
    }

    async fn halt(&self, mut game: Match) -> TournamentResult<()> {
        log::error!(
            "Tournament {}: match {} halted until it is recreated",
            game.tournament_id,
            game.id
        );
        game.state = MatchState::Halted;
        game.last_activity = self.now();
        self.repo.save_match(&game).await?;
        Ok(())
    }

    async fn reconcile_one(
        &self,
        tournament: &Tournament,
        teams: &mut [Team],
        mut game: Match,
        policy: &LifecyclePolicy,
        report: &mut AdvanceReport,
    ) -> TournamentResult<bool> {
        let Some(host_id) = game.host_match_id.clone() else {
            return Err(TournamentError::InvalidSetup(format!(
                "match {} has no host game",
                game.id
            )));
        };

        report.polled += 1;
        let snapshot: HostSnapshot =
            match with_timeout(self.config.host_timeout, self.host.match_status(&host_id)).await {
                Ok(snapshot) => snapshot,
                // A lost record is voided whether the host errors or reports it
                Err(HostError::Rejected { reason }) if is_record_missing_reason(&reason) => {
                    HostSnapshot::errored(reason)
                }
                Err(e) => return Err(e.into()),
            };
        let now = self.now();

        let mut vacations: HashMap<TeamId, bool> = HashMap::new();
        let decision = loop {
            let input = ReconcileInput {
                game: &game,
                snapshot: &snapshot,
                teams: &*teams,
                policy,
                vacations: &vacations,
                now,
            };
            match reconcile(&input)? {
                Reconciliation::NeedsVacationStatus(team_id) => {
                    let on_vacation = self.team_on_vacation(teams, team_id).await?;
                    vacations.insert(team_id, on_vacation);
                }
                decision => break decision,
            }
        };

        match decision {
            Reconciliation::Open {
                state,
                boot_deadline,
            } => {
                if game.state != state || game.boot_deadline != boot_deadline {
                    let message = format!("{:?} -> {:?}", game.state, state);
                    if game.state != state {
                        game.last_activity = now;
                    }
                    game.state = state;
                    game.boot_deadline = boot_deadline;
                    self.repo.save_match(&game).await?;
                    self.audit(audit::match_status(tournament.id, game.id, message, now))
                        .await;
                }
            }
            Reconciliation::Skipped(reason) => {
                let (class, message) = match reason {
                    SkipReason::HostError(reason) => {
                        (ErrorClass::RecoverableRemote, format!("host reported: {reason}"))
                    }
                    SkipReason::UnknownPlayer(player) => (
                        ErrorClass::RecoverableData,
                        format!("player {player} belongs to no team"),
                    ),
                };
                self.audit(audit::recoverable(tournament.id, Some(game.id), class, message, now))
                    .await;
                return Ok(false);
            }
            Reconciliation::Voided {
                invalid_link,
                reason,
            } => {
                game.void(now, invalid_link);
                self.repo.record_result(&game, &[]).await?;
                report.voided += 1;
                self.audit(audit::match_resolution(
                    tournament.id,
                    game.id,
                    format!("voided: {reason}"),
                    now,
                ))
                .await;
            }
            Reconciliation::Decided(resolution) => {
                self.apply_resolution(tournament, teams, game, resolution, now)
                    .await?;
                report.resolved += 1;
            }
            Reconciliation::NeedsVacationStatus(_) => {}
        }
        Ok(true)
    }

    async fn team_on_vacation(&self, teams: &[Team], team_id: TeamId) -> TournamentResult<bool> {
        let team = teams
            .iter()
            .find(|t| t.id == team_id)
            .ok_or(TournamentError::TeamNotFound(team_id))?;
        for player in &team.players {
            if with_timeout(self.config.host_timeout, self.host.is_on_vacation(player)).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn apply_resolution(
        &self,
        tournament: &Tournament,
        teams: &mut [Team],
        mut game: Match,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> TournamentResult<()> {
        let find = |id: TeamId| {
            teams
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or(TournamentError::TeamNotFound(id))
        };
        let before_winner = find(resolution.winner)?;
        let before_loser = find(resolution.loser)?;

        game.finish_with_winner(resolution.winner, resolution.outcome, now)?;

        let mut winner = before_winner.clone();
        let mut loser = before_loser.clone();
        if tournament.carry_rating {
            let change = rate_result(before_winner.rating, before_loser.rating, self.config.k_factor);
            winner.rating = change.winner;
            loser.rating = change.loser;
        }
        winner.wins += 1;
        loser.losses += 1;
        winner.buchholz += before_loser.buchholz;
        loser.buchholz += before_winner.buchholz;

        if tournament.format.deactivates_no_shows() {
            for team in [&mut winner, &mut loser] {
                if resolution.no_show_teams.contains(&team.id) {
                    team.active = false;
                    log::info!("Team {} removed from ladder {} for not showing up", team.id, tournament.id);
                }
            }
        }

        self.repo
            .record_result(&game, &[winner.clone(), loser.clone()])
            .await?;
        for updated in [winner, loser] {
            if let Some(slot) = teams.iter_mut().find(|t| t.id == updated.id) {
                *slot = updated;
            }
        }

        self.audit(audit::match_resolution(
            tournament.id,
            game.id,
            format!(
                "team {} beat team {} ({:?})",
                resolution.winner, resolution.loser, resolution.outcome
            ),
            now,
        ))
        .await;

        if resolution.delete_on_host {
            if let Some(host_id) = &game.host_match_id {
                let deleted =
                    with_timeout(self.config.host_timeout, self.host.delete_match(host_id)).await;
                if let Err(e) = deleted {
                    if !e.is_record_missing() {
                        self.audit(audit::recoverable(
                            tournament.id,
                            Some(game.id),
                            ErrorClass::RecoverableRemote,
                            format!("could not delete host game {host_id}: {e}"),
                            now,
                        ))
                        .await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn recreate_flagged(
        &self,
        tournament: &Tournament,
        report: &mut AdvanceReport,
    ) -> TournamentResult<()> {
        let flagged: Vec<Match> = self
            .repo
            .matches_for(tournament.id)
            .await?
            .into_iter()
            .filter(|m| m.needs_recreation && m.is_open())
            .collect();
        if flagged.is_empty() {
            return Ok(());
        }

        let teams = self.repo.teams_for(tournament.id).await?;
        for game in flagged {
            let match_id = game.id;
            let result = self.recreate(tournament, &teams, game).await;
            if self.contain(tournament.id, Some(match_id), result).await? {
                report.recreated += 1;
            } else {
                report.skipped += 1;
            }
        }
        Ok(())
    }

    async fn recreate(&self, tournament: &Tournament, teams: &[Team], mut game: Match) -> TournamentResult<()> {
        let now = self.now();
        if let Some(host_id) = &game.host_match_id {
            match with_timeout(self.config.host_timeout, self.host.delete_match(host_id)).await {
                Ok(()) => {}
                Err(e) if e.is_record_missing() => {}
                Err(e) => return Err(e.into()),
            }
        }

        game.state = MatchState::Deleted;
        game.needs_recreation = false;
        game.last_activity = now;
        self.repo.save_match(&game).await?;
        self.repo.delete_match_entries(game.id).await?;

        let proposed = ProposedMatch {
            template: game.template,
            settings: match &tournament.format {
                Format::ContinuousLadder(ladder) => ladder.realtime_settings(),
                _ => serde_json::Map::new(),
            },
            ..ProposedMatch::new(game.round_number, game.pairing)
        };
        let created = self
            .create_hosted_match(tournament, teams, game.round_id, &proposed)
            .await?;
        self.audit(audit::match_status(
            tournament.id,
            game.id,
            format!("recreated as match {}", created.id),
            now,
        ))
        .await;
        Ok(())
    }

    async fn create_hosted_match(
        &self,
        tournament: &Tournament,
        teams: &[Team],
        round_id: i64,
        proposed: &ProposedMatch,
    ) -> TournamentResult<Match> {
        let team = |id: TeamId| {
            teams
                .iter()
                .find(|t| t.id == id)
                .ok_or(TournamentError::TeamNotFound(id))
        };
        let first = team(proposed.pairing.first)?;
        let second = team(proposed.pairing.second)?;

        let request = CreateMatchRequest {
            name: format!("{}: {} vs {}", tournament.name, first.name, second.name),
            template: proposed.template.or(tournament.template),
            sides: [first.players.clone(), second.players.clone()],
            settings: proposed.settings.clone(),
        };
        let host_id = with_timeout(self.config.host_timeout, self.host.create_match(&request)).await?;

        let new_match = NewMatch {
            tournament_id: tournament.id,
            round_id,
            round_number: proposed.round_number,
            pairing: proposed.pairing,
            host_match_id: host_id.clone(),
            template: request.template,
            created_at: self.now(),
        };
        match self.repo.create_match(&new_match).await {
            Ok(created) => Ok(created),
            Err(e) => {
                // Don't leave an orphan game on the host.
                let deleted =
                    with_timeout(self.config.host_timeout, self.host.delete_match(&host_id)).await;
                if let Err(delete_err) = deleted {
                    log::warn!("Orphan host game {} left behind: {}", host_id, delete_err);
                    self.audit(audit::recoverable(
                        tournament.id,
                        None,
                        ErrorClass::RecoverableRemote,
                        format!("could not delete orphan host game {host_id}: {delete_err}"),
                        self.now(),
                    ))
                    .await;
                }
                Err(e.into())
            }
        }
    }

    async fn template_access(
        &self,
        tournament: &Tournament,
        teams: &[Team],
        template: TemplateId,
    ) -> HashMap<TeamId, bool> {
        let mut access = HashMap::new();
        for team in teams.iter().filter(|t| t.active) {
            let mut allowed = true;
            for player in &team.players {
                let result = with_timeout(
                    self.config.host_timeout,
                    self.host.can_use_template(player, template),
                )
                .await;
                match result {
                    Ok(true) => {}
                    Ok(false) => {
                        allowed = false;
                        break;
                    }
                    Err(e) => {
                        self.audit(audit::recoverable(
                            tournament.id,
                            None,
                            ErrorClass::RecoverableRemote,
                            format!("template check for team {} failed: {e}", team.id),
                            self.now(),
                        ))
                        .await;
                        allowed = false;
                        break;
                    }
                }
            }
            access.insert(team.id, allowed);
        }
        access
    }

    async fn propose(&self, tournament: &Tournament) -> TournamentResult<Proposal> {
        let now = self.now();
        let teams = self.repo.teams_for(tournament.id).await?;
        let rounds = self.repo.rounds_for(tournament.id).await?;
        let matches: Vec<Match> = self
            .repo
            .matches_for(tournament.id)
            .await?
            .into_iter()
            .filter(|m| m.state != MatchState::Deleted)
            .collect();
        let history = MatchHistory::from_entries(&self.repo.entries_for(tournament.id).await?);

        let mut children = Vec::new();
        for child in self.repo.child_tournaments(tournament.id).await? {
            let teams = self.repo.teams_for(child.id).await?;
            let matches = self.repo.matches_for(child.id).await?;
            children.push(ChildView {
                tournament: child,
                teams,
                matches,
            });
        }

        let access = match tournament.format.template_gate(&rounds, now) {
            Some(template) => self.template_access(tournament, &teams, template).await,
            None => HashMap::new(),
        };

        let ctx = PairingContext {
            tournament,
            teams: &teams,
            rounds: &rounds,
            matches: &matches,
            history: &history,
            children: &children,
            template_access: &access,
            now,
        };
        Ok(self.with_rng(|rng| tournament.format.propose_next_pairings(&ctx, rng)))
    }

    async fn apply_proposal(
        &self,
        tournament: &mut Tournament,
        proposal: Proposal,
        report: &mut AdvanceReport,
    ) -> TournamentResult<()> {
        let now = self.now();
        let before = tournament.clone();

        for note in &proposal.notes {
            self.audit(audit::pairing_cycle(tournament.id, note.clone(), now))
                .await;
        }

        let mut rounds = self.repo.rounds_for(tournament.id).await?;
        for update in proposal.rounds {
            self.apply_round_update(&mut rounds, update).await?;
        }

        let mut teams = self.repo.teams_for(tournament.id).await?;
        for update in proposal.teams {
            let team_id = match update {
                TeamUpdate::UsedBye(id) | TeamUpdate::MaxConcurrent { team: id, .. } => id,
            };
            let Some(team) = teams.iter_mut().find(|t| t.id == team_id) else {
                continue;
            };
            match update {
                TeamUpdate::UsedBye(_) => team.has_used_bye = true,
                TeamUpdate::MaxConcurrent { cap, .. } => {
                    team.max_concurrent_matches = self.config.clamp_concurrency(cap);
                }
            }
            self.repo.save_team(team).await?;
        }

        if let Some(current) = proposal.current_round {
            tournament.current_round = current;
        }

        for proposed in &proposal.pairings {
            let Some(round) = rounds.iter().find(|r| r.round_number == proposed.round_number) else {
                self.audit(audit::recoverable(
                    tournament.id,
                    None,
                    ErrorClass::RecoverableData,
                    format!("round {} does not exist", proposed.round_number),
                    now,
                ))
                .await;
                continue;
            };
            let result = self
                .create_hosted_match(tournament, &teams, round.id, proposed)
                .await
                .map(|_| ());
            if self.contain(tournament.id, None, result).await? {
                report.created += 1;
            }
        }

        for stage in proposal.children {
            self.spawn_child(tournament, stage).await?;
        }

        if let Some(completion) = proposal.completion {
            self.complete(tournament, &mut teams, completion, now).await?;
        }

        if *tournament != before {
            self.repo.save_tournament(tournament).await?;
        }
        Ok(())
    }

    async fn apply_round_update(&self, rounds: &mut Vec<Round>, update: RoundUpdate) -> TournamentResult<()> {
        match update {
            RoundUpdate::Open(new_round) => {
                let round = self.repo.create_round(&new_round).await?;
                rounds.push(round);
            }
            RoundUpdate::SetPairings {
                round_number,
                pairings,
                expected_match_count,
            } => {
                if let Some(round) = rounds.iter_mut().find(|r| r.round_number == round_number) {
                    round.pairings = pairings;
                    round.expected_match_count = expected_match_count;
                    self.repo.save_round(round).await?;
                }
            }
            RoundUpdate::Finish { round_number } => {
                if let Some(round) = rounds
                    .iter_mut()
                    .find(|r| r.round_number == round_number && !r.is_finished)
                {
                    round.is_finished = true;
                    self.repo.save_round(round).await?;
                    log::info!("Tournament {}: {} finished", round.tournament_id, round.title);
                }
            }
        }
        Ok(())
    }

    async fn spawn_child(&self, parent: &Tournament, stage: ChildSpec) -> TournamentResult<()> {
        let config = TournamentConfig {
            name: stage.name,
            format: stage.format,
            players_per_team: parent.players_per_team,
            max_teams: (stage.teams.len() as u32).max(2),
            carry_rating: parent.carry_rating,
            template: parent.template,
            parent: Some(parent.id),
        };
        let child = self.repo.create_tournament(&config, self.now()).await?;

        for (idx, team) in stage.teams.iter().enumerate() {
            let mut copy = team.stage_copy(child.id, parent.carry_rating);
            copy.seed = Some(idx as u32 + 1);
            self.repo
                .create_team(&copy, self.config.initial_rating)
                .await?;
        }
        log::info!(
            "Tournament {} spawned {} ({} teams)",
            parent.id,
            child.name,
            stage.teams.len()
        );

        let _guard = self.locks.acquire(child.id).await;
        self.start_locked(child.id, StartOptions::Registration).await?;
        Ok(())
    }

    async fn complete(
        &self,
        tournament: &mut Tournament,
        teams: &mut [Team],
        completion: Completion,
        now: DateTime<Utc>,
    ) -> TournamentResult<()> {
        let places: HashMap<TeamId, u32> = completion.placements.iter().copied().collect();
        for team in teams.iter_mut() {
            let mut changed = false;
            if let Some(buchholz) = completion.buchholz.as_ref().and_then(|b| b.get(&team.id)) {
                changed |= team.buchholz != *buchholz;
                team.buchholz = *buchholz;
            }
            if let Some(place) = places.get(&team.id) {
                changed |= team.placement != Some(*place);
                team.placement = Some(*place);
            }
            if changed {
                self.repo.save_team(team).await?;
            }
        }

        if tournament.mark_finished(completion.winner, now) {
            let winner = completion
                .winner
                .map_or_else(|| "no winner".to_string(), |w| format!("winner team {w}"));
            self.audit(audit::pairing_cycle(
                tournament.id,
                format!("tournament finished, {winner}"),
                now,
            ))
            .await;
        }
        Ok(())
    }
}

/// Put starting teams in seed order.
fn order_for_start(teams: &mut Vec<Team>, options: &StartOptions) -> TournamentResult<()> {
    teams.sort_by_key(|t| (t.seed.unwrap_or(u32::MAX), t.joined_at, t.id));

    if let StartOptions::Seeds(order) = options {
        let mut seeded = Vec::with_capacity(teams.len());
        for id in order {
            let idx = teams
                .iter()
                .position(|t| t.id == *id)
                .ok_or(TournamentError::TeamNotFound(*id))?;
            seeded.push(teams.remove(idx));
        }
        seeded.append(teams);
        *teams = seeded;
    }
    Ok(())
}
