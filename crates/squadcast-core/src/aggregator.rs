// Data aggregator: the fixed fetch sequence that produces one AnalysisBundle.
//
// Order: reference data -> schedule resolution -> fixture window -> manager
// snapshot -> roster history. Reference and manager failures abort the run;
// fixture-window and per-player history failures degrade.

use futures_util::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::model::{
    AnalysisBundle, Fixture, GameweekInfo, GameweekPoints, ManagerSnapshot, ReferenceData,
    RosterEntry,
};
use crate::upstream::{FplSource, UpstreamError};

// ---------------------------------------------------------------------------
// ManagerId
// ---------------------------------------------------------------------------

/// A manager identifier as typed by the user, validated only as far as being
/// a positive integer; existence is decided upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerId(u64);

impl ManagerId {
    pub fn parse(input: &str) -> Result<Self, PipelineError> {
        match input.trim().parse::<u64>() {
            Ok(id) if id > 0 => Ok(ManagerId(id)),
            _ => Err(PipelineError::ManagerNotFound {
                manager_id: input.trim().to_string(),
            }),
        }
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Schedule resolution
// ---------------------------------------------------------------------------

/// Resolve `(current, next)` from the season schedule.
///
/// current: the in-progress gameweek, else the first entry, else 1.
/// next: the first unfinished gameweek, else one past the last, else 1.
pub fn determine_current_and_next_gameweek(schedule: &[GameweekInfo]) -> (u32, u32) {
    let current = schedule
        .iter()
        .find(|g| g.is_current)
        .or_else(|| schedule.first())
        .map(|g| g.id)
        .unwrap_or(1);
    let next = schedule
        .iter()
        .find(|g| !g.finished)
        .map(|g| g.id)
        .or_else(|| schedule.last().map(|g| g.id.saturating_add(1)))
        .unwrap_or(1);
    (current, next)
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Per-roster-player history, with the ids whose fetch failed.
#[derive(Debug, Clone, Default)]
pub struct RosterHistory {
    pub history: BTreeMap<u32, Vec<GameweekPoints>>,
    pub gaps: Vec<u32>,
}

pub struct Aggregator<S> {
    source: S,
    fixture_window: u32,
    season_gameweeks: u32,
    history_window: usize,
}

impl<S: FplSource> Aggregator<S> {
    pub fn new(source: S, config: &Config) -> Self {
        Self {
            source,
            fixture_window: config.upstream.fixture_window,
            season_gameweeks: config.upstream.season_gameweeks,
            history_window: config.analysis.history_window,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Global players, teams and schedule. Single attempt.
    pub async fn fetch_reference_data(&self) -> Result<ReferenceData, PipelineError> {
        let raw = self
            .source
            .bootstrap()
            .await
            .map_err(|e| PipelineError::upstream("reference data", e))?;
        let reference = raw.into_reference();
        info!(
            players = reference.players.len(),
            teams = reference.teams.len(),
            gameweeks = reference.schedule.len(),
            "Reference data loaded"
        );
        Ok(reference)
    }

    /// Fixtures for `start_gw` onwards, one fetch per gameweek, at most
    /// `count` gameweeks and never past `schedule_ceiling`. Stops quietly at
    /// the first failed fetch.
    pub async fn fetch_fixture_window(
        &self,
        start_gw: u32,
        count: u32,
        schedule_ceiling: u32,
    ) -> Vec<Fixture> {
        let end = start_gw.saturating_add(count).min(schedule_ceiling.saturating_add(1));
        let mut fixtures = Vec::new();
        for gw in start_gw..end {
            match self.source.fixtures(gw).await {
                Ok(batch) => fixtures.extend(batch.into_iter().map(Fixture::from)),
                Err(e) => {
                    warn!(gameweek = gw, "Stopping fixture window early: {}", e);
                    break;
                }
            }
        }
        fixtures
    }

    /// Profile, picks for `current_gw`, and chip history.
    pub async fn fetch_manager_snapshot(
        &self,
        manager_id: ManagerId,
        current_gw: u32,
    ) -> Result<ManagerSnapshot, PipelineError> {
        let id = manager_id.get();
        let entry = self.source.entry(id).await.map_err(|e| match e {
            UpstreamError::NotFound { .. } => PipelineError::ManagerNotFound {
                manager_id: manager_id.to_string(),
            },
            other => PipelineError::upstream("manager profile", other),
        })?;
        let picks = self
            .source
            .entry_picks(id, current_gw)
            .await
            .map_err(|e| PipelineError::upstream(format!("picks for GW{current_gw}"), e))?;
        let history = self
            .source
            .entry_history(id)
            .await
            .map_err(|e| PipelineError::upstream("chip history", e))?;

        let profile = entry.into_profile(picks.active_chip.as_deref());
        let roster: Vec<RosterEntry> = picks.picks.into_iter().map(RosterEntry::from).collect();
        Ok(ManagerSnapshot {
            profile,
            roster,
            chips_used: history.into_chip_usage(),
        })
    }

    /// Recent history for each id, fetched concurrently. A failed fetch
    /// yields an empty history for that id only.
    pub async fn fetch_roster_recent_history(&self, player_ids: &[u32]) -> RosterHistory {
        let mut seen = HashSet::new();
        let unique: Vec<u32> = player_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let window = self.history_window;
        let results = join_all(unique.iter().map(|&id| async move {
            (id, self.source.element_summary(id).await)
        }))
        .await;

        let mut out = RosterHistory::default();
        for (id, result) in results {
            match result {
                Ok(summary) => {
                    out.history.insert(id, summary.into_recent(window));
                }
                Err(e) => {
                    warn!(player_id = id, "History unavailable, continuing without it: {}", e);
                    out.history.insert(id, Vec::new());
                    out.gaps.push(id);
                }
            }
        }
        out
    }

    /// Run the full fetch sequence for one manager.
    pub async fn assemble_bundle(
        &self,
        manager_id: ManagerId,
    ) -> Result<AnalysisBundle, PipelineError> {
        info!(%manager_id, "Assembling bundle");

        let reference = self.fetch_reference_data().await?;
        let (current_gw, next_gw) = determine_current_and_next_gameweek(&reference.schedule);
        info!(current_gw, next_gw, "Schedule resolved");

        let fixtures = self
            .fetch_fixture_window(next_gw, self.fixture_window, self.season_gameweeks)
            .await;
        info!(fixtures = fixtures.len(), "Fixture window fetched");

        let snapshot = self.fetch_manager_snapshot(manager_id, current_gw).await?;
        info!(
            manager = %snapshot.profile.name,
            picks = snapshot.roster.len(),
            chips_used = snapshot.chips_used.len(),
            "Manager snapshot fetched"
        );

        let ids: Vec<u32> = snapshot.roster.iter().map(|r| r.player_id).collect();
        let history = self.fetch_roster_recent_history(&ids).await;
        if !history.gaps.is_empty() {
            warn!(missing = ?history.gaps, "Some roster history could not be fetched");
        }

        Ok(AnalysisBundle {
            manager_id: manager_id.get(),
            current_gameweek: current_gw,
            next_gameweek: next_gw,
            players: reference.players,
            teams: reference.teams,
            profile: snapshot.profile,
            roster: snapshot.roster,
            chips_used: snapshot.chips_used,
            fixtures,
            recent_history: history.history,
            history_gaps: history.gaps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gw(id: u32, finished: bool, is_current: bool) -> GameweekInfo {
        GameweekInfo {
            id,
            finished,
            is_current,
            is_next: false,
            deadline: None,
        }
    }

    #[test]
    fn mid_season_schedule() {
        let schedule = vec![gw(1, true, false), gw(2, true, true), gw(3, false, false)];
        assert_eq!(determine_current_and_next_gameweek(&schedule), (2, 3));
    }

    #[test]
    fn current_in_progress_is_also_next_when_unfinished() {
        let schedule = vec![gw(1, true, false), gw(2, false, true), gw(3, false, false)];
        assert_eq!(determine_current_and_next_gameweek(&schedule), (2, 2));
    }

    #[test]
    fn preseason_falls_back_to_first_entry() {
        let schedule = vec![gw(1, false, false), gw(2, false, false)];
        assert_eq!(determine_current_and_next_gameweek(&schedule), (1, 1));
    }

    #[test]
    fn season_over_rolls_next_past_last() {
        let schedule = vec![gw(37, true, false), gw(38, true, true)];
        assert_eq!(determine_current_and_next_gameweek(&schedule), (38, 39));
    }

    #[test]
    fn last_gameweek_id_at_limit_does_not_overflow() {
        let schedule = vec![gw(u32::MAX, true, true)];
        assert_eq!(
            determine_current_and_next_gameweek(&schedule),
            (u32::MAX, u32::MAX)
        );
    }

    #[test]
    fn empty_schedule_defaults_to_one() {
        assert_eq!(determine_current_and_next_gameweek(&[]), (1, 1));
    }

    #[test]
    fn manager_id_parsing() {
        assert_eq!(ManagerId::parse(" 6589598 ").unwrap().get(), 6589598);
        for bad in ["", "abc", "0", "-4", "12.5"] {
            match ManagerId::parse(bad) {
                Err(PipelineError::ManagerNotFound { .. }) => {}
                other => panic!("expected ManagerNotFound for {bad:?}, got {other:?}"),
            }
        }
    }
}
