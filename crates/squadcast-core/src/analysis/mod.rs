// Feature assembly: turns an AnalysisBundle into the compact, serializable
// views the prompt is rendered from.
//
// Every view is a pure function of the bundle. Disabled features come out as
// `None` so the prompt can tell "nothing found" from "not computed".

pub mod chips;
pub mod fixtures;
pub mod players;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{AnalysisConfig, FeatureFlags};
use crate::model::{AnalysisBundle, ChipKind, Position};

use fixtures::{BlankGameweek, CalendarDouble, DoubleGameweek, FixtureOutlook};
use players::{PlayerCard, RosterPlayer};

/// Knobs for view derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisOptions {
    pub top_k: usize,
    pub history_window: usize,
    pub lookahead: usize,
    pub chip_reset_gameweek: u32,
    pub free_transfers: u32,
    pub features: FeatureFlags,
}

impl From<&AnalysisConfig> for AnalysisOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            top_k: config.top_k,
            history_window: config.history_window,
            lookahead: config.lookahead,
            chip_reset_gameweek: config.chip_reset_gameweek,
            free_transfers: config.assumed_free_transfers,
            features: config.features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSummary {
    pub name: String,
    pub rank: Option<u64>,
    pub active_chip: Option<ChipKind>,
    pub squad_value: f64,
    pub bank: f64,
    /// Sum of current prices across the resolved roster.
    pub roster_cost: f64,
    pub free_transfers: u32,
}

/// All derived views for one manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedViews {
    pub current_gameweek: u32,
    pub next_gameweek: u32,
    pub manager: ManagerSummary,
    pub roster: Vec<RosterPlayer>,
    pub flagged: Vec<RosterPlayer>,
    pub top_by_position: BTreeMap<Position, Vec<PlayerCard>>,
    pub fixtures_by_team: BTreeMap<String, Vec<FixtureOutlook>>,
    pub doubles: Option<Vec<DoubleGameweek>>,
    pub calendar_doubles: Option<Vec<CalendarDouble>>,
    pub blanks: Option<Vec<BlankGameweek>>,
    pub chips_available: Option<Vec<ChipKind>>,
    /// Pick ids with no reference record.
    #[serde(default)]
    pub skipped_roster_ids: Vec<u32>,
    /// Roster ids whose history could not be fetched.
    #[serde(default)]
    pub history_gaps: Vec<u32>,
}

pub struct Assembler {
    options: AnalysisOptions,
}

impl Assembler {
    pub fn new(options: AnalysisOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn derive(&self, bundle: &AnalysisBundle) -> DerivedViews {
        let opts = &self.options;
        let features = &opts.features;

        let roster = players::roster_view(bundle, opts.history_window, features);
        let flagged = players::flagged_subset(&roster.players);
        let top = players::top_by_position(bundle, opts.top_k, features);
        let by_team = fixtures::fixtures_by_team(bundle, opts.lookahead);

        let doubles = features.doubles.then(|| fixtures::detect_doubles(bundle));
        let calendar_doubles = features
            .calendar_doubles
            .then(|| fixtures::detect_calendar_doubles(bundle));
        let blanks = features.blanks.then(|| fixtures::detect_blanks(bundle));
        let chips_available = features.chips.then(|| {
            chips::available_chips(
                &bundle.chips_used,
                bundle.next_gameweek,
                opts.chip_reset_gameweek,
            )
        });

        let roster_cost = roster.players.iter().map(|p| p.cost).sum::<f64>();
        let manager = ManagerSummary {
            name: bundle.profile.name.clone(),
            rank: bundle.profile.overall_rank,
            active_chip: bundle.profile.active_chip.clone(),
            squad_value: bundle.profile.squad_value,
            bank: bundle.profile.bank,
            roster_cost: (roster_cost * 10.0).round() / 10.0,
            free_transfers: opts.free_transfers,
        };

        debug!(
            doubles = doubles.as_ref().map_or(0, Vec::len),
            calendar_doubles = calendar_doubles.as_ref().map_or(0, Vec::len),
            blanks = blanks.as_ref().map_or(0, Vec::len),
            "Fixture views derived"
        );
        info!(
            roster = roster.players.len(),
            flagged = flagged.len(),
            skipped = roster.skipped.len(),
            teams = by_team.len(),
            "Views derived"
        );

        DerivedViews {
            current_gameweek: bundle.current_gameweek,
            next_gameweek: bundle.next_gameweek,
            manager,
            roster: roster.players,
            flagged,
            top_by_position: top,
            fixtures_by_team: by_team,
            doubles,
            calendar_doubles,
            blanks,
            chips_available,
            skipped_roster_ids: roster.skipped,
            history_gaps: bundle.history_gaps.clone(),
        }
    }
}
