// Player-level views: top-K by position, the roster view, the flagged subset
// and the classification inputs attached to roster players.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

use crate::config::FeatureFlags;
use crate::model::{
    AdvancedMetrics, AnalysisBundle, Availability, GameweekPoints, Player, Position, PriceTrend,
};

/// A replacement candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCard {
    pub id: u32,
    pub name: String,
    pub team: String,
    pub pos: Position,
    pub form: f64,
    pub points: i32,
    pub cost: f64,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub ep: f64,
    pub status: Availability,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub news: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adv: Option<AdvancedMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<PriceTrend>,
}

/// Precomputed numbers the flop / rising-star / injury thresholds refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationInputs {
    /// Sum of the most recent 3 recorded gameweeks; `None` without history.
    pub last3: Option<i32>,
    pub last4: Option<i32>,
    pub form: f64,
    pub ppg: f64,
    pub xgi90: f64,
    pub starts: u32,
    pub minutes: u32,
}

/// One player in the manager's current squad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterPlayer {
    pub id: u32,
    pub name: String,
    pub team: String,
    pub pos: Position,
    pub form: f64,
    pub points: i32,
    pub cost: f64,
    pub status: Availability,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub news: String,
    pub chance: Option<u8>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub captain: bool,
    /// Recent gameweek points, most recent first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<ClassificationInputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adv: Option<AdvancedMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<PriceTrend>,
}

impl RosterPlayer {
    /// Not fully available, or a known chance of playing below 100.
    pub fn is_flagged(&self) -> bool {
        !self.status.is_available() || self.chance.is_some_and(|c| c < 100)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn compact_metrics(m: &AdvancedMetrics) -> AdvancedMetrics {
    AdvancedMetrics {
        xg: round2(m.xg),
        xa: round2(m.xa),
        xgi: round2(m.xgi),
        xgc: round2(m.xgc),
        xg_per90: round2(m.xg_per90),
        xa_per90: round2(m.xa_per90),
        xgi_per90: round2(m.xgi_per90),
        xgc_per90: round2(m.xgc_per90),
        influence: round2(m.influence),
        creativity: round2(m.creativity),
        threat: round2(m.threat),
        ict_index: round2(m.ict_index),
    }
}

fn compact_trend(t: &PriceTrend) -> PriceTrend {
    PriceTrend {
        change: round2(t.change),
        transfers_in: t.transfers_in,
        transfers_out: t.transfers_out,
        ownership_pct: round2(t.ownership_pct),
    }
}

fn card(player: &Player, team: &str, features: &FeatureFlags) -> PlayerCard {
    PlayerCard {
        id: player.id,
        name: player.name.clone(),
        team: team.to_string(),
        pos: player.position,
        form: player.form,
        points: player.total_points,
        cost: player.price,
        minutes: player.minutes,
        goals: player.goals,
        assists: player.assists,
        ep: player.expected_points,
        status: player.status.clone(),
        news: player.news.clone(),
        adv: features
            .advanced_metrics
            .then(|| compact_metrics(&player.advanced)),
        trend: features.price_trends.then(|| compact_trend(&player.price_trend)),
    }
}

/// Top `k` players per position by form, descending. Ties keep table order.
pub fn top_by_position(
    bundle: &AnalysisBundle,
    k: usize,
    features: &FeatureFlags,
) -> BTreeMap<Position, Vec<PlayerCard>> {
    Position::ALL
        .iter()
        .map(|&pos| {
            let mut candidates: Vec<&Player> =
                bundle.players.iter().filter(|p| p.position == pos).collect();
            // sort_by is stable, so equal form keeps reference-table order.
            candidates.sort_by(|a, b| b.form.total_cmp(&a.form));
            let cards = candidates
                .into_iter()
                .take(k)
                .map(|p| card(p, bundle.team_code(p.team_id), features))
                .collect();
            (pos, cards)
        })
        .collect()
}

/// Sum of the `n` most recent entries of a chronological history.
fn recent_sum(history: &[GameweekPoints], n: usize) -> Option<i32> {
    if history.is_empty() {
        return None;
    }
    Some(history.iter().rev().take(n).map(|g| g.points).sum())
}

pub fn classification_inputs(player: &Player, history: &[GameweekPoints]) -> ClassificationInputs {
    ClassificationInputs {
        last3: recent_sum(history, 3),
        last4: recent_sum(history, 4),
        form: player.form,
        ppg: player.points_per_game,
        xgi90: round2(player.advanced.xgi_per90),
        starts: player.starts,
        minutes: player.minutes,
    }
}

/// Result of building the roster view.
#[derive(Debug, Clone, Default)]
pub struct RosterView {
    pub players: Vec<RosterPlayer>,
    /// Pick ids with no matching reference record.
    pub skipped: Vec<u32>,
}

/// The manager's picks joined against the reference table, in pick order.
/// Duplicate picks are collapsed; ids missing from the table are skipped.
pub fn roster_view(
    bundle: &AnalysisBundle,
    history_window: usize,
    features: &FeatureFlags,
) -> RosterView {
    let by_id: HashMap<u32, &Player> = bundle.players.iter().map(|p| (p.id, p)).collect();
    let mut seen = HashSet::new();
    let mut view = RosterView::default();

    for entry in &bundle.roster {
        if !seen.insert(entry.player_id) {
            continue;
        }
        let Some(player) = by_id.get(&entry.player_id) else {
            warn!(player_id = entry.player_id, "Roster pick missing from reference table, skipping");
            view.skipped.push(entry.player_id);
            continue;
        };

        let history = bundle
            .recent_history
            .get(&player.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let recent = features.recent_history.then(|| {
            history
                .iter()
                .rev()
                .take(history_window)
                .map(|g| g.points)
                .collect()
        });

        view.players.push(RosterPlayer {
            id: player.id,
            name: player.name.clone(),
            team: bundle.team_code(player.team_id).to_string(),
            pos: player.position,
            form: player.form,
            points: player.total_points,
            cost: player.price,
            status: player.status.clone(),
            news: player.news.clone(),
            chance: player.chance_of_playing,
            captain: entry.is_captain,
            recent,
            signals: features
                .classification
                .then(|| classification_inputs(player, history)),
            adv: features
                .advanced_metrics
                .then(|| compact_metrics(&player.advanced)),
            trend: features.price_trends.then(|| compact_trend(&player.price_trend)),
        });
    }

    view
}

/// Roster players with an availability concern.
pub fn flagged_subset(roster: &[RosterPlayer]) -> Vec<RosterPlayer> {
    roster.iter().filter(|p| p.is_flagged()).cloned().collect()
}
