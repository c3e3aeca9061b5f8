// Raw serde structs for the Fantasy Premier League API documents, and their
// conversion into the domain model.
//
// Upstream encodes many decimals as strings ("5.2"), so those fields go
// through `lenient_f64`. Unknown fields are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::model::{
    AdvancedMetrics, Availability, ChipKind, ChipUsage, Fixture, GameweekInfo, GameweekPoints,
    ManagerProfile, Player, Position, PriceTrend, ReferenceData, RosterEntry, Team,
};

/// Accept a number, a numeric string, or null. Anything unparsable is 0.0.
pub(crate) fn lenient_f64<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn parse_timestamp(s: Option<&str>) -> Option<DateTime<Utc>> {
    let s = s?;
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn default_strength() -> u8 {
    3
}

fn default_status() -> String {
    "a".to_string()
}

/// Upstream money values are tenths of £1m.
fn tenths_to_millions(v: i64) -> f64 {
    v as f64 / 10.0
}

// ---------------------------------------------------------------------------
// bootstrap-static/
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RawBootstrap {
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub teams: Vec<RawTeam>,
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
pub struct RawEvent {
    pub id: u32,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub is_next: bool,
    #[serde(default)]
    pub deadline_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawTeam {
    pub id: u32,
    pub short_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_strength")]
    pub strength: u8,
}

#[derive(Debug, Deserialize)]
pub struct RawElement {
    pub id: u32,
    pub web_name: String,
    pub team: u32,
    pub element_type: u8,
    #[serde(default)]
    pub now_cost: i64,
    #[serde(default)]
    pub total_points: i32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub goals_scored: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub form: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub points_per_game: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ep_next: f64,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub news: String,
    #[serde(default)]
    pub chance_of_playing_next_round: Option<u8>,
    #[serde(default)]
    pub starts: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_goals: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_assists: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_goal_involvements: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_goals_conceded: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_goals_per_90: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_assists_per_90: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_goal_involvements_per_90: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub expected_goals_conceded_per_90: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub influence: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub creativity: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub threat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ict_index: f64,
    #[serde(default)]
    pub cost_change_event: i64,
    #[serde(default)]
    pub transfers_in_event: u64,
    #[serde(default)]
    pub transfers_out_event: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub selected_by_percent: f64,
}

impl RawElement {
    /// `None` for element types outside the four playing positions.
    pub fn into_player(self) -> Option<Player> {
        let Some(position) = Position::from_element_type(self.element_type) else {
            debug!(
                id = self.id,
                element_type = self.element_type,
                "skipping element with non-playing element_type"
            );
            return None;
        };
        Some(Player {
            id: self.id,
            name: self.web_name,
            team_id: self.team,
            position,
            price: tenths_to_millions(self.now_cost),
            total_points: self.total_points,
            minutes: self.minutes,
            goals: self.goals_scored,
            assists: self.assists,
            form: self.form,
            points_per_game: self.points_per_game,
            expected_points: self.ep_next,
            status: Availability::from_code(&self.status),
            news: self.news,
            chance_of_playing: self.chance_of_playing_next_round.map(|c| c.min(100)),
            starts: self.starts,
            advanced: AdvancedMetrics {
                xg: self.expected_goals,
                xa: self.expected_assists,
                xgi: self.expected_goal_involvements,
                xgc: self.expected_goals_conceded,
                xg_per90: self.expected_goals_per_90,
                xa_per90: self.expected_assists_per_90,
                xgi_per90: self.expected_goal_involvements_per_90,
                xgc_per90: self.expected_goals_conceded_per_90,
                influence: self.influence,
                creativity: self.creativity,
                threat: self.threat,
                ict_index: self.ict_index,
            },
            price_trend: PriceTrend {
                change: tenths_to_millions(self.cost_change_event),
                transfers_in: self.transfers_in_event,
                transfers_out: self.transfers_out_event,
                ownership_pct: self.selected_by_percent,
            },
        })
    }
}

impl RawBootstrap {
    pub fn into_reference(self) -> ReferenceData {
        let schedule = self
            .events
            .into_iter()
            .map(|e| GameweekInfo {
                id: e.id,
                finished: e.finished,
                is_current: e.is_current,
                is_next: e.is_next,
                deadline: parse_timestamp(e.deadline_time.as_deref()),
            })
            .collect();
        let teams = self
            .teams
            .into_iter()
            .map(|t| Team {
                id: t.id,
                short_name: t.short_name,
                name: t.name,
                strength: t.strength,
            })
            .collect();
        let players = self
            .elements
            .into_iter()
            .filter_map(RawElement::into_player)
            .collect();
        ReferenceData {
            players,
            teams,
            schedule,
        }
    }
}

// ---------------------------------------------------------------------------
// fixtures/?event={gw}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RawFixture {
    pub id: u32,
    #[serde(default)]
    pub event: Option<u32>,
    pub team_h: u32,
    pub team_a: u32,
    #[serde(default)]
    pub kickoff_time: Option<String>,
}

impl From<RawFixture> for Fixture {
    fn from(f: RawFixture) -> Self {
        Fixture {
            id: f.id,
            gameweek: f.event,
            home_team: f.team_h,
            away_team: f.team_a,
            kickoff: parse_timestamp(f.kickoff_time.as_deref()),
        }
    }
}

// ---------------------------------------------------------------------------
// entry/{id}/, entry/{id}/history/, entry/{id}/event/{gw}/picks/
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RawEntry {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "rank")]
    pub summary_overall_rank: Option<u64>,
    #[serde(default)]
    pub last_deadline_bank: Option<i64>,
    #[serde(default)]
    pub last_deadline_value: Option<i64>,
}

impl RawEntry {
    /// Build the profile; the active chip comes from the picks document.
    pub fn into_profile(self, active_chip: Option<&str>) -> ManagerProfile {
        ManagerProfile {
            name: self.name,
            overall_rank: self.summary_overall_rank,
            active_chip: active_chip
                .filter(|c| !c.is_empty())
                .map(ChipKind::from_name),
            squad_value: tenths_to_millions(self.last_deadline_value.unwrap_or(1000)),
            bank: tenths_to_millions(self.last_deadline_bank.unwrap_or(0)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawEntryHistory {
    #[serde(default)]
    pub chips: Vec<RawChip>,
}

#[derive(Debug, Deserialize)]
pub struct RawChip {
    pub name: String,
    pub event: u32,
}

impl RawEntryHistory {
    pub fn into_chip_usage(self) -> Vec<ChipUsage> {
        self.chips
            .into_iter()
            .map(|c| ChipUsage {
                chip: ChipKind::from_name(&c.name),
                gameweek: c.event,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct RawPicks {
    #[serde(default)]
    pub active_chip: Option<String>,
    #[serde(default)]
    pub picks: Vec<RawPick>,
}

#[derive(Debug, Deserialize)]
pub struct RawPick {
    pub element: u32,
    #[serde(default)]
    pub position: u8,
    #[serde(default)]
    pub multiplier: u8,
    #[serde(default)]
    pub is_captain: bool,
    #[serde(default)]
    pub is_vice_captain: bool,
}

impl From<RawPick> for RosterEntry {
    fn from(p: RawPick) -> Self {
        RosterEntry {
            player_id: p.element,
            slot: p.position,
            multiplier: p.multiplier,
            is_captain: p.is_captain,
            is_vice_captain: p.is_vice_captain,
        }
    }
}

// ---------------------------------------------------------------------------
// element-summary/{id}/
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RawElementSummary {
    #[serde(default)]
    pub history: Vec<RawElementHistory>,
}

#[derive(Debug, Deserialize)]
pub struct RawElementHistory {
    pub round: u32,
    #[serde(default)]
    pub total_points: i32,
    #[serde(default)]
    pub minutes: u32,
}

impl RawElementSummary {
    /// The last `window` entries, chronological.
    pub fn into_recent(self, window: usize) -> Vec<GameweekPoints> {
        let skip = self.history.len().saturating_sub(window);
        self.history
            .into_iter()
            .skip(skip)
            .map(|h| GameweekPoints {
                gameweek: h.round,
                points: h.total_points,
                minutes: h.minutes,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_parses_string_decimals_and_skips_unknown_fields() {
        let json = r#"{
            "id": 7, "web_name": "Saka", "team": 1, "team_code": 3, "element_type": 3,
            "now_cost": 102, "total_points": 88, "minutes": 900, "goals_scored": 5,
            "assists": 6, "form": "7.4", "points_per_game": "6.3", "ep_next": "6.8",
            "status": "d", "news": "Knock - 75% chance of playing",
            "chance_of_playing_next_round": 75, "starts": 10,
            "expected_goals": "4.12", "expected_goal_involvements_per_90": 0.71,
            "ict_index": "120.5", "cost_change_event": -1, "selected_by_percent": "31.2",
            "squad_number": null
        }"#;
        let raw: RawElement = serde_json::from_str(json).unwrap();
        let p = raw.into_player().expect("midfielder should convert");
        assert_eq!(p.name, "Saka");
        assert_eq!(p.position, Position::Midfielder);
        assert!((p.price - 10.2).abs() < 1e-9);
        assert!((p.form - 7.4).abs() < 1e-9);
        assert_eq!(p.status, Availability::Doubtful);
        assert_eq!(p.chance_of_playing, Some(75));
        assert!((p.advanced.xg - 4.12).abs() < 1e-9);
        assert!((p.advanced.xgi_per90 - 0.71).abs() < 1e-9);
        assert!((p.price_trend.change + 0.1).abs() < 1e-9);
        assert!((p.price_trend.ownership_pct - 31.2).abs() < 1e-9);
    }

    #[test]
    fn garbage_decimal_becomes_zero() {
        let json = r#"{"id":1,"web_name":"X","team":1,"element_type":2,"form":"n/a","points_per_game":null}"#;
        let p = serde_json::from_str::<RawElement>(json)
            .unwrap()
            .into_player()
            .unwrap();
        assert_eq!(p.form, 0.0);
        assert_eq!(p.points_per_game, 0.0);
        assert_eq!(p.status, Availability::Available);
        assert_eq!(p.chance_of_playing, None);
    }

    #[test]
    fn non_playing_element_type_is_dropped() {
        let json = r#"{"id":900,"web_name":"Boss","team":1,"element_type":5}"#;
        let raw: RawElement = serde_json::from_str(json).unwrap();
        assert!(raw.into_player().is_none());
    }

    #[test]
    fn postponed_fixture_keeps_missing_gameweek() {
        let json = r#"{"id":3,"event":null,"team_h":1,"team_a":2,"kickoff_time":null}"#;
        let f: Fixture = serde_json::from_str::<RawFixture>(json).unwrap().into();
        assert_eq!(f.gameweek, None);
        assert_eq!(f.kickoff, None);

        let json = r#"{"id":4,"event":12,"team_h":1,"team_a":2,"kickoff_time":"2025-11-22T15:00:00Z"}"#;
        let f: Fixture = serde_json::from_str::<RawFixture>(json).unwrap().into();
        assert_eq!(f.gameweek, Some(12));
        assert!(f.kickoff.is_some());
    }

    #[test]
    fn recent_history_keeps_last_window_in_order() {
        let json = r#"{"history":[
            {"round":1,"total_points":2},{"round":2,"total_points":6},
            {"round":3,"total_points":1},{"round":4,"total_points":9},
            {"round":5,"total_points":3},{"round":6,"total_points":12}
        ]}"#;
        let summary: RawElementSummary = serde_json::from_str(json).unwrap();
        let recent = summary.into_recent(5);
        let rounds: Vec<u32> = recent.iter().map(|g| g.gameweek).collect();
        assert_eq!(rounds, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn entry_profile_converts_money_and_chip() {
        let json = r#"{"id":6589598,"name":"Bahur Utd","summary_overall_rank":120345,
                       "last_deadline_bank":15,"last_deadline_value":1024}"#;
        let entry: RawEntry = serde_json::from_str(json).unwrap();
        let profile = entry.into_profile(Some("bboost"));
        assert_eq!(profile.overall_rank, Some(120345));
        assert!((profile.bank - 1.5).abs() < 1e-9);
        assert!((profile.squad_value - 102.4).abs() < 1e-9);
        assert_eq!(profile.active_chip, Some(ChipKind::BenchBoost));
    }
}
