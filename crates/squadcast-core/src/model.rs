// Domain model for one pipeline invocation: players, teams, fixtures, the
// manager's squad and the aggregated bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder shown wherever a team id does not resolve.
pub const UNKNOWN_TEAM: &str = "?";

// ---------------------------------------------------------------------------
// Closed enumerations
// ---------------------------------------------------------------------------

/// Playing position. Declaration order is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    /// Map the upstream `element_type` (1=GK, 2=DEF, 3=MID, 4=FWD).
    pub fn from_element_type(element_type: u8) -> Option<Self> {
        match element_type {
            1 => Some(Position::Goalkeeper),
            2 => Some(Position::Defender),
            3 => Some(Position::Midfielder),
            4 => Some(Position::Forward),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Player availability, keyed by the upstream single-letter status code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Availability {
    Available,
    Doubtful,
    Injured,
    Unavailable,
    Suspended,
    NotInSquad,
    /// A code this build does not know yet.
    Other(String),
}

impl Availability {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "a" | "" => Availability::Available,
            "d" => Availability::Doubtful,
            "i" => Availability::Injured,
            "u" => Availability::Unavailable,
            "s" => Availability::Suspended,
            "n" => Availability::NotInSquad,
            other => Availability::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Availability::Available => "a",
            Availability::Doubtful => "d",
            Availability::Injured => "i",
            Availability::Unavailable => "u",
            Availability::Suspended => "s",
            Availability::NotInSquad => "n",
            Availability::Other(code) => code,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

impl From<String> for Availability {
    fn from(s: String) -> Self {
        Availability::from_code(&s)
    }
}

impl From<Availability> for String {
    fn from(a: Availability) -> Self {
        a.code().to_string()
    }
}

/// A special chip, keyed by its upstream name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChipKind {
    Wildcard,
    FreeHit,
    BenchBoost,
    TripleCaptain,
    AssistantManager,
    Other(String),
}

impl ChipKind {
    /// Chips subject to the once-per-half availability rule.
    pub const RESETTABLE: [ChipKind; 4] = [
        ChipKind::Wildcard,
        ChipKind::FreeHit,
        ChipKind::BenchBoost,
        ChipKind::TripleCaptain,
    ];

    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "wildcard" => ChipKind::Wildcard,
            "freehit" => ChipKind::FreeHit,
            "bboost" => ChipKind::BenchBoost,
            "3xc" => ChipKind::TripleCaptain,
            "manager" => ChipKind::AssistantManager,
            other => ChipKind::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ChipKind::Wildcard => "wildcard",
            ChipKind::FreeHit => "freehit",
            ChipKind::BenchBoost => "bboost",
            ChipKind::TripleCaptain => "3xc",
            ChipKind::AssistantManager => "manager",
            ChipKind::Other(name) => name,
        }
    }
}

impl From<String> for ChipKind {
    fn from(s: String) -> Self {
        ChipKind::from_name(&s)
    }
}

impl From<ChipKind> for String {
    fn from(c: ChipKind) -> Self {
        c.name().to_string()
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// Season-to-date expected and ICT metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedMetrics {
    pub xg: f64,
    pub xa: f64,
    pub xgi: f64,
    pub xgc: f64,
    pub xg_per90: f64,
    pub xa_per90: f64,
    pub xgi_per90: f64,
    pub xgc_per90: f64,
    pub influence: f64,
    pub creativity: f64,
    pub threat: f64,
    pub ict_index: f64,
}

/// Price movement and transfer activity for the current round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTrend {
    /// Price change this round, in £m.
    pub change: f64,
    pub transfers_in: u64,
    pub transfers_out: u64,
    pub ownership_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub team_id: u32,
    pub position: Position,
    /// Current price in £m.
    pub price: f64,
    pub total_points: i32,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub form: f64,
    pub points_per_game: f64,
    pub expected_points: f64,
    pub status: Availability,
    pub news: String,
    /// 0–100, `None` when upstream has no estimate.
    pub chance_of_playing: Option<u8>,
    pub starts: u32,
    pub advanced: AdvancedMetrics,
    pub price_trend: PriceTrend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: u32,
    pub short_name: String,
    pub name: String,
    /// Strength rating used as a fixture difficulty proxy.
    pub strength: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub id: u32,
    /// `None` for postponed fixtures awaiting a new date.
    pub gameweek: Option<u32>,
    pub home_team: u32,
    pub away_team: u32,
    pub kickoff: Option<DateTime<Utc>>,
}

/// One entry of the season schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct GameweekInfo {
    pub id: u32,
    pub finished: bool,
    pub is_current: bool,
    pub is_next: bool,
    pub deadline: Option<DateTime<Utc>>,
}

/// Global reference tables from one bootstrap fetch.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub players: Vec<Player>,
    pub teams: Vec<Team>,
    pub schedule: Vec<GameweekInfo>,
}

// ---------------------------------------------------------------------------
// Manager data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub player_id: u32,
    /// Squad slot 1..=15; 1–11 start, 12–15 bench.
    pub slot: u8,
    pub multiplier: u8,
    pub is_captain: bool,
    pub is_vice_captain: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerProfile {
    pub name: String,
    pub overall_rank: Option<u64>,
    pub active_chip: Option<ChipKind>,
    /// Squad value at the last deadline, £m.
    pub squad_value: f64,
    /// Cash in the bank at the last deadline, £m.
    pub bank: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChipUsage {
    pub chip: ChipKind,
    pub gameweek: u32,
}

/// Profile, picks and chip history for one manager.
#[derive(Debug, Clone)]
pub struct ManagerSnapshot {
    pub profile: ManagerProfile,
    pub roster: Vec<RosterEntry>,
    pub chips_used: Vec<ChipUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameweekPoints {
    pub gameweek: u32,
    pub points: i32,
    pub minutes: u32,
}

// ---------------------------------------------------------------------------
// AnalysisBundle
// ---------------------------------------------------------------------------

/// Everything fetched for one manager. Built once per request, read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct AnalysisBundle {
    pub manager_id: u64,
    pub current_gameweek: u32,
    pub next_gameweek: u32,
    pub players: Vec<Player>,
    pub teams: Vec<Team>,
    pub profile: ManagerProfile,
    pub roster: Vec<RosterEntry>,
    pub chips_used: Vec<ChipUsage>,
    /// Fixtures for the lookahead window, in fetch order.
    pub fixtures: Vec<Fixture>,
    /// Chronological (oldest first) recent points per roster player.
    pub recent_history: BTreeMap<u32, Vec<GameweekPoints>>,
    /// Roster players whose history fetch failed and resolved to empty.
    pub history_gaps: Vec<u32>,
}

impl AnalysisBundle {
    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    /// Short name for a team id, or [`UNKNOWN_TEAM`].
    pub fn team_code(&self, id: u32) -> &str {
        self.team(id).map(|t| t.short_name.as_str()).unwrap_or(UNKNOWN_TEAM)
    }
}
