// Fixture-derived views: per-team lookahead, double gameweeks by round and by
// calendar week, and blank gameweeks.
//
// Postponed fixtures (no gameweek) never reach any of these views.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AnalysisBundle, Fixture, UNKNOWN_TEAM};

/// Difficulty used when the opponent is not in the team table.
const DEFAULT_DIFFICULTY: u8 = 3;

/// One upcoming fixture from a team's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureOutlook {
    pub gw: u32,
    pub opp: String,
    pub home: bool,
    /// Opponent strength, 1 = easiest, 5 = hardest.
    pub diff: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleGameweek {
    pub team: String,
    pub gameweek: u32,
    pub fixtures: usize,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoublePriority {
    /// The week holding the team's very next fixture.
    Immediate,
    Future,
}

/// More than one fixture for a team inside one ISO calendar week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDouble {
    pub team: String,
    pub iso_year: i32,
    pub iso_week: u32,
    pub fixtures: usize,
    pub gameweeks: Vec<u32>,
    pub priority: DoublePriority,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankGameweek {
    pub gameweek: u32,
    pub teams: Vec<String>,
}

fn scheduled(fixtures: &[Fixture]) -> impl Iterator<Item = (&Fixture, u32)> {
    fixtures
        .iter()
        .filter_map(|f| f.gameweek.map(|gw| (f, gw)))
}

fn difficulty(bundle: &AnalysisBundle, opponent: u32) -> u8 {
    bundle
        .team(opponent)
        .map(|t| t.strength.clamp(1, 5))
        .unwrap_or(DEFAULT_DIFFICULTY)
}

/// Up to `lookahead` fixtures per team, in fetch order, keyed by short name.
///
/// A single pass appends to both sides' buckets. Teams missing from the team
/// table get no bucket of their own; as opponents they show as `?`.
pub fn fixtures_by_team(
    bundle: &AnalysisBundle,
    lookahead: usize,
) -> BTreeMap<String, Vec<FixtureOutlook>> {
    let mut buckets: BTreeMap<u32, Vec<FixtureOutlook>> = BTreeMap::new();

    for (fixture, gw) in scheduled(&bundle.fixtures) {
        let sides = [
            (fixture.home_team, fixture.away_team, true),
            (fixture.away_team, fixture.home_team, false),
        ];
        for (team, opponent, home) in sides {
            let bucket = buckets.entry(team).or_default();
            if bucket.len() < lookahead {
                bucket.push(FixtureOutlook {
                    gw,
                    opp: bundle.team_code(opponent).to_string(),
                    home,
                    diff: difficulty(bundle, opponent),
                });
            }
        }
    }

    buckets
        .into_iter()
        .filter_map(|(id, fixtures)| bundle.team(id).map(|t| (t.short_name.clone(), fixtures)))
        .collect()
}

/// Scheduled fixtures grouped per known team, in fetch order.
fn per_team<'a>(bundle: &'a AnalysisBundle) -> BTreeMap<String, Vec<(&'a Fixture, u32)>> {
    let mut out: BTreeMap<String, Vec<(&Fixture, u32)>> = BTreeMap::new();
    for (fixture, gw) in scheduled(&bundle.fixtures) {
        for team in [fixture.home_team, fixture.away_team] {
            let code = bundle.team_code(team);
            if code == UNKNOWN_TEAM {
                continue;
            }
            out.entry(code.to_string()).or_default().push((fixture, gw));
        }
    }
    out
}

/// Teams with more than one fixture in the same gameweek.
pub fn detect_doubles(bundle: &AnalysisBundle) -> Vec<DoubleGameweek> {
    let mut doubles = Vec::new();
    for (team, fixtures) in per_team(bundle) {
        let mut by_gw: BTreeMap<u32, usize> = BTreeMap::new();
        for (_, gw) in &fixtures {
            *by_gw.entry(*gw).or_default() += 1;
        }
        for (gw, count) in by_gw.into_iter().filter(|(_, c)| *c > 1) {
            doubles.push(DoubleGameweek {
                note: format!("{team} play {count} times in GW{gw}"),
                team: team.clone(),
                gameweek: gw,
                fixtures: count,
            });
        }
    }
    doubles
}

/// Teams with more than one fixture in the same ISO calendar week,
/// independent of gameweek numbering. Fixtures without a kickoff are ignored.
pub fn detect_calendar_doubles(bundle: &AnalysisBundle) -> Vec<CalendarDouble> {
    let mut doubles = Vec::new();
    for (team, fixtures) in per_team(bundle) {
        let dated: Vec<(&Fixture, u32)> = fixtures
            .into_iter()
            .filter(|(f, _)| f.kickoff.is_some())
            .collect();
        let Some(first_week) = dated
            .iter()
            .filter_map(|(f, _)| f.kickoff)
            .min()
            .map(|k| (k.iso_week().year(), k.iso_week().week()))
        else {
            continue;
        };

        let mut by_week: BTreeMap<(i32, u32), Vec<u32>> = BTreeMap::new();
        for (f, gw) in &dated {
            if let Some(k) = f.kickoff {
                let week = k.iso_week();
                by_week.entry((week.year(), week.week())).or_default().push(*gw);
            }
        }

        for ((year, week), gws) in by_week.into_iter().filter(|(_, g)| g.len() > 1) {
            let priority = if (year, week) == first_week {
                DoublePriority::Immediate
            } else {
                DoublePriority::Future
            };
            let distinct: BTreeSet<u32> = gws.iter().copied().collect();
            let gameweeks: Vec<u32> = distinct.into_iter().collect();
            let span = gameweeks
                .iter()
                .map(|g| format!("GW{g}"))
                .collect::<Vec<_>>()
                .join("/");
            doubles.push(CalendarDouble {
                note: format!(
                    "{team} play {} times in week {week} of {year} ({span})",
                    gws.len()
                ),
                team: team.clone(),
                iso_year: year,
                iso_week: week,
                fixtures: gws.len(),
                gameweeks,
                priority,
            });
        }
    }
    // Immediate first, then chronological.
    doubles.sort_by_key(|d| (d.priority != DoublePriority::Immediate, d.iso_year, d.iso_week));
    doubles
}

/// For each gameweek present in the fixture window, known teams with no
/// fixture in it. Gameweeks where every team plays are omitted.
pub fn detect_blanks(bundle: &AnalysisBundle) -> Vec<BlankGameweek> {
    let mut playing: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for (fixture, gw) in scheduled(&bundle.fixtures) {
        let teams = playing.entry(gw).or_default();
        teams.insert(fixture.home_team);
        teams.insert(fixture.away_team);
    }

    playing
        .into_iter()
        .filter_map(|(gw, teams)| {
            let idle: Vec<String> = bundle
                .teams
                .iter()
                .filter(|t| !teams.contains(&t.id))
                .map(|t| t.short_name.clone())
                .collect();
            (!idle.is_empty()).then_some(BlankGameweek {
                gameweek: gw,
                teams: idle,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{bundle_with, team};
    use chrono::{TimeZone, Utc};

    fn fx(id: u32, gw: Option<u32>, home: u32, away: u32) -> Fixture {
        Fixture {
            id,
            gameweek: gw,
            home_team: home,
            away_team: away,
            kickoff: None,
        }
    }

    fn dated(id: u32, gw: u32, home: u32, away: u32, y: i32, m: u32, d: u32) -> Fixture {
        Fixture {
            kickoff: Some(Utc.with_ymd_and_hms(y, m, d, 15, 0, 0).unwrap()),
            ..fx(id, Some(gw), home, away)
        }
    }

    fn three_team_bundle(fixtures: Vec<Fixture>) -> AnalysisBundle {
        let mut bundle = bundle_with(vec![], vec![]);
        bundle.teams = vec![team(1, "AAA", 4), team(2, "BBB", 2), team(3, "CCC", 5)];
        bundle.fixtures = fixtures;
        bundle
    }

    #[test]
    fn lookahead_is_capped_and_skips_postponed() {
        let mut fixtures: Vec<Fixture> = (0..7).map(|i| fx(i, Some(10 + i), 1, 2)).collect();
        fixtures.insert(2, fx(99, None, 1, 3));
        let bundle = three_team_bundle(fixtures);

        let view = fixtures_by_team(&bundle, 5);
        let aaa = &view["AAA"];
        assert_eq!(aaa.len(), 5);
        assert!(aaa.iter().all(|f| f.opp == "BBB" && f.home));
        let gws: Vec<u32> = aaa.iter().map(|f| f.gw).collect();
        assert_eq!(gws, vec![10, 11, 12, 13, 14]);
        assert_eq!(aaa[0].diff, 2);
        assert_eq!(view["BBB"][0].diff, 4);
        assert!(!view["BBB"][0].home);
        // CCC only appears in the postponed fixture.
        assert!(!view.contains_key("CCC"));
    }

    #[test]
    fn unknown_opponent_shows_placeholder() {
        let bundle = three_team_bundle(vec![fx(1, Some(5), 1, 42)]);
        let view = fixtures_by_team(&bundle, 5);
        assert_eq!(view["AAA"][0].opp, UNKNOWN_TEAM);
        assert_eq!(view["AAA"][0].diff, DEFAULT_DIFFICULTY);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn double_gameweek_flags_only_the_team_playing_twice() {
        let bundle = three_team_bundle(vec![fx(1, Some(5), 1, 2), fx(2, Some(5), 1, 3)]);
        let doubles = detect_doubles(&bundle);
        assert_eq!(doubles.len(), 1);
        assert_eq!(doubles[0].team, "AAA");
        assert_eq!(doubles[0].gameweek, 5);
        assert_eq!(doubles[0].fixtures, 2);
        assert_eq!(doubles[0].note, "AAA play 2 times in GW5");
    }

    #[test]
    fn postponed_fixtures_do_not_create_doubles() {
        let bundle = three_team_bundle(vec![fx(1, Some(5), 1, 2), fx(2, None, 1, 3)]);
        assert!(detect_doubles(&bundle).is_empty());
    }

    #[test]
    fn calendar_double_spans_gameweek_ids() {
        // Sat 2025-12-06 (GW15) and Wed 2025-12-03 (GW14) share ISO week 49.
        let bundle = three_team_bundle(vec![
            dated(1, 14, 1, 2, 2025, 12, 3),
            dated(2, 15, 3, 1, 2025, 12, 6),
            dated(3, 16, 2, 3, 2025, 12, 13),
            dated(4, 17, 2, 1, 2025, 12, 20),
            dated(5, 17, 3, 2, 2025, 12, 17),
        ]);
        let doubles = detect_calendar_doubles(&bundle);

        let aaa: Vec<&CalendarDouble> = doubles.iter().filter(|d| d.team == "AAA").collect();
        assert_eq!(aaa.len(), 1);
        assert_eq!(aaa[0].iso_week, 49);
        assert_eq!(aaa[0].gameweeks, vec![14, 15]);
        assert_eq!(aaa[0].priority, DoublePriority::Immediate);

        // BBB: first fixture in week 49, double in week 51.
        let bbb: Vec<&CalendarDouble> = doubles.iter().filter(|d| d.team == "BBB").collect();
        assert_eq!(bbb.len(), 1);
        assert_eq!(bbb[0].iso_week, 51);
        assert_eq!(bbb[0].priority, DoublePriority::Future);

        // Immediate entries sort first.
        assert_eq!(doubles[0].priority, DoublePriority::Immediate);
    }

    #[test]
    fn blanks_list_idle_teams() {
        let mut bundle = three_team_bundle(vec![
            fx(1, Some(5), 1, 2),
            fx(2, Some(6), 1, 2),
            fx(3, Some(6), 3, 1),
        ]);
        bundle.teams.push(team(4, "DDD", 3));
        let blanks = detect_blanks(&bundle);
        assert_eq!(
            blanks,
            vec![
                BlankGameweek {
                    gameweek: 5,
                    teams: vec!["CCC".into(), "DDD".into()],
                },
                BlankGameweek {
                    gameweek: 6,
                    teams: vec!["DDD".into()],
                },
            ]
        );
    }
}
