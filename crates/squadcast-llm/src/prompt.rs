// Prompt rendering: substitutes compact JSON views into an instruction
// template.
//
// The template is plain text with `{{name}}` placeholders. Numbers the model
// needs for its judgements (recent sums, availability, difficulty) are
// precomputed in the views so the model reasons instead of doing arithmetic.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use squadcast_core::analysis::DerivedViews;
use squadcast_core::config::PromptConfig;
use squadcast_core::error::PipelineError;

/// Rendered in place of a view that was not computed or is empty.
pub const NONE_MARKER: &str = "None";

/// Every placeholder the renderer fills.
pub const PLACEHOLDERS: [&str; 12] = [
    "current_gw",
    "next_gw",
    "manager",
    "roster",
    "flagged",
    "fixtures",
    "doubles",
    "calendar_doubles",
    "blanks",
    "chips",
    "top_players",
    "chip_reset_gw",
];

// ---------------------------------------------------------------------------
// Default template
// ---------------------------------------------------------------------------

pub const DEFAULT_TEMPLATE: &str = r#"You are advising a Fantasy Premier League manager on their squad for gameweek {{next_gw}}.

Work only from the data below. Every recommendation must name real players from it, and every
transfer must respect the squad shape (2 GK, 5 DEF, 5 MID, 3 FWD), the bank and the transfer
allowance shown in the manager summary. Each transfer beyond the free allowance costs 4 points.

Reply in Markdown with these sections, in order.

## 1. Availability
Every player in the flagged list: status code, chance of playing, latest news, and an urgency
of Critical (sell now), High (sell if a good option exists), Medium (monitor) or Low (expected to play).

## 2. Squad review
Label each squad player KEEP, UPGRADE or SELL with one line of reasoning. Use the `signals`
numbers to classify form:
- Flop: `last4` <= 8 and `form` < 3.0.
- Rising star: `last3` >= 18, or `form` >= 6.0 with `xgi90` >= 0.5.
- Injury concern: anyone in the flagged list.
A null sum means no recent history was available; do not treat it as zero.

## 3. Replacements
For each position, up to three ranked options from the candidate lists: name, team, price,
price difference against the player they replace, form, and the next fixtures. Flagged
players get replacements first.

## 4. Transfers
Between 0 and 5 moves. For each: player out, player in, net cost, remaining bank. Explain
whether any points hit is worth taking.

## 5. Captaincy
A captain and vice-captain from the final squad, both expected to start, justified by form,
fixtures and minutes.

## 6. Starting XI and bench
A legal formation (3-4-3, 3-5-2, 4-4-2, 4-5-1, 5-3-2 or 5-4-1) listed GK to FWD, with no
flagged player unless nobody else fits. Then the four bench players in order.

## 7. Chips and fixtures
Say whether a chip should be played this week or held. Use the double and blank gameweek
lists: a team playing twice is a Bench Boost or Triple Captain target, a blank is a Free Hit
target. Calendar-week doubles marked `immediate` affect the coming deadline; `future` ones are
for planning. Chips used before gameweek {{chip_reset_gw}} become available again from it.

## 8. Key points
A short bullet list: hot and cold streaks, fixture swings, rotation risk, and weak spots in
the squad.

Be direct. Name players, never generic profiles.

### Data

Current gameweek: {{current_gw}}
Next gameweek: {{next_gw}}
Manager summary: {{manager}}
Squad (pick order, `recent` is most recent first): {{roster}}
Flagged players: {{flagged}}
Fixtures by team (`diff`: 1 easiest to 5 hardest): {{fixtures}}
Double gameweeks: {{doubles}}
Calendar-week doubles: {{calendar_doubles}}
Blank gameweeks: {{blanks}}
Chips available: {{chips}}
Candidates by position: {{top_players}}

Status codes: a available, d doubtful, i injured, u unavailable, s suspended, n not in squad.
"#;

// ---------------------------------------------------------------------------
// Template loading
// ---------------------------------------------------------------------------

/// The configured override template, or [`DEFAULT_TEMPLATE`].
pub fn load_template(config: &PromptConfig) -> Result<String, PipelineError> {
    let Some(path) = config.template_path.as_deref().filter(|p| !p.trim().is_empty()) else {
        return Ok(DEFAULT_TEMPLATE.to_string());
    };
    let text = std::fs::read_to_string(Path::new(path)).map_err(|e| {
        PipelineError::Configuration(format!("cannot read prompt template {path}: {e}"))
    })?;
    let missing: Vec<&str> = PLACEHOLDERS
        .iter()
        .copied()
        .filter(|name| !text.contains(&format!("{{{{{name}}}}}")))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, %path, "Prompt template does not use every view");
    }
    debug!(%path, "Loaded prompt template override");
    Ok(text)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn compact<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(s) => s,
        Err(e) => {
            warn!("view failed to serialize: {}", e);
            NONE_MARKER.to_string()
        }
    }
}

fn optional<T: Serialize>(view: Option<&Vec<T>>) -> String {
    match view {
        Some(items) => compact(items),
        None => NONE_MARKER.to_string(),
    }
}

/// Fill every placeholder in `template` from `views`. Placeholders the
/// template does not contain are skipped; unknown `{{...}}` text is left
/// untouched.
pub fn render_payload(views: &DerivedViews, template: &str, chip_reset_gw: u32) -> String {
    let flagged = if views.flagged.is_empty() {
        NONE_MARKER.to_string()
    } else {
        compact(&views.flagged)
    };

    let values: [(&str, String); 12] = [
        ("current_gw", views.current_gameweek.to_string()),
        ("next_gw", views.next_gameweek.to_string()),
        ("manager", compact(&views.manager)),
        ("roster", compact(&views.roster)),
        ("flagged", flagged),
        ("fixtures", compact(&views.fixtures_by_team)),
        ("doubles", optional(views.doubles.as_ref())),
        ("calendar_doubles", optional(views.calendar_doubles.as_ref())),
        ("blanks", optional(views.blanks.as_ref())),
        ("chips", optional(views.chips_available.as_ref())),
        ("top_players", compact(&views.top_by_position)),
        ("chip_reset_gw", chip_reset_gw.to_string()),
    ];

    let mut out = template.to_string();
    for (name, value) in &values {
        let placeholder = format!("{{{{{name}}}}}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, value);
        }
    }
    out
}

/// Rough token count for logging: one token per four characters.
pub fn estimate_tokens(payload: &str) -> usize {
    payload.chars().count() / 4
}
