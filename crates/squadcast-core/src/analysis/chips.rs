// Chip availability with the mid-season reset.

use crate::model::{ChipKind, ChipUsage};

/// Resettable chips still available for `target_gw`.
///
/// Before `reset_gw` a chip is available only if it was never used. From
/// `reset_gw` on, a chip is available unless it was used at or after
/// `reset_gw`.
pub fn available_chips(used: &[ChipUsage], target_gw: u32, reset_gw: u32) -> Vec<ChipKind> {
    ChipKind::RESETTABLE
        .iter()
        .filter(|&chip| {
            let mut uses = used.iter().filter(|u| u.chip == *chip);
            if target_gw < reset_gw {
                uses.next().is_none()
            } else {
                !uses.any(|u| u.gameweek >= reset_gw)
            }
        })
        .cloned()
        .collect()
}
