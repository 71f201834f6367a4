//! Progression curve - experience to level mapping
//!
//! Levels follow a square-root curve: reaching level `n + 1` takes
//! `100 * n²` total experience.
//!
//! ```text
//! level 1 ── 0 XP
//! level 2 ── 100 XP
//! level 3 ── 400 XP
//! level 4 ── 900 XP
//! ...
//! level 500 ── 24_900_100 XP (cap)
//! ```

use serde::Serialize;

/// Highest reachable level
pub const MAX_LEVEL: u32 = 500;

/// Experience scale of the curve
const CURVE_SCALE: u64 = 100;

/// Level for a total experience value, clamped to [`MAX_LEVEL`]
pub fn level(exp: u64) -> u32 {
    let raw = isqrt(exp / CURVE_SCALE).saturating_add(1);
    raw.min(MAX_LEVEL as u64) as u32
}

/// Total experience required to reach `level + 1`
///
/// `None` at the cap: there is no next level to fill towards.
/// Level 0 yields 0, the base of level 1.
pub fn exp_threshold(level: u32) -> Option<u64> {
    if level >= MAX_LEVEL {
        return None;
    }
    let l = level as u64;
    Some(CURVE_SCALE * l * l)
}

/// Where a user stands inside their current level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u32,
    /// Experience earned since the start of this level
    pub exp_into_level: u64,
    /// Experience spanned by this level, `None` at the cap
    pub level_span: Option<u64>,
    /// Fill of the progress bar in `[0.0, 1.0]`
    pub fraction: f64,
}

impl LevelProgress {
    pub fn for_exp(exp: u64) -> Self {
        let level = level(exp);
        let base = exp_threshold(level - 1).unwrap_or(0);
        let exp_into_level = exp.saturating_sub(base);

        match exp_threshold(level) {
            Some(next) => {
                let span = next - base;
                let fraction = (exp_into_level as f64 / span as f64).clamp(0.0, 1.0);
                Self {
                    level,
                    exp_into_level,
                    level_span: Some(span),
                    fraction,
                }
            }
            None => Self {
                level,
                exp_into_level,
                level_span: None,
                fraction: 1.0,
            },
        }
    }
}

/// Largest `r` with `r * r <= n`
fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    // f64 estimate is within one of the answer for all u64; correct it.
    let mut r = (n as f64).sqrt() as u64;
    while r.checked_mul(r).map_or(true, |sq| sq > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).map_or(false, |sq| sq <= n) {
        r += 1;
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_starts_at_one() {
        assert_eq!(level(0), 1);
        assert_eq!(level(99), 1);
        assert_eq!(level(100), 2);
        assert_eq!(level(399), 2);
        assert_eq!(level(400), 3);
    }

    #[test]
    fn test_level_scenario_values() {
        assert_eq!(level(50), 1);
        assert_eq!(level(110), 2);
    }

    #[test]
    fn test_level_non_decreasing() {
        let mut previous = level(0);
        for exp in (0..200_000u64).step_by(37) {
            let current = level(exp);
            assert!(current >= previous, "level dropped at {exp}");
            previous = current;
        }
    }

    #[test]
    fn test_level_capped() {
        assert_eq!(level(24_900_099), 499);
        assert_eq!(level(24_900_100), MAX_LEVEL);
        assert_eq!(level(u64::MAX), MAX_LEVEL);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(exp_threshold(0), Some(0));
        assert_eq!(exp_threshold(1), Some(100));
        assert_eq!(exp_threshold(2), Some(400));
        assert_eq!(exp_threshold(499), Some(24_900_100));
        assert_eq!(exp_threshold(MAX_LEVEL), None);
    }

    #[test]
    fn test_level_progress_first_level() {
        let p = LevelProgress::for_exp(50);
        assert_eq!(p.level, 1);
        assert_eq!(p.exp_into_level, 50);
        assert_eq!(p.level_span, Some(100));
        assert!((p.fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_progress_mid_curve() {
        // level 2 spans 100..400
        let p = LevelProgress::for_exp(250);
        assert_eq!(p.level, 2);
        assert_eq!(p.exp_into_level, 150);
        assert_eq!(p.level_span, Some(300));
        assert!((p.fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_progress_at_cap() {
        let p = LevelProgress::for_exp(30_000_000);
        assert_eq!(p.level, MAX_LEVEL);
        assert_eq!(p.level_span, None);
        assert_eq!(p.fraction, 1.0);
    }

    #[test]
    fn test_isqrt_exact() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(u64::MAX), 4_294_967_295);
    }
}
