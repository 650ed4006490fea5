//! Pure functions computing the next-reconcile delay from lease/expiry/percent,
//! with jitter and floors. No I/O, no module-level RNG: every function that
//! needs randomness takes a `&mut impl Rng` so call sites own the generator
//! and tests can seed it deterministically.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

use crate::config::HorizonConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseDurationError {
    #[error("invalid value \"{value}\" for {path}, below the minimum allowed value {min}")]
    BelowMinimum {
        value: String,
        path: String,
        min: String,
    },
    #[error("invalid value \"{value}\" for {path}")]
    Unparseable { value: String, path: String },
}

fn clamp_percent(percent: f64, cap: f64) -> f64 {
    percent.max(0.0).min(cap)
}

/// Uniform random duration in `[0, span]`. `Duration` has no `SampleUniform`
/// impl, so sampling goes through `f64` seconds.
fn uniform_up_to(span: Duration, rng: &mut impl Rng) -> Duration {
    if span.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rng.gen_range(0.0..=span.as_secs_f64()))
}

/// `lease × clamp(percent, 0, cap) / 100`.
pub fn compute_start_renewing_at(lease: Duration, percent: f64, cfg: &HorizonConfig) -> Duration {
    let clamped = clamp_percent(percent, cfg.percent_cap);
    lease.mul_f64(clamped / 100.0)
}

/// Uniform random duration in `[start_renewing_at, start_renewing_at + jitter_span]`,
/// where `jitter_span = lease × (100 − clamp(percent, 0, cap)) / 100 × 0.1`.
/// Clamped to `min_horizon` except when `percent <= 0`, where the floor is zero.
pub fn compute_dynamic_horizon_with_jitter(
    lease: Duration,
    percent: f64,
    cfg: &HorizonConfig,
    rng: &mut impl Rng,
) -> Duration {
    let start = compute_start_renewing_at(lease, percent, cfg);
    let clamped = clamp_percent(percent, cfg.percent_cap);
    let jitter_span = lease.mul_f64((100.0 - clamped) / 100.0 * 0.1);

    let jitter = uniform_up_to(jitter_span, rng);
    let horizon = start + jitter;

    let floor = if percent <= 0.0 {
        Duration::ZERO
    } else {
        cfg.min_horizon
    };
    horizon.max(floor).min(lease)
}

/// `base + uniform(0, base × jitter_fraction)`, floored at `min_horizon`.
pub fn compute_horizon_with_jitter(
    base: Duration,
    jitter_fraction: f64,
    min_horizon: Duration,
    rng: &mut impl Rng,
) -> Duration {
    let span = base.mul_f64(jitter_fraction);
    let jitter = uniform_up_to(span, rng);
    (base + jitter).max(min_horizon)
}

/// Returns `(raw, clamped)` where `clamped` lies in `(0, d]`.
pub fn compute_max_jitter_duration(d: Duration) -> (Duration, Duration) {
    if d.is_zero() {
        return (d, Duration::from_nanos(1));
    }
    (d, d)
}

/// `!t1.Before(t2)`, i.e. `t1 >= t2`.
pub fn is_in_window(t1: DateTime<Utc>, t2: DateTime<Utc>) -> bool {
    t1 >= t2
}

/// Given `now`, an expiration timestamp, and an optional `expiry_offset`
/// duration string, returns `(horizon, in_window)`.
pub fn compute_pki_renewal_window(
    now: DateTime<Utc>,
    expiration: DateTime<Utc>,
    expiry_offset: Option<&str>,
    cfg: &HorizonConfig,
    rng: &mut impl Rng,
) -> (Duration, bool) {
    let offset = expiry_offset
        .and_then(|s| parse_duration_string(s, ".spec.expiryOffset", Duration::ZERO).ok())
        .unwrap_or(Duration::ZERO);

    let offset_chrono = chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::zero());

    if expiration <= now || now + offset_chrono >= expiration {
        let short = compute_horizon_with_jitter(
            Duration::from_millis(1000),
            0.05,
            Duration::from_millis(1),
            rng,
        );
        return (short, true);
    }

    let remaining = (expiration - now - offset_chrono)
        .to_std()
        .unwrap_or(Duration::ZERO);
    let jitter_span = remaining.mul_f64(cfg.jitter_fraction);
    let jitter = uniform_up_to(jitter_span, rng);
    let horizon = remaining.saturating_sub(jitter).max(cfg.min_horizon);
    (horizon, false)
}

/// Parses a duration literal (e.g. `"30s"`), failing below `min` or on parse
/// error with the exact messages the operator's validating webhook expects.
pub fn parse_duration_string(
    s: &str,
    path: &str,
    min: Duration,
) -> Result<Duration, ParseDurationError> {
    let parsed = parse_go_style_duration(s).ok_or_else(|| ParseDurationError::Unparseable {
        value: s.to_string(),
        path: path.to_string(),
    })?;
    if parsed < min {
        return Err(ParseDurationError::BelowMinimum {
            value: s.to_string(),
            path: path.to_string(),
            min: format_duration(min),
        });
    }
    Ok(parsed)
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() > 0 && d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:?}", d)
    }
}

/// Minimal subset of Go's `time.ParseDuration` grammar: a sequence of
/// `<number><unit>` pairs where unit is one of `ns`, `us`, `ms`, `s`, `m`, `h`.
fn parse_go_style_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total = Duration::ZERO;
    let mut chars = s.char_indices().peekable();
    let mut start = 0;
    let mut any = false;
    while let Some(&(idx, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            chars.next();
            continue;
        }
        let num_str = &s[start..idx];
        if num_str.is_empty() {
            return None;
        }
        let value: f64 = num_str.parse().ok()?;
        let unit_start = idx;
        while let Some(&(_, uc)) = chars.peek() {
            if uc.is_ascii_digit() || uc == '.' {
                break;
            }
            chars.next();
        }
        let unit_end = chars.peek().map(|&(i, _)| i).unwrap_or(s.len());
        let unit = &s[unit_start..unit_end];
        let factor: f64 = match unit {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        total += Duration::from_secs_f64(value * factor);
        start = unit_end;
        any = true;
    }
    if !any {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn scenario_1_dynamic_horizon_mid_percent() {
        let cfg = HorizonConfig::default();
        let mut rng = rng();
        for _ in 0..200 {
            let h = compute_dynamic_horizon_with_jitter(
                Duration::from_secs(15),
                50.0,
                &cfg,
                &mut rng,
            );
            assert!(h >= Duration::from_millis(7500), "{h:?}");
            assert!(h <= Duration::from_millis(9000), "{h:?}");
        }
    }

    #[test]
    fn scenario_2_dynamic_horizon_zero_percent() {
        let cfg = HorizonConfig::default();
        let mut rng = rng();
        for _ in 0..200 {
            let h = compute_dynamic_horizon_with_jitter(Duration::from_secs(15), 0.0, &cfg, &mut rng);
            assert!(h <= Duration::from_millis(1500), "{h:?}");
        }
    }

    #[test]
    fn scenario_3_dynamic_horizon_clamped_to_cap() {
        let cfg = HorizonConfig::default();
        let mut rng = rng();
        for _ in 0..200 {
            let h =
                compute_dynamic_horizon_with_jitter(Duration::from_secs(15), 1000.0, &cfg, &mut rng);
            assert!(h >= Duration::from_millis(13500), "{h:?}");
            assert!(h <= Duration::from_millis(15000), "{h:?}");
        }
    }

    #[test]
    fn scenario_4_parse_duration_below_minimum() {
        let err = parse_duration_string("29s", ".spec.foo", Duration::from_secs(30)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value \"29s\" for .spec.foo, below the minimum allowed value 30s"
        );
    }

    #[test]
    fn parse_duration_unparseable() {
        let err = parse_duration_string("nope", ".spec.foo", Duration::ZERO).unwrap_err();
        assert_eq!(err.to_string(), "invalid value \"nope\" for .spec.foo");
    }

    #[test]
    fn start_renewing_at_is_bounded_by_cap() {
        let cfg = HorizonConfig::default();
        let at_cap = compute_start_renewing_at(Duration::from_secs(15), 1000.0, &cfg);
        assert_eq!(at_cap, Duration::from_secs(15).mul_f64(0.9));
        let zero = compute_start_renewing_at(Duration::from_secs(15), -5.0, &cfg);
        assert_eq!(zero, Duration::ZERO);
    }

    #[test]
    fn is_in_window_matches_not_before() {
        let t0 = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let t1 = DateTime::<Utc>::from_timestamp(1, 0).unwrap();
        assert!(is_in_window(t1, t0));
        assert!(is_in_window(t0, t0));
        assert!(!is_in_window(t0, t1));
    }
}
