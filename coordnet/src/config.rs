// coordnet/src/config.rs
//
// Resolved run configuration for the detection engine. CLI parsing lives in
// main.rs; the engine consumes only the values here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid window spec '{0}': expected <value><unit> with unit s/m/h/d/w, or bare seconds")]
    BadWindowSpec(String),

    #[error("window spec '{0}' must be positive")]
    NonPositiveWindow(String),

    #[error("comparison horizon d1 ({d1}s) cannot exceed retention horizon d2 ({d2}s)")]
    HorizonOrder { d1: i64, d2: i64 },
}

/// Window horizons and bookkeeping flags consumed by the detector.
///
/// `d1` bounds which events may seed a comparison as the earlier member of a
/// pair; `d2` is the full retention span. `d1 == d2` degenerates to adjacent
/// non-overlapping windows; `d1 < d2` yields genuine sliding overlap.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Comparison horizon, seconds.
    pub d1: i64,
    /// Retention horizon, seconds. Must be >= d1.
    pub d2: i64,
    /// Record per-edge lead/match history. Unbounded memory growth — a
    /// deliberate memory/auditability trade-off.
    pub keep_history: bool,
}

impl DetectorConfig {
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.d1 > self.d2 {
            return Err(ConfigError::HorizonOrder { d1: self.d1, d2: self.d2 });
        }
        Ok(self)
    }
}

/// Parse a window duration such as `10s`, `15m`, `2h`, `1d` or `1w`.
/// A bare integer is taken as seconds.
pub fn parse_window_spec(spec: &str) -> Result<i64, ConfigError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ConfigError::BadWindowSpec(spec.to_string()));
    }

    let (value, multiplier) = match spec.chars().last().unwrap() {
        's' | 'S' => (&spec[..spec.len() - 1], 1),
        'm' | 'M' => (&spec[..spec.len() - 1], 60),
        'h' | 'H' => (&spec[..spec.len() - 1], 60 * 60),
        'd' | 'D' => (&spec[..spec.len() - 1], 60 * 60 * 24),
        'w' | 'W' => (&spec[..spec.len() - 1], 60 * 60 * 24 * 7),
        _ => (spec, 1),
    };

    let value: i64 = value
        .parse()
        .map_err(|_| ConfigError::BadWindowSpec(spec.to_string()))?;
    if value <= 0 {
        return Err(ConfigError::NonPositiveWindow(spec.to_string()));
    }
    Ok(value * multiplier)
}
