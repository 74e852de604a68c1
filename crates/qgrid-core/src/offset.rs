//! Exact rational time values, tempo and meter

use num_rational::Ratio;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{QuantizeError, Result};

/// Exact time position: milliseconds in absolute terms, 0..=1 inside a beat
pub type RationalOffset = Ratio<i64>;

/// Exact musical duration in whole notes (1/4 is a quarter note)
pub type Duration = Ratio<i64>;

/// A duration is dyadic when its reduced denominator is a power of two
pub fn is_dyadic(duration: Duration) -> bool {
    let denom = *duration.reduced().denom();
    denom > 0 && (denom & (denom - 1)) == 0
}

// ============================================================================
// Tempo
// ============================================================================

/// Metronome mark: `reference_duration = units_per_minute`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MetronomeMarkFields")]
pub struct MetronomeMark {
    reference_duration: Duration,
    units_per_minute: Ratio<i64>,
}

impl MetronomeMark {
    pub fn new(reference_duration: Duration, units_per_minute: Ratio<i64>) -> Result<Self> {
        if reference_duration <= Duration::zero() {
            return Err(QuantizeError::InvalidTempo(format!(
                "reference duration must be positive, got {reference_duration}"
            )));
        }
        if units_per_minute <= Ratio::zero() {
            return Err(QuantizeError::InvalidTempo(format!(
                "units per minute must be positive, got {units_per_minute}"
            )));
        }
        Ok(Self { reference_duration, units_per_minute })
    }

    /// Shorthand for a whole-number marking such as `1/4 = 60`
    pub fn from_bpm(reference_duration: Duration, units_per_minute: i64) -> Result<Self> {
        Self::new(reference_duration, Ratio::from_integer(units_per_minute))
    }

    pub fn reference_duration(&self) -> Duration {
        self.reference_duration
    }

    pub fn units_per_minute(&self) -> Ratio<i64> {
        self.units_per_minute
    }

    /// Length of `duration` in milliseconds at this tempo
    pub fn duration_to_milliseconds(&self, duration: Duration) -> RationalOffset {
        duration / self.reference_duration * Ratio::from_integer(60_000) / self.units_per_minute
    }
}

#[derive(Deserialize)]
struct MetronomeMarkFields {
    reference_duration: Duration,
    units_per_minute: Ratio<i64>,
}

impl TryFrom<MetronomeMarkFields> for MetronomeMark {
    type Error = QuantizeError;

    fn try_from(fields: MetronomeMarkFields) -> Result<Self> {
        Self::new(fields.reference_duration, fields.units_per_minute)
    }
}

impl Default for MetronomeMark {
    fn default() -> Self {
        Self {
            reference_duration: Duration::new(1, 4),
            units_per_minute: Ratio::from_integer(60),
        }
    }
}

// ============================================================================
// Meter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeSignatureFields")]
pub struct TimeSignature {
    numerator: u32,
    denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        if numerator == 0 || denominator == 0 {
            return Err(QuantizeError::InvalidTimeSignature { numerator, denominator });
        }
        Ok(Self { numerator, denominator })
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// Full measure length in whole notes
    pub fn duration(&self) -> Duration {
        Duration::new(i64::from(self.numerator), i64::from(self.denominator))
    }

    /// Length of one metrical beat (`1/denominator`)
    pub fn beat_duration(&self) -> Duration {
        Duration::one() / i64::from(self.denominator)
    }
}

#[derive(Deserialize)]
struct TimeSignatureFields {
    numerator: u32,
    denominator: u32,
}

impl TryFrom<TimeSignatureFields> for TimeSignature {
    type Error = QuantizeError;

    fn try_from(fields: TimeSignatureFields) -> Result<Self> {
        Self::new(fields.numerator, fields.denominator)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { numerator: 4, denominator: 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_milliseconds() {
        let tempo = MetronomeMark::default();
        assert_eq!(tempo.duration_to_milliseconds(Duration::new(1, 4)), Ratio::from_integer(1000));

        let tempo = MetronomeMark::from_bpm(Duration::new(1, 4), 55).unwrap();
        assert_eq!(tempo.duration_to_milliseconds(Duration::new(1, 4)), Ratio::new(12000, 11));
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        assert!(MetronomeMark::from_bpm(Duration::new(1, 4), 0).is_err());
        assert!(MetronomeMark::from_bpm(Duration::zero(), 60).is_err());
    }

    #[test]
    fn test_time_signature() {
        let ts = TimeSignature::new(3, 8).unwrap();
        assert_eq!(ts.duration(), Duration::new(3, 8));
        assert_eq!(ts.beat_duration(), Duration::new(1, 8));
        assert!(TimeSignature::new(0, 4).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let tempo: MetronomeMark =
            serde_json::from_str(r#"{"reference_duration": [1, 8], "units_per_minute": [72, 1]}"#).unwrap();
        assert_eq!(tempo, MetronomeMark::from_bpm(Duration::new(1, 8), 72).unwrap());
        assert!(serde_json::from_str::<MetronomeMark>(r#"{"reference_duration": [1, 4], "units_per_minute": [0, 1]}"#).is_err());
        assert!(serde_json::from_str::<MetronomeMark>(r#"{"reference_duration": [-1, 4], "units_per_minute": [60, 1]}"#).is_err());

        let ts: TimeSignature = serde_json::from_str(r#"{"numerator": 7, "denominator": 8}"#).unwrap();
        assert_eq!(ts, TimeSignature::new(7, 8).unwrap());
        assert!(serde_json::from_str::<TimeSignature>(r#"{"numerator": 4, "denominator": 0}"#).is_err());
        assert!(serde_json::from_str::<TimeSignature>(r#"{"numerator": 0, "denominator": 4}"#).is_err());
    }

    #[test]
    fn test_is_dyadic() {
        assert!(is_dyadic(Duration::new(1, 16)));
        assert!(is_dyadic(Duration::new(3, 8)));
        assert!(!is_dyadic(Duration::new(1, 12)));
    }
}
