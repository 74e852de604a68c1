//! Timestamped performance events

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::error::{QuantizeError, Result};
use crate::offset::RationalOffset;

/// Opaque payload carried from an event through to its notated leaf
pub type Attachment = serde_json::Value;

/// Pitch in semitones relative to middle C, quarter-tone resolution
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Pitch(f64);

impl Pitch {
    pub fn new(semitones: f64) -> Result<Self> {
        if !semitones.is_finite() {
            return Err(QuantizeError::InvalidPitch(format!("{semitones} is not finite")));
        }
        if (semitones * 2.0).fract() != 0.0 {
            return Err(QuantizeError::InvalidPitch(format!(
                "{semitones} is not a multiple of a quarter tone"
            )));
        }
        Ok(Self(semitones))
    }

    /// Build a chord from raw semitone numbers
    pub fn many(semitones: &[f64]) -> Result<Vec<Self>> {
        semitones.iter().map(|&s| Self::new(s)).collect()
    }

    pub fn semitones(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Pitch {
    type Error = QuantizeError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Pitch> for f64 {
    fn from(pitch: Pitch) -> Self {
        pitch.0
    }
}

impl From<i8> for Pitch {
    fn from(semitones: i8) -> Self {
        Self(f64::from(semitones))
    }
}

// ============================================================================
// QEvent
// ============================================================================

/// One event of a performance. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QEventFields")]
pub enum QEvent {
    Pitched {
        offset: RationalOffset,
        pitches: Vec<Pitch>,
        attachments: Vec<Attachment>,
        index: Option<usize>,
    },
    Silent {
        offset: RationalOffset,
        attachments: Vec<Attachment>,
        index: Option<usize>,
    },
    /// End-of-sequence marker
    Terminal { offset: RationalOffset },
}

/// Wire shape of `QEvent`, checked on the way in
#[derive(Deserialize)]
enum QEventFields {
    Pitched {
        offset: RationalOffset,
        pitches: Vec<Pitch>,
        #[serde(default)]
        attachments: Vec<Attachment>,
        #[serde(default)]
        index: Option<usize>,
    },
    Silent {
        offset: RationalOffset,
        #[serde(default)]
        attachments: Vec<Attachment>,
        #[serde(default)]
        index: Option<usize>,
    },
    Terminal {
        offset: RationalOffset,
    },
}

impl TryFrom<QEventFields> for QEvent {
    type Error = QuantizeError;

    fn try_from(fields: QEventFields) -> Result<Self> {
        match fields {
            QEventFields::Pitched { offset, pitches, attachments, index } => {
                Self::pitched(offset, pitches, attachments, index)
            }
            QEventFields::Silent { offset, attachments, index } => Self::silent(offset, attachments, index),
            QEventFields::Terminal { offset } => Self::terminal(offset),
        }
    }
}

fn check_offset(offset: RationalOffset) -> Result<()> {
    if offset < RationalOffset::zero() {
        return Err(QuantizeError::InvalidOffset(offset));
    }
    Ok(())
}

impl QEvent {
    pub fn pitched(
        offset: RationalOffset,
        pitches: Vec<Pitch>,
        attachments: Vec<Attachment>,
        index: Option<usize>,
    ) -> Result<Self> {
        check_offset(offset)?;
        if pitches.is_empty() {
            return Err(QuantizeError::InvalidPitch(
                "pitched event needs at least one pitch".to_string(),
            ));
        }
        Ok(Self::Pitched { offset, pitches, attachments, index })
    }

    pub fn silent(offset: RationalOffset, attachments: Vec<Attachment>, index: Option<usize>) -> Result<Self> {
        check_offset(offset)?;
        Ok(Self::Silent { offset, attachments, index })
    }

    pub fn terminal(offset: RationalOffset) -> Result<Self> {
        check_offset(offset)?;
        Ok(Self::Terminal { offset })
    }

    /// Pitched when `pitches` is given, silent otherwise
    pub fn from_offset_pitches_attachments(
        offset: RationalOffset,
        pitches: Option<Vec<Pitch>>,
        attachments: Vec<Attachment>,
        index: Option<usize>,
    ) -> Result<Self> {
        match pitches {
            Some(pitches) => Self::pitched(offset, pitches, attachments, index),
            None => Self::silent(offset, attachments, index),
        }
    }

    pub fn offset(&self) -> RationalOffset {
        match self {
            Self::Pitched { offset, .. } | Self::Silent { offset, .. } | Self::Terminal { offset } => *offset,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Pitched { index, .. } | Self::Silent { index, .. } => *index,
            Self::Terminal { .. } => None,
        }
    }

    pub fn pitches(&self) -> &[Pitch] {
        match self {
            Self::Pitched { pitches, .. } => pitches,
            _ => &[],
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        match self {
            Self::Pitched { attachments, .. } | Self::Silent { attachments, .. } => attachments,
            Self::Terminal { .. } => &[],
        }
    }

    pub fn is_pitched(&self) -> bool {
        matches!(self, Self::Pitched { .. })
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Silent { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    /// Same event at another index
    pub(crate) fn with_index(mut self, new_index: usize) -> Self {
        match &mut self {
            Self::Pitched { index, .. } | Self::Silent { index, .. } => *index = Some(new_index),
            Self::Terminal { .. } => {}
        }
        self
    }
}
