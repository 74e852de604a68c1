//! Ordered, terminated event sequences and their builders

use std::sync::Arc;

use num_rational::Ratio;
use num_traits::{Signed, Zero};

use crate::error::{QuantizeError, Result};
use crate::event::{Attachment, Pitch, QEvent};
use crate::offset::{Duration, MetronomeMark, RationalOffset};

/// Immutable event stream ending in a terminal event
#[derive(Debug, Clone, PartialEq)]
pub struct QEventSequence {
    events: Vec<Arc<QEvent>>,
}

impl QEventSequence {
    /// Validate and wrap `events`.
    ///
    /// The sequence needs at least two events, a terminal event in last
    /// position only, and non-decreasing offsets starting at or after zero.
    pub fn new(events: Vec<QEvent>) -> Result<Self> {
        if events.len() < 2 {
            return Err(QuantizeError::InvalidSequence(format!(
                "need at least two events, got {}",
                events.len()
            )));
        }
        let (last, body) = events.split_last().ok_or_else(|| {
            QuantizeError::InvalidSequence("empty sequence".to_string())
        })?;
        if !last.is_terminal() {
            return Err(QuantizeError::InvalidSequence("last event must be terminal".to_string()));
        }
        if body.iter().any(QEvent::is_terminal) {
            return Err(QuantizeError::InvalidSequence(
                "only the last event may be terminal".to_string(),
            ));
        }
        if events[0].offset() < RationalOffset::zero() {
            return Err(QuantizeError::InvalidOffset(events[0].offset()));
        }
        if events.windows(2).any(|pair| pair[1].offset() < pair[0].offset()) {
            return Err(QuantizeError::InvalidSequence("offsets must not decrease".to_string()));
        }
        Ok(Self { events: events.into_iter().map(Arc::new).collect() })
    }

    /// Durations in milliseconds, negative values are rests.
    ///
    /// With `fuse_silences`, runs of rests collapse into one rest.
    pub fn from_millisecond_durations(durations: &[i64], fuse_silences: bool) -> Result<Self> {
        let durations: Vec<RationalOffset> = durations.iter().map(|&d| Ratio::from_integer(d)).collect();
        let durations = if fuse_silences { fuse_rests(&durations) } else { durations };
        Self::from_signed_durations(&durations)
    }

    /// Middle-C attacks at every offset but the last, which terminates
    pub fn from_millisecond_offsets(offsets: &[RationalOffset]) -> Result<Self> {
        let Some((&end, attacks)) = offsets.split_last() else {
            return Err(QuantizeError::InvalidSequence("no offsets".to_string()));
        };
        let mut events = Vec::with_capacity(offsets.len());
        for (index, &offset) in attacks.iter().enumerate() {
            events.push(QEvent::pitched(offset, vec![Pitch::from(0)], vec![], Some(index))?);
        }
        events.push(QEvent::terminal(end)?);
        Self::new(events)
    }

    /// `(duration, pitches)` pairs; `None` pitches are rests and adjacent rests fuse
    pub fn from_millisecond_pitch_pairs(pairs: Vec<(i64, Option<Vec<Pitch>>)>) -> Result<Self> {
        Self::from_millisecond_pitch_attachment_tuples(
            pairs.into_iter().map(|(duration, pitches)| (duration, pitches, Vec::new())).collect(),
        )
    }

    /// `(duration, pitches, attachments)` triples; rests may not carry attachments
    pub fn from_millisecond_pitch_attachment_tuples(
        tuples: Vec<(i64, Option<Vec<Pitch>>, Vec<Attachment>)>,
    ) -> Result<Self> {
        let mut groups: Vec<(RationalOffset, Option<Vec<Pitch>>, Vec<Attachment>)> = Vec::new();
        for (duration, pitches, attachments) in tuples {
            if duration <= 0 {
                return Err(QuantizeError::InvalidDuration(format!(
                    "durations must be positive, got {duration}"
                )));
            }
            let duration = Ratio::from_integer(duration);
            match pitches {
                Some(pitches) if pitches.is_empty() => {
                    return Err(QuantizeError::InvalidPitch("empty pitch list".to_string()));
                }
                Some(pitches) => groups.push((duration, Some(pitches), attachments)),
                None => {
                    if !attachments.is_empty() {
                        return Err(QuantizeError::InvalidSequence(
                            "rests cannot carry attachments".to_string(),
                        ));
                    }
                    if let Some((total, None, _)) = groups.last_mut() {
                        *total += duration;
                    } else {
                        groups.push((duration, None, Vec::new()));
                    }
                }
            }
        }

        let mut events = Vec::with_capacity(groups.len() + 1);
        let mut offset = RationalOffset::zero();
        for (index, (duration, pitches, attachments)) in groups.into_iter().enumerate() {
            events.push(QEvent::from_offset_pitches_attachments(offset, pitches, attachments, Some(index))?);
            offset += duration;
        }
        events.push(QEvent::terminal(offset)?);
        Self::new(events)
    }

    /// Musical durations played at `tempo`; negative durations are rests and always fuse
    pub fn from_tempo_scaled_durations(durations: &[Duration], tempo: &MetronomeMark) -> Result<Self> {
        let milliseconds: Vec<RationalOffset> = fuse_rests(durations)
            .into_iter()
            .map(|d| tempo.duration_to_milliseconds(d))
            .collect();
        Self::from_signed_durations(&milliseconds)
    }

    fn from_signed_durations(durations: &[RationalOffset]) -> Result<Self> {
        let mut events = Vec::with_capacity(durations.len() + 1);
        let mut offset = RationalOffset::zero();
        for (index, &duration) in durations.iter().enumerate() {
            let event = if duration.is_negative() {
                QEvent::silent(offset, vec![], None)?
            } else {
                QEvent::pitched(offset, vec![Pitch::from(0)], vec![], None)?
            };
            events.push(event.with_index(index));
            offset += duration.abs();
        }
        events.push(QEvent::terminal(offset)?);
        Self::new(events)
    }

    pub fn events(&self) -> &[Arc<QEvent>] {
        &self.events
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<QEvent>> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the terminal event
    pub fn duration_in_ms(&self) -> RationalOffset {
        self.events.last().map(|e| e.offset()).unwrap_or_else(RationalOffset::zero)
    }
}

/// Sum runs of negative values, keep positives as they are, drop zeros
fn fuse_rests(values: &[Ratio<i64>]) -> Vec<Ratio<i64>> {
    let mut fused: Vec<Ratio<i64>> = Vec::with_capacity(values.len());
    let mut in_rest = false;
    for &value in values {
        if in_rest && value.is_negative() {
            if let Some(last) = fused.last_mut() {
                *last += value;
            }
        } else {
            fused.push(value);
        }
        in_rest = value.is_negative();
    }
    fused.retain(|v| !v.is_zero());
    fused
}
