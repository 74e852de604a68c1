//! Attack-point optimizers: regrouping tied leaves after notation

use num_traits::Zero;

use crate::notation::{NotatedBeat, NotatedLeaf};
use crate::offset::{Duration, TimeSignature};

/// Trait for tie regrouping strategies.
///
/// `beats` is one measure when `time_signature` is given, otherwise the
/// whole beatwise output. Tie chains keep their total duration.
pub trait AttackPointOptimizer: Send + Sync {
    fn name(&self) -> &str;
    fn optimize(&self, beats: &mut [NotatedBeat], time_signature: Option<TimeSignature>);
}

/// Fold each tied continuation into the leaf before it when `can_fuse`
/// allows. The closure sees the earlier leaf, the continuation and the
/// earlier leaf's start offset within the beat.
fn fuse_tied_leaves(leaves: &mut Vec<NotatedLeaf>, can_fuse: impl Fn(&NotatedLeaf, &NotatedLeaf, Duration) -> bool) {
    let mut fused: Vec<NotatedLeaf> = Vec::with_capacity(leaves.len());
    let mut cursor = Duration::zero();
    let mut last_start = Duration::zero();
    for leaf in leaves.drain(..) {
        let duration = leaf.duration;
        let fuse = leaf.tied && fused.last().is_some_and(|last| can_fuse(last, &leaf, last_start));
        if fuse {
            if let Some(last) = fused.last_mut() {
                last.absorb(leaf);
            }
        } else {
            last_start = cursor;
            fused.push(leaf);
        }
        cursor += duration;
    }
    *leaves = fused;
}

/// Fuses tied leaves that share a grid container within one beat. A tempo
/// mark on the later leaf splits the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveAttackPointOptimizer;

impl AttackPointOptimizer for NaiveAttackPointOptimizer {
    fn name(&self) -> &str {
        "Naive"
    }

    fn optimize(&self, beats: &mut [NotatedBeat], _time_signature: Option<TimeSignature>) {
        for beat in beats {
            fuse_tied_leaves(&mut beat.leaves, |last, next, _| last.group == next.group && next.tempo.is_none());
        }
    }
}

/// Fuses tied leaves across grid containers, but never across a metrical
/// beat of the measure. Beatwise output is left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurewiseAttackPointOptimizer;

impl AttackPointOptimizer for MeasurewiseAttackPointOptimizer {
    fn name(&self) -> &str {
        "Measurewise"
    }

    fn optimize(&self, beats: &mut [NotatedBeat], time_signature: Option<TimeSignature>) {
        let Some(time_signature) = time_signature else {
            return;
        };
        let unit = time_signature.beat_duration();
        let mut beat_start = Duration::zero();
        for beat in beats {
            let base = beat_start;
            fuse_tied_leaves(&mut beat.leaves, |last, next, last_start| {
                let start = base + last_start;
                let end = start + last.duration + next.duration;
                next.tempo.is_none() && (start / unit).floor() == (end / unit).ceil() - Duration::from_integer(1)
            });
            beat_start += beat.beatspan;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullAttackPointOptimizer;

impl AttackPointOptimizer for NullAttackPointOptimizer {
    fn name(&self) -> &str {
        "Null"
    }

    fn optimize(&self, _beats: &mut [NotatedBeat], _time_signature: Option<TimeSignature>) {}
}

/// Enum wrapper for all attack-point optimizers
#[derive(Debug, Clone, Copy)]
pub enum AttackPointOptimization {
    Naive(NaiveAttackPointOptimizer),
    Measurewise(MeasurewiseAttackPointOptimizer),
    Null(NullAttackPointOptimizer),
}

impl Default for AttackPointOptimization {
    fn default() -> Self {
        Self::Naive(NaiveAttackPointOptimizer)
    }
}

impl AttackPointOptimizer for AttackPointOptimization {
    fn name(&self) -> &str {
        match self {
            Self::Naive(o) => o.name(),
            Self::Measurewise(o) => o.name(),
            Self::Null(o) => o.name(),
        }
    }

    fn optimize(&self, beats: &mut [NotatedBeat], time_signature: Option<TimeSignature>) {
        match self {
            Self::Naive(o) => o.optimize(beats, time_signature),
            Self::Measurewise(o) => o.optimize(beats, time_signature),
            Self::Null(o) => o.optimize(beats, time_signature),
        }
    }
}
