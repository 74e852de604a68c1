//! Quantization targets: beats laid out over time, and the full pipeline
//!
//! Events are parcelled out to beats, one search job runs per non-empty
//! beat, the heuristic picks a grid per beat, events caught on a beat's
//! next downbeat move onto the following beat, and the chosen grids are
//! notated.

use std::sync::Arc;

use num_traits::Zero;
use tracing::{debug, warn};

use crate::error::Result;
use crate::event::QEvent;
use crate::grace::{GraceHandler, GraceHandling};
use crate::grid::QGrid;
use crate::heuristic::{DistanceHeuristic, Heuristic};
use crate::job::QuantizationJob;
use crate::job_handler::{JobHandler, SerialJobHandler};
use crate::notation::{LeafNotator, NotatedBeat, NotatedMeasure, Notation};
use crate::offset::{Duration, MetronomeMark, RationalOffset, TimeSignature};
use crate::optimizer::{AttackPointOptimization, AttackPointOptimizer};
use crate::proxy::QEventProxy;
use crate::schema::MeasurewiseSetting;
use crate::search_tree::SearchTree;
use crate::sequence::QEventSequence;

// ============================================================================
// Options
// ============================================================================

/// Collaborators used by one quantization run
pub struct QuantizeOptions {
    pub grace_handler: GraceHandling,
    pub heuristic: Box<dyn Heuristic>,
    pub job_handler: Box<dyn JobHandler>,
    pub attack_point_optimizer: AttackPointOptimization,
    pub attach_tempos: bool,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            grace_handler: GraceHandling::default(),
            heuristic: Box::new(DistanceHeuristic),
            job_handler: Box::new(SerialJobHandler),
            attack_point_optimizer: AttackPointOptimization::default(),
            attach_tempos: true,
        }
    }
}

impl std::fmt::Debug for QuantizeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantizeOptions")
            .field("grace_handler", &self.grace_handler.name())
            .field("heuristic", &self.heuristic.name())
            .field("job_handler", &self.job_handler.name())
            .field("attack_point_optimizer", &self.attack_point_optimizer.name())
            .field("attach_tempos", &self.attach_tempos)
            .finish()
    }
}

// ============================================================================
// Beats and measures
// ============================================================================

/// One beat of a target: its time window, search settings and search state
#[derive(Debug, Clone)]
pub struct QTargetBeat {
    pub beatspan: Duration,
    pub offset_in_ms: RationalOffset,
    pub search_tree: SearchTree,
    pub tempo: MetronomeMark,
    pub q_events: Vec<Arc<QEvent>>,
    pub q_grids: Vec<QGrid>,
    pub q_grid: Option<QGrid>,
}

impl QTargetBeat {
    pub fn new(beatspan: Duration, offset_in_ms: RationalOffset, search_tree: SearchTree, tempo: MetronomeMark) -> Self {
        Self {
            beatspan,
            offset_in_ms,
            search_tree,
            tempo,
            q_events: Vec::new(),
            q_grids: Vec::new(),
            q_grid: None,
        }
    }

    pub fn duration_in_ms(&self) -> RationalOffset {
        self.tempo.duration_to_milliseconds(self.beatspan)
    }

    /// Search job over this beat's events, `None` when it has none
    pub fn job(&self, job_id: usize) -> Result<Option<QuantizationJob>> {
        if self.q_events.is_empty() {
            return Ok(None);
        }
        let end = self.offset_in_ms + self.duration_in_ms();
        let proxies = self
            .q_events
            .iter()
            .map(|event| QEventProxy::with_span(Arc::clone(event), self.offset_in_ms, end))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(QuantizationJob::new(job_id, self.search_tree.clone(), &proxies)))
    }
}

/// One measure of a measurewise target
#[derive(Debug, Clone)]
pub struct QTargetMeasure {
    pub offset_in_ms: RationalOffset,
    pub search_tree: SearchTree,
    pub time_signature: TimeSignature,
    pub tempo: MetronomeMark,
    pub use_full_measure: bool,
    pub beats: Vec<QTargetBeat>,
}

impl QTargetMeasure {
    /// A single full-measure beat, or one beat per metrical unit
    pub fn new(offset_in_ms: RationalOffset, setting: MeasurewiseSetting) -> Self {
        let beatspan = setting.beatspan();
        let count = if setting.use_full_measure { 1 } else { setting.time_signature.numerator() };
        let beat_ms = setting.tempo.duration_to_milliseconds(beatspan);
        let beats = (0..count)
            .map(|i| {
                let offset = offset_in_ms + beat_ms * RationalOffset::from_integer(i64::from(i));
                QTargetBeat::new(beatspan, offset, setting.search_tree.clone(), setting.tempo)
            })
            .collect();
        Self {
            offset_in_ms,
            search_tree: setting.search_tree,
            time_signature: setting.time_signature,
            tempo: setting.tempo,
            use_full_measure: setting.use_full_measure,
            beats,
        }
    }

    pub fn duration_in_ms(&self) -> RationalOffset {
        self.tempo.duration_to_milliseconds(self.time_signature.duration())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Search, select and boundary-shift over a flat run of beats
fn process_beats(beats: &mut [QTargetBeat], sequence: &QEventSequence, options: &QuantizeOptions) -> Result<()> {
    // a trailing rest swallows the terminal so no rest-only tuplet follows
    let events = sequence.events();
    let events = match events.len() {
        n if n >= 2 && events[n - 2].is_silent() => &events[..n - 1],
        _ => events,
    };

    let offsets: Vec<RationalOffset> = beats.iter().map(|beat| beat.offset_in_ms).collect();
    for event in events {
        let index = offsets.partition_point(|o| *o <= event.offset()).saturating_sub(1);
        if let Some(beat) = beats.get_mut(index) {
            beat.q_events.push(Arc::clone(event));
        }
    }

    let mut jobs = Vec::new();
    for (i, beat) in beats.iter().enumerate() {
        if let Some(job) = beat.job(i)? {
            jobs.push(job);
        }
    }
    debug!(beats = beats.len(), jobs = jobs.len(), handler = options.job_handler.name(), "Dispatching jobs");
    for mut job in options.job_handler.handle(jobs)? {
        if let Some(beat) = beats.get_mut(job.job_id()) {
            beat.q_grids = job.take_q_grids();
        }
    }

    options.heuristic.process(beats);
    shift_downbeat_q_events(beats);
    Ok(())
}

/// Move each beat's next-downbeat proxies onto the following beat's first
/// leaf, left to right
fn shift_downbeat_q_events(beats: &mut [QTargetBeat]) {
    for i in 1..beats.len() {
        let (left, right) = beats.split_at_mut(i);
        let one = left.last_mut().and_then(|beat| beat.q_grid.as_mut());
        let two = right.first_mut().and_then(|beat| beat.q_grid.as_mut());
        if let (Some(one), Some(two)) = (one, two) {
            let moved = std::mem::take(&mut one.next_downbeat_mut().q_event_proxies);
            if let Some(first) = two.leaf_mut(0) {
                first.q_event_proxies.extend(moved);
            }
        }
    }
}

/// Proxies still on the last beat's next downbeat
fn orphaned_proxies(beats: &[QTargetBeat]) -> Vec<QEventProxy> {
    let proxies: Vec<QEventProxy> = beats
        .last()
        .and_then(|beat| beat.q_grid.as_ref())
        .map(|grid| grid.next_downbeat().q_event_proxies.clone())
        .unwrap_or_default();
    let pitched = proxies.iter().filter_map(QEventProxy::q_event).filter(|e| e.is_pitched()).count();
    if pitched > 0 {
        warn!(count = pitched, "Events past the final beat handed to grace handler");
    }
    proxies
}

/// Notate beats in order, marking tempo on the first beat and on changes
fn notate_beats(notator: &mut LeafNotator<'_>, beats: &[QTargetBeat], attach_tempos: bool) -> Vec<NotatedBeat> {
    let mut previous_tempo: Option<MetronomeMark> = None;
    let mut notated = Vec::with_capacity(beats.len());
    for beat in beats {
        let tempo = (attach_tempos && previous_tempo != Some(beat.tempo)).then_some(beat.tempo);
        previous_tempo = Some(beat.tempo);
        let fallback;
        let grid = match &beat.q_grid {
            Some(grid) => grid,
            None => {
                fallback = QGrid::new();
                &fallback
            }
        };
        notated.push(notator.notate(grid, beat.beatspan, tempo));
    }
    notated
}

// ============================================================================
// Targets
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BeatwiseQTarget {
    beats: Vec<QTargetBeat>,
}

impl BeatwiseQTarget {
    pub fn new(mut beats: Vec<QTargetBeat>) -> Self {
        beats.sort_by(|a, b| a.offset_in_ms.cmp(&b.offset_in_ms));
        Self { beats }
    }

    pub fn beats(&self) -> &[QTargetBeat] {
        &self.beats
    }

    pub fn duration_in_ms(&self) -> RationalOffset {
        self.beats
            .last()
            .map(|beat| beat.offset_in_ms + beat.duration_in_ms())
            .unwrap_or_else(RationalOffset::zero)
    }

    pub fn quantize(mut self, sequence: &QEventSequence, options: &mut QuantizeOptions) -> Result<Notation> {
        process_beats(&mut self.beats, sequence, options)?;
        let orphans = orphaned_proxies(&self.beats);

        let mut notator = LeafNotator::new(&mut options.grace_handler);
        let mut beats = notate_beats(&mut notator, &self.beats, options.attach_tempos);
        options.attack_point_optimizer.optimize(&mut beats, None);
        notator.attach_orphans(&mut beats, &orphans);
        Ok(Notation::Beatwise { beats })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeasurewiseQTarget {
    measures: Vec<QTargetMeasure>,
}

impl MeasurewiseQTarget {
    pub fn new(mut measures: Vec<QTargetMeasure>) -> Self {
        measures.sort_by(|a, b| a.offset_in_ms.cmp(&b.offset_in_ms));
        Self { measures }
    }

    pub fn measures(&self) -> &[QTargetMeasure] {
        &self.measures
    }

    pub fn beats(&self) -> impl Iterator<Item = &QTargetBeat> {
        self.measures.iter().flat_map(|measure| measure.beats.iter())
    }

    pub fn duration_in_ms(&self) -> RationalOffset {
        self.measures
            .last()
            .map(|measure| measure.offset_in_ms + measure.duration_in_ms())
            .unwrap_or_else(RationalOffset::zero)
    }

    pub fn quantize(mut self, sequence: &QEventSequence, options: &mut QuantizeOptions) -> Result<Notation> {
        // flatten so jobs, selection and the boundary shift run across measures
        let counts: Vec<usize> = self.measures.iter().map(|m| m.beats.len()).collect();
        let mut beats: Vec<QTargetBeat> = self.measures.iter_mut().flat_map(|m| std::mem::take(&mut m.beats)).collect();
        process_beats(&mut beats, sequence, options)?;
        let orphans = orphaned_proxies(&beats);

        let mut notator = LeafNotator::new(&mut options.grace_handler);
        let mut notated = notate_beats(&mut notator, &beats, options.attach_tempos).into_iter();
        let mut measures = Vec::with_capacity(self.measures.len());
        let mut previous_time_signature = None;
        for (measure, count) in self.measures.iter().zip(counts) {
            let mut measure_beats: Vec<NotatedBeat> = notated.by_ref().take(count).collect();
            if previous_time_signature != Some(measure.time_signature) {
                if let Some(first) = measure_beats.first_mut().and_then(|beat| beat.leaves.first_mut()) {
                    first.time_signature = Some(measure.time_signature);
                }
            }
            previous_time_signature = Some(measure.time_signature);
            options.attack_point_optimizer.optimize(&mut measure_beats, Some(measure.time_signature));
            measures.push(NotatedMeasure { time_signature: measure.time_signature, beats: measure_beats });
        }
        if let Some(last) = measures.last_mut() {
            notator.attach_orphans(&mut last.beats, &orphans);
        }
        Ok(Notation::Measurewise { measures })
    }
}

/// Enum wrapper for both target layouts
#[derive(Debug, Clone)]
pub enum QTarget {
    Beatwise(BeatwiseQTarget),
    Measurewise(MeasurewiseQTarget),
}

impl QTarget {
    pub fn duration_in_ms(&self) -> RationalOffset {
        match self {
            Self::Beatwise(target) => target.duration_in_ms(),
            Self::Measurewise(target) => target.duration_in_ms(),
        }
    }

    pub fn quantize(self, sequence: &QEventSequence, options: &mut QuantizeOptions) -> Result<Notation> {
        match self {
            Self::Beatwise(target) => target.quantize(sequence, options),
            Self::Measurewise(target) => target.quantize(sequence, options),
        }
    }
}

impl From<BeatwiseQTarget> for QTarget {
    fn from(target: BeatwiseQTarget) -> Self {
        Self::Beatwise(target)
    }
}

impl From<MeasurewiseQTarget> for QTarget {
    fn from(target: MeasurewiseQTarget) -> Self {
        Self::Measurewise(target)
    }
}
