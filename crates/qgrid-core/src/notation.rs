//! Notated output: chosen grids turned into rests, notes and chords

use serde::Serialize;

use crate::event::{Attachment, Pitch};
use crate::grace::{GraceContainer, GraceHandler};
use crate::grid::{NodeId, QGrid};
use crate::offset::{Duration, MetronomeMark, TimeSignature};
use crate::proxy::QEventProxy;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    Rest,
    Note(Pitch),
    Chord(Vec<Pitch>),
}

impl LeafKind {
    pub fn from_pitches(mut pitches: Vec<Pitch>) -> Self {
        match pitches.len() {
            0 => Self::Rest,
            1 => Self::Note(pitches.remove(0)),
            _ => Self::Chord(pitches),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Self::Rest)
    }

    pub fn pitches(&self) -> &[Pitch] {
        match self {
            Self::Rest => &[],
            Self::Note(pitch) => std::slice::from_ref(pitch),
            Self::Chord(pitches) => pitches,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotatedLeaf {
    pub kind: LeafKind,
    /// Written duration in whole notes
    pub duration: Duration,
    /// Tied from the previous leaf
    pub tied: bool,
    /// Continuation leaves that follow should tie onto this one
    pub tie_to_next: bool,
    pub attachments: Vec<Attachment>,
    pub grace: Option<GraceContainer>,
    pub after_grace: Option<GraceContainer>,
    pub tempo: Option<MetronomeMark>,
    pub time_signature: Option<TimeSignature>,
    /// Grid container the leaf came from
    pub group: Option<NodeId>,
}

impl NotatedLeaf {
    pub fn new(kind: LeafKind, duration: Duration) -> Self {
        Self {
            kind,
            duration,
            tied: false,
            tie_to_next: false,
            attachments: Vec::new(),
            grace: None,
            after_grace: None,
            tempo: None,
            time_signature: None,
            group: None,
        }
    }

    /// Merge a tied continuation into this leaf
    pub fn absorb(&mut self, next: NotatedLeaf) {
        self.duration += next.duration;
        self.tie_to_next = next.tie_to_next;
        if next.after_grace.is_some() {
            self.after_grace = next.after_grace;
        }
    }
}

/// One beat of output: the chosen grid's shape and its leaves
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotatedBeat {
    pub rtm_format: String,
    pub beatspan: Duration,
    pub leaves: Vec<NotatedLeaf>,
}

impl NotatedBeat {
    pub fn duration(&self) -> Duration {
        self.leaves.iter().map(|leaf| leaf.duration).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotatedMeasure {
    pub time_signature: TimeSignature,
    pub beats: Vec<NotatedBeat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notation {
    Beatwise { beats: Vec<NotatedBeat> },
    Measurewise { measures: Vec<NotatedMeasure> },
}

impl Notation {
    pub fn beats(&self) -> Vec<&NotatedBeat> {
        match self {
            Self::Beatwise { beats } => beats.iter().collect(),
            Self::Measurewise { measures } => measures.iter().flat_map(|m| m.beats.iter()).collect(),
        }
    }

    pub fn leaves(&self) -> Vec<&NotatedLeaf> {
        self.beats().into_iter().flat_map(|beat| beat.leaves.iter()).collect()
    }

    pub fn duration(&self) -> Duration {
        self.beats().into_iter().map(NotatedBeat::duration).sum()
    }
}

// ============================================================================
// Leaf materialization
// ============================================================================

/// Walks chosen grids in order, carrying the previous leaf across beats so
/// unattacked leaves can continue it
pub(crate) struct LeafNotator<'a> {
    grace_handler: &'a mut dyn GraceHandler,
    previous: Option<(LeafKind, bool)>,
}

impl<'a> LeafNotator<'a> {
    pub(crate) fn new(grace_handler: &'a mut dyn GraceHandler) -> Self {
        Self { grace_handler, previous: None }
    }

    pub(crate) fn notate(&mut self, grid: &QGrid, beatspan: Duration, tempo: Option<MetronomeMark>) -> NotatedBeat {
        let mut leaves = Vec::new();
        for annotated in grid.annotate(beatspan) {
            let mut leaf = match &annotated.q_events {
                Some(q_events) => {
                    let result = self.grace_handler.handle(q_events);
                    let mut leaf = NotatedLeaf::new(LeafKind::from_pitches(result.pitches), annotated.duration);
                    leaf.tie_to_next = !leaf.kind.is_rest();
                    leaf.attachments = result.attachments;
                    leaf.grace = result.grace;
                    leaf
                }
                None => self.continuation(annotated.duration),
            };
            leaf.group = annotated.group;
            self.previous = Some((leaf.kind.clone(), leaf.tie_to_next));
            leaves.push(leaf);
        }
        if let Some(first) = leaves.first_mut() {
            first.tempo = tempo;
        }
        NotatedBeat { rtm_format: grid.rtm_format(), beatspan, leaves }
    }

    fn continuation(&self, duration: Duration) -> NotatedLeaf {
        match &self.previous {
            Some((kind, tie_to_next)) if !kind.is_rest() => {
                let mut leaf = NotatedLeaf::new(kind.clone(), duration);
                leaf.tied = *tie_to_next;
                leaf.tie_to_next = *tie_to_next;
                leaf
            }
            _ => NotatedLeaf::new(LeafKind::Rest, duration),
        }
    }

    /// Hang whatever the grace handler makes of `proxies` after the last leaf
    pub(crate) fn attach_orphans(&self, beats: &mut [NotatedBeat], proxies: &[QEventProxy]) {
        if proxies.is_empty() {
            return;
        }
        let Some(container) = self.grace_handler.handle_orphaned_q_events(proxies) else {
            return;
        };
        if let Some(last) = beats.iter_mut().rev().find_map(|beat| beat.leaves.last_mut()) {
            last.after_grace = Some(container);
        }
    }
}
