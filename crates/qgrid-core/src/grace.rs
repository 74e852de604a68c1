//! Grace handlers: what to do when several events land on one leaf

use std::sync::Arc;

use num_traits::Zero;
use serde::Serialize;

use crate::error::{QuantizeError, Result};
use crate::event::{Attachment, Pitch, QEvent};
use crate::notation::LeafKind;
use crate::offset::{is_dyadic, Duration};
use crate::proxy::QEventProxy;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraceLeaf {
    pub kind: LeafKind,
    pub duration: Duration,
    pub attachments: Vec<Attachment>,
}

/// Grace notes hung before (or, for orphans, after) a main leaf
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraceContainer {
    pub leaves: Vec<GraceLeaf>,
}

/// What a leaf's events collapse to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraceResult {
    pub pitches: Vec<Pitch>,
    pub attachments: Vec<Attachment>,
    pub grace: Option<GraceContainer>,
}

/// Trait for grace handling policies
pub trait GraceHandler: Send {
    fn name(&self) -> &str;

    /// `q_events` is every event fitted to one leaf, in sequence order
    fn handle(&mut self, q_events: &[Arc<QEvent>]) -> GraceResult;

    /// Events left on the final beat's next downbeat
    fn handle_orphaned_q_events(&self, _proxies: &[QEventProxy]) -> Option<GraceContainer> {
        None
    }
}

// ============================================================================
// Collapsing
// ============================================================================

/// Every pitch at the leaf sounds together as one chord
#[derive(Debug, Clone, Copy, Default)]
pub struct CollapsingGraceHandler;

impl GraceHandler for CollapsingGraceHandler {
    fn name(&self) -> &str {
        "Collapsing"
    }

    fn handle(&mut self, q_events: &[Arc<QEvent>]) -> GraceResult {
        let mut result = GraceResult::default();
        for event in q_events.iter().filter(|e| e.is_pitched()) {
            result.pitches.extend_from_slice(event.pitches());
            result.attachments.extend_from_slice(event.attachments());
        }
        result
    }
}

// ============================================================================
// Concatenating
// ============================================================================

/// Earlier events become grace notes before the final one
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatenatingGraceHandler {
    discard_grace_rest: bool,
    grace_duration: Duration,
    replace_rest_with_final_grace_note: bool,
}

impl Default for ConcatenatingGraceHandler {
    fn default() -> Self {
        Self {
            discard_grace_rest: true,
            grace_duration: Duration::new(1, 16),
            replace_rest_with_final_grace_note: true,
        }
    }
}

impl ConcatenatingGraceHandler {
    pub fn new(discard_grace_rest: bool, grace_duration: Duration, replace_rest_with_final_grace_note: bool) -> Result<Self> {
        if grace_duration <= Duration::zero() || !is_dyadic(grace_duration) {
            return Err(QuantizeError::InvalidDuration(format!(
                "grace duration must be a positive dyadic value, got {grace_duration}"
            )));
        }
        Ok(Self { discard_grace_rest, grace_duration, replace_rest_with_final_grace_note })
    }

    pub fn discard_grace_rest(&self) -> bool {
        self.discard_grace_rest
    }

    pub fn grace_duration(&self) -> Duration {
        self.grace_duration
    }

    pub fn replace_rest_with_final_grace_note(&self) -> bool {
        self.replace_rest_with_final_grace_note
    }

    fn grace_leaf(&self, event: &QEvent) -> GraceLeaf {
        GraceLeaf {
            kind: LeafKind::from_pitches(event.pitches().to_vec()),
            duration: self.grace_duration,
            attachments: event.attachments().to_vec(),
        }
    }
}

impl GraceHandler for ConcatenatingGraceHandler {
    fn name(&self) -> &str {
        "Concatenating"
    }

    fn handle(&mut self, q_events: &[Arc<QEvent>]) -> GraceResult {
        if q_events.is_empty() {
            return GraceResult::default();
        }
        let mut final_index = q_events.len() - 1;
        if final_index > 0 && self.replace_rest_with_final_grace_note {
            // events after the last pitched one are dropped
            if let Some(index) = q_events.iter().rposition(|e| e.is_pitched()) {
                final_index = index;
            }
        }

        let final_event = &q_events[final_index];
        let mut result = GraceResult::default();
        if final_event.is_pitched() {
            result.pitches = final_event.pitches().to_vec();
            result.attachments = final_event.attachments().to_vec();
        }

        let grace_leaves: Vec<GraceLeaf> = q_events[..final_index]
            .iter()
            .filter(|e| !(self.discard_grace_rest && e.is_silent()))
            .map(|e| self.grace_leaf(e))
            .collect();
        if !grace_leaves.is_empty() {
            result.grace = Some(GraceContainer { leaves: grace_leaves });
        }
        result
    }

    fn handle_orphaned_q_events(&self, proxies: &[QEventProxy]) -> Option<GraceContainer> {
        let leaves: Vec<GraceLeaf> = proxies
            .iter()
            .filter_map(QEventProxy::q_event)
            .filter(|e| e.is_pitched())
            .map(|e| self.grace_leaf(e))
            .collect();
        (!leaves.is_empty()).then_some(GraceContainer { leaves })
    }
}

// ============================================================================
// Discarding
// ============================================================================

/// Keeps only the final event, remembering what it dropped
#[derive(Debug, Clone, Default)]
pub struct DiscardingGraceHandler {
    discarded_q_events: Vec<Vec<Arc<QEvent>>>,
}

impl DiscardingGraceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per leaf that lost events
    pub fn discarded_q_events(&self) -> &[Vec<Arc<QEvent>>] {
        &self.discarded_q_events
    }
}

impl GraceHandler for DiscardingGraceHandler {
    fn name(&self) -> &str {
        "Discarding"
    }

    fn handle(&mut self, q_events: &[Arc<QEvent>]) -> GraceResult {
        let Some((last, discarded)) = q_events.split_last() else {
            return GraceResult::default();
        };
        if !discarded.is_empty() {
            self.discarded_q_events.push(discarded.to_vec());
        }
        GraceResult {
            pitches: last.pitches().to_vec(),
            attachments: if last.is_pitched() { last.attachments().to_vec() } else { Vec::new() },
            grace: None,
        }
    }
}

// ============================================================================
// Enum wrapper
// ============================================================================

/// Enum wrapper for all grace handlers
#[derive(Debug, Clone)]
pub enum GraceHandling {
    Collapsing(CollapsingGraceHandler),
    Concatenating(ConcatenatingGraceHandler),
    Discarding(DiscardingGraceHandler),
}

impl Default for GraceHandling {
    fn default() -> Self {
        Self::Concatenating(ConcatenatingGraceHandler::default())
    }
}

impl GraceHandler for GraceHandling {
    fn name(&self) -> &str {
        match self {
            Self::Collapsing(h) => h.name(),
            Self::Concatenating(h) => h.name(),
            Self::Discarding(h) => h.name(),
        }
    }

    fn handle(&mut self, q_events: &[Arc<QEvent>]) -> GraceResult {
        match self {
            Self::Collapsing(h) => h.handle(q_events),
            Self::Concatenating(h) => h.handle(q_events),
            Self::Discarding(h) => h.handle(q_events),
        }
    }

    fn handle_orphaned_q_events(&self, proxies: &[QEventProxy]) -> Option<GraceContainer> {
        match self {
            Self::Collapsing(h) => h.handle_orphaned_q_events(proxies),
            Self::Concatenating(h) => h.handle_orphaned_q_events(proxies),
            Self::Discarding(h) => h.handle_orphaned_q_events(proxies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::Ratio;

    fn pitched(pitches: &[f64], index: usize) -> Arc<QEvent> {
        let attachments = vec![serde_json::json!({ "index": index })];
        Arc::new(QEvent::pitched(Ratio::zero(), Pitch::many(pitches).unwrap(), attachments, Some(index)).unwrap())
    }

    fn silent(index: usize) -> Arc<QEvent> {
        Arc::new(QEvent::silent(Ratio::zero(), vec![], Some(index)).unwrap())
    }

    #[test]
    fn test_collapsing() {
        let mut handler = CollapsingGraceHandler;
        let result = handler.handle(&[pitched(&[0.0], 0), silent(1), pitched(&[4.0, 7.0], 2)]);
        assert_eq!(result.pitches, Pitch::many(&[0.0, 4.0, 7.0]).unwrap());
        assert_eq!(result.attachments.len(), 2);
        assert!(result.grace.is_none());

        assert!(handler.handle(&[silent(0)]).pitches.is_empty());
    }

    #[test]
    fn test_concatenating_single_event() {
        let mut handler = ConcatenatingGraceHandler::default();
        let result = handler.handle(&[pitched(&[2.0], 0)]);
        assert_eq!(result.pitches, vec![Pitch::from(2)]);
        assert_eq!(result.attachments, vec![serde_json::json!({ "index": 0 })]);
        assert!(result.grace.is_none());
    }

    #[test]
    fn test_concatenating_graces() {
        let mut handler = ConcatenatingGraceHandler::default();
        let result = handler.handle(&[pitched(&[0.0], 0), silent(1), pitched(&[2.0], 2), pitched(&[4.0, 5.0], 3)]);
        assert_eq!(result.pitches, Pitch::many(&[4.0, 5.0]).unwrap());
        let grace = result.grace.unwrap();
        assert_eq!(
            grace.leaves.iter().map(|leaf| &leaf.kind).collect::<Vec<_>>(),
            vec![&LeafKind::Note(Pitch::from(0)), &LeafKind::Note(Pitch::from(2))]
        );
        assert!(grace.leaves.iter().all(|leaf| leaf.duration == Duration::new(1, 16)));
    }

    #[test]
    fn test_concatenating_replaces_final_rest() {
        let mut handler = ConcatenatingGraceHandler::default();
        let result = handler.handle(&[pitched(&[0.0], 0), pitched(&[2.0], 1), silent(2)]);
        assert_eq!(result.pitches, vec![Pitch::from(2)]);
        assert_eq!(result.grace.unwrap().leaves.len(), 1);

        let mut keep_rest = ConcatenatingGraceHandler::new(false, Duration::new(1, 32), false).unwrap();
        let result = keep_rest.handle(&[pitched(&[0.0], 0), silent(1), silent(2)]);
        assert!(result.pitches.is_empty());
        let grace = result.grace.unwrap();
        assert_eq!(grace.leaves.len(), 2);
        assert_eq!(grace.leaves[1].kind, LeafKind::Rest);
        assert_eq!(grace.leaves[1].duration, Duration::new(1, 32));
    }

    #[test]
    fn test_concatenating_all_silent() {
        let mut handler = ConcatenatingGraceHandler::default();
        let result = handler.handle(&[silent(0), silent(1)]);
        assert!(result.pitches.is_empty());
        assert!(result.grace.is_none());
    }

    #[test]
    fn test_concatenating_rejects_non_dyadic_grace() {
        assert!(ConcatenatingGraceHandler::new(true, Duration::new(1, 12), true).is_err());
        assert!(ConcatenatingGraceHandler::new(true, Duration::zero(), true).is_err());
    }

    #[test]
    fn test_discarding() {
        let mut handler = DiscardingGraceHandler::new();
        let result = handler.handle(&[pitched(&[0.0], 0), pitched(&[2.0], 1), silent(2)]);
        assert!(result.pitches.is_empty());
        assert!(result.attachments.is_empty());
        handler.handle(&[pitched(&[9.0], 3)]);
        assert_eq!(handler.discarded_q_events().len(), 1);
        assert_eq!(handler.discarded_q_events()[0].len(), 2);
        assert!(handler.handle_orphaned_q_events(&[QEventProxy::default()]).is_none());
    }

    #[test]
    fn test_enum_dispatch() {
        let mut handling = GraceHandling::default();
        assert_eq!(handling.name(), "Concatenating");
        let result = handling.handle(&[pitched(&[0.0], 0), pitched(&[1.0], 1)]);
        assert!(result.grace.is_some());

        let mut handling = GraceHandling::Collapsing(CollapsingGraceHandler);
        assert_eq!(handling.handle(&[pitched(&[0.0], 0), pitched(&[1.0], 1)]).pitches.len(), 2);
    }
}
