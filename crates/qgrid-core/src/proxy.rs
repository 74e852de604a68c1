//! Events remapped into the 0..=1 span of a beat

use std::sync::Arc;

use num_traits::{One, Zero};

use crate::error::{QuantizeError, Result};
use crate::event::QEvent;
use crate::offset::RationalOffset;

/// A shared event plus its normalized offset inside one beat.
///
/// `Default` is the placeholder proxy: no event, offset 0.
#[derive(Debug, Clone, PartialEq)]
pub struct QEventProxy {
    q_event: Option<Arc<QEvent>>,
    offset: RationalOffset,
}

impl Default for QEventProxy {
    fn default() -> Self {
        Self { q_event: None, offset: RationalOffset::zero() }
    }
}

impl QEventProxy {
    /// Wrap an event at an already-normalized `offset`
    pub fn new(q_event: Arc<QEvent>, offset: RationalOffset) -> Result<Self> {
        if offset < RationalOffset::zero() || offset > RationalOffset::one() {
            return Err(QuantizeError::ProxyOffsetOutOfRange(offset));
        }
        Ok(Self { q_event: Some(q_event), offset })
    }

    /// Normalize the event's absolute offset into `start..=end`
    pub fn with_span(q_event: Arc<QEvent>, start: RationalOffset, end: RationalOffset) -> Result<Self> {
        if end <= start {
            return Err(QuantizeError::EmptySpan { start, end });
        }
        let absolute = q_event.offset();
        if absolute < start || absolute > end {
            return Err(QuantizeError::EventOutsideSpan { offset: absolute, start, end });
        }
        let offset = (absolute - start) / (end - start);
        Ok(Self { q_event: Some(q_event), offset })
    }

    pub fn q_event(&self) -> Option<&Arc<QEvent>> {
        self.q_event.as_ref()
    }

    pub fn offset(&self) -> RationalOffset {
        self.offset
    }

    pub fn index(&self) -> Option<usize> {
        self.q_event.as_ref().and_then(|e| e.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Pitch;
    use num_rational::Ratio;

    fn event_at(ms: i64) -> Arc<QEvent> {
        Arc::new(QEvent::pitched(Ratio::from_integer(ms), vec![Pitch::from(0)], vec![], None).unwrap())
    }

    #[test]
    fn test_proxy_with_offset() {
        let event = event_at(130);
        let proxy = QEventProxy::new(event.clone(), Ratio::new(1, 2)).unwrap();
        assert_eq!(proxy.q_event(), Some(&event));
        assert_eq!(proxy.offset(), Ratio::new(1, 2));
    }

    #[test]
    fn test_proxy_with_span() {
        let proxy = QEventProxy::with_span(event_at(130), Ratio::from_integer(100), Ratio::from_integer(1000)).unwrap();
        assert_eq!(proxy.offset(), Ratio::new(1, 30));
    }

    #[test]
    fn test_proxy_rejects_out_of_range() {
        assert!(QEventProxy::new(event_at(0), Ratio::new(3, 2)).is_err());
        assert!(QEventProxy::new(event_at(0), Ratio::new(-1, 2)).is_err());
        assert!(QEventProxy::with_span(event_at(1200), Ratio::from_integer(100), Ratio::from_integer(1000)).is_err());
        assert!(QEventProxy::with_span(event_at(100), Ratio::from_integer(100), Ratio::from_integer(100)).is_err());
    }

    #[test]
    fn test_placeholder_proxy() {
        let proxy = QEventProxy::default();
        assert!(proxy.q_event().is_none());
        assert_eq!(proxy.offset(), Ratio::zero());
        assert_eq!(proxy.index(), None);
    }
}
