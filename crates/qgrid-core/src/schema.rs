//! Quantization schemas: per time-step settings with sticky lookups
//!
//! A schema holds global defaults plus sparse overrides keyed by time-step
//! index. Each field resolves on its own: the closest override at or below
//! the requested index wins, else the schema default. Indices past the last
//! override keep its settings.

use std::collections::BTreeMap;

use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuantizeError, Result};
use crate::offset::{Duration, MetronomeMark, RationalOffset, TimeSignature};
use crate::search_tree::SearchTree;
use crate::target::{BeatwiseQTarget, MeasurewiseQTarget, QTarget, QTargetBeat, QTargetMeasure};

/// Most recent value of one field at or before `index`
fn sticky<I, T: Clone>(items: &BTreeMap<usize, I>, index: usize, field: impl Fn(&I) -> Option<&T>) -> Option<T> {
    items.range(..=index).rev().find_map(|(_, item)| field(item).cloned())
}

fn check_beatspan(beatspan: Duration) -> Result<()> {
    if beatspan <= Duration::zero() {
        return Err(QuantizeError::InvalidDuration(format!("beatspan must be positive, got {beatspan}")));
    }
    Ok(())
}

// ============================================================================
// Beatwise
// ============================================================================

/// Sparse override for one beat; unset fields inherit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BeatwiseQSchemaItemFields")]
pub struct BeatwiseQSchemaItem {
    pub beatspan: Option<Duration>,
    pub search_tree: Option<SearchTree>,
    pub tempo: Option<MetronomeMark>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct BeatwiseQSchemaItemFields {
    beatspan: Option<Duration>,
    search_tree: Option<SearchTree>,
    tempo: Option<MetronomeMark>,
}

impl TryFrom<BeatwiseQSchemaItemFields> for BeatwiseQSchemaItem {
    type Error = QuantizeError;

    fn try_from(fields: BeatwiseQSchemaItemFields) -> Result<Self> {
        if let Some(beatspan) = fields.beatspan {
            check_beatspan(beatspan)?;
        }
        Ok(Self { beatspan: fields.beatspan, search_tree: fields.search_tree, tempo: fields.tempo })
    }
}

/// Fully resolved settings for one beat
#[derive(Debug, Clone, PartialEq)]
pub struct BeatwiseSetting {
    pub beatspan: Duration,
    pub search_tree: SearchTree,
    pub tempo: MetronomeMark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BeatwiseQSchemaFields")]
pub struct BeatwiseQSchema {
    beatspan: Duration,
    search_tree: SearchTree,
    tempo: MetronomeMark,
    items: BTreeMap<usize, BeatwiseQSchemaItem>,
}

#[derive(Deserialize)]
#[serde(default)]
struct BeatwiseQSchemaFields {
    beatspan: Duration,
    search_tree: SearchTree,
    tempo: MetronomeMark,
    items: BTreeMap<usize, BeatwiseQSchemaItem>,
}

impl Default for BeatwiseQSchemaFields {
    fn default() -> Self {
        let schema = BeatwiseQSchema::default();
        Self { beatspan: schema.beatspan, search_tree: schema.search_tree, tempo: schema.tempo, items: schema.items }
    }
}

impl TryFrom<BeatwiseQSchemaFields> for BeatwiseQSchema {
    type Error = QuantizeError;

    fn try_from(fields: BeatwiseQSchemaFields) -> Result<Self> {
        let mut schema = Self::new(fields.beatspan, fields.search_tree, fields.tempo)?;
        schema.items = fields.items;
        Ok(schema)
    }
}

impl Default for BeatwiseQSchema {
    fn default() -> Self {
        Self {
            beatspan: Duration::new(1, 4),
            search_tree: SearchTree::default(),
            tempo: MetronomeMark::default(),
            items: BTreeMap::new(),
        }
    }
}

impl BeatwiseQSchema {
    pub fn new(beatspan: Duration, search_tree: SearchTree, tempo: MetronomeMark) -> Result<Self> {
        check_beatspan(beatspan)?;
        Ok(Self { beatspan, search_tree, tempo, items: BTreeMap::new() })
    }

    /// Builder-style override at `index`
    pub fn with_item(mut self, index: usize, item: BeatwiseQSchemaItem) -> Result<Self> {
        self.insert(index, item)?;
        Ok(self)
    }

    pub fn insert(&mut self, index: usize, item: BeatwiseQSchemaItem) -> Result<()> {
        if let Some(beatspan) = item.beatspan {
            check_beatspan(beatspan)?;
        }
        self.items.insert(index, item);
        Ok(())
    }

    pub fn beatspan(&self) -> Duration {
        self.beatspan
    }

    pub fn search_tree(&self) -> &SearchTree {
        &self.search_tree
    }

    pub fn tempo(&self) -> MetronomeMark {
        self.tempo
    }

    pub fn items(&self) -> &BTreeMap<usize, BeatwiseQSchemaItem> {
        &self.items
    }

    pub fn lookup(&self, index: usize) -> BeatwiseSetting {
        BeatwiseSetting {
            beatspan: sticky(&self.items, index, |item| item.beatspan.as_ref()).unwrap_or(self.beatspan),
            search_tree: sticky(&self.items, index, |item| item.search_tree.as_ref())
                .unwrap_or_else(|| self.search_tree.clone()),
            tempo: sticky(&self.items, index, |item| item.tempo.as_ref()).unwrap_or(self.tempo),
        }
    }

    /// Lay out beats from 0 until `duration_in_ms` is covered
    pub fn target(&self, duration_in_ms: RationalOffset) -> BeatwiseQTarget {
        let mut beats = Vec::new();
        let mut offset = RationalOffset::zero();
        while offset < duration_in_ms {
            let setting = self.lookup(beats.len());
            let beat = QTargetBeat::new(setting.beatspan, offset, setting.search_tree, setting.tempo);
            offset += beat.duration_in_ms();
            beats.push(beat);
        }
        debug!(beats = beats.len(), "Beatwise target laid out");
        BeatwiseQTarget::new(beats)
    }
}

// ============================================================================
// Measurewise
// ============================================================================

/// Sparse override for one measure; unset fields inherit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurewiseQSchemaItem {
    pub search_tree: Option<SearchTree>,
    pub tempo: Option<MetronomeMark>,
    pub time_signature: Option<TimeSignature>,
    pub use_full_measure: Option<bool>,
}

/// Fully resolved settings for one measure
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurewiseSetting {
    pub search_tree: SearchTree,
    pub tempo: MetronomeMark,
    pub time_signature: TimeSignature,
    pub use_full_measure: bool,
}

impl MeasurewiseSetting {
    /// Span of each beat in the measure
    pub fn beatspan(&self) -> Duration {
        if self.use_full_measure {
            self.time_signature.duration()
        } else {
            self.time_signature.beat_duration()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurewiseQSchema {
    search_tree: SearchTree,
    tempo: MetronomeMark,
    time_signature: TimeSignature,
    use_full_measure: bool,
    items: BTreeMap<usize, MeasurewiseQSchemaItem>,
}

impl MeasurewiseQSchema {
    pub fn new(
        search_tree: SearchTree,
        tempo: MetronomeMark,
        time_signature: TimeSignature,
        use_full_measure: bool,
    ) -> Self {
        Self { search_tree, tempo, time_signature, use_full_measure, items: BTreeMap::new() }
    }

    pub fn with_item(mut self, index: usize, item: MeasurewiseQSchemaItem) -> Self {
        self.insert(index, item);
        self
    }

    pub fn insert(&mut self, index: usize, item: MeasurewiseQSchemaItem) {
        self.items.insert(index, item);
    }

    pub fn search_tree(&self) -> &SearchTree {
        &self.search_tree
    }

    pub fn tempo(&self) -> MetronomeMark {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn use_full_measure(&self) -> bool {
        self.use_full_measure
    }

    pub fn items(&self) -> &BTreeMap<usize, MeasurewiseQSchemaItem> {
        &self.items
    }

    pub fn lookup(&self, index: usize) -> MeasurewiseSetting {
        MeasurewiseSetting {
            search_tree: sticky(&self.items, index, |item| item.search_tree.as_ref())
                .unwrap_or_else(|| self.search_tree.clone()),
            tempo: sticky(&self.items, index, |item| item.tempo.as_ref()).unwrap_or(self.tempo),
            time_signature: sticky(&self.items, index, |item| item.time_signature.as_ref())
                .unwrap_or(self.time_signature),
            use_full_measure: sticky(&self.items, index, |item| item.use_full_measure.as_ref())
                .unwrap_or(self.use_full_measure),
        }
    }

    /// Lay out measures from 0 until `duration_in_ms` is covered
    pub fn target(&self, duration_in_ms: RationalOffset) -> MeasurewiseQTarget {
        let mut measures = Vec::new();
        let mut offset = RationalOffset::zero();
        while offset < duration_in_ms {
            let measure = QTargetMeasure::new(offset, self.lookup(measures.len()));
            offset += measure.duration_in_ms();
            measures.push(measure);
        }
        debug!(measures = measures.len(), "Measurewise target laid out");
        MeasurewiseQTarget::new(measures)
    }
}

/// Enum wrapper for both schema layouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QSchema {
    Beatwise(BeatwiseQSchema),
    Measurewise(MeasurewiseQSchema),
}

impl Default for QSchema {
    fn default() -> Self {
        Self::Measurewise(MeasurewiseQSchema::default())
    }
}

impl QSchema {
    pub fn target(&self, duration_in_ms: RationalOffset) -> QTarget {
        match self {
            Self::Beatwise(schema) => QTarget::Beatwise(schema.target(duration_in_ms)),
            Self::Measurewise(schema) => QTarget::Measurewise(schema.target(duration_in_ms)),
        }
    }
}

impl From<BeatwiseQSchema> for QSchema {
    fn from(schema: BeatwiseQSchema) -> Self {
        Self::Beatwise(schema)
    }
}

impl From<MeasurewiseQSchema> for QSchema {
    fn from(schema: MeasurewiseQSchema) -> Self {
        Self::Measurewise(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_tree::{WeightedSearchTree, UnweightedSearchTree};
    use num_rational::Ratio;

    fn tempo(bpm: i64) -> MetronomeMark {
        MetronomeMark::from_bpm(Duration::new(1, 4), bpm).unwrap()
    }

    #[test]
    fn test_beatwise_defaults() {
        let schema = BeatwiseQSchema::default();
        let setting = schema.lookup(1000);
        assert_eq!(setting.beatspan, Duration::new(1, 4));
        assert_eq!(setting.tempo, MetronomeMark::default());
        assert_eq!(setting.search_tree, SearchTree::Unweighted(UnweightedSearchTree::default()));
    }

    #[test]
    fn test_beatwise_lookups_are_sticky() {
        let weighted = SearchTree::Weighted(WeightedSearchTree::default());
        let schema = BeatwiseQSchema::default()
            .with_item(2, BeatwiseQSchemaItem { beatspan: Some(Duration::new(5, 16)), ..Default::default() })
            .unwrap()
            .with_item(4, BeatwiseQSchemaItem { tempo: Some(tempo(120)), ..Default::default() })
            .unwrap()
            .with_item(
                7,
                BeatwiseQSchemaItem {
                    beatspan: Some(Duration::new(1, 8)),
                    search_tree: Some(weighted.clone()),
                    ..Default::default()
                },
            )
            .unwrap();

        let spans: Vec<Duration> = (0..10).map(|i| schema.lookup(i).beatspan).collect();
        assert_eq!(
            spans,
            [
                vec![Duration::new(1, 4); 2],
                vec![Duration::new(5, 16); 5],
                vec![Duration::new(1, 8); 3],
            ]
            .concat()
        );
        assert_eq!(schema.lookup(3).tempo, MetronomeMark::default());
        assert_eq!(schema.lookup(4).tempo, tempo(120));
        assert_eq!(schema.lookup(1000).tempo, tempo(120));
        assert_eq!(schema.lookup(6).search_tree, SearchTree::default());
        assert_eq!(schema.lookup(7).search_tree, weighted);
    }

    #[test]
    fn test_override_at_zero_replaces_default() {
        let schema = BeatwiseQSchema::default()
            .with_item(0, BeatwiseQSchemaItem { tempo: Some(tempo(90)), ..Default::default() })
            .unwrap();
        assert_eq!(schema.lookup(0).tempo, tempo(90));
    }

    #[test]
    fn test_invalid_beatspan_rejected() {
        assert!(BeatwiseQSchema::new(Duration::zero(), SearchTree::default(), tempo(60)).is_err());
        let item = BeatwiseQSchemaItem { beatspan: Some(Duration::new(-1, 4)), ..Default::default() };
        assert!(BeatwiseQSchema::default().with_item(0, item).is_err());
    }

    #[test]
    fn test_beatwise_target() {
        let schema = BeatwiseQSchema::default()
            .with_item(2, BeatwiseQSchemaItem { tempo: Some(tempo(120)), ..Default::default() })
            .unwrap();
        let target = schema.target(Ratio::from_integer(2600));
        let offsets: Vec<RationalOffset> = target.beats().iter().map(|beat| beat.offset_in_ms).collect();
        assert_eq!(
            offsets,
            vec![Ratio::from_integer(0), Ratio::from_integer(1000), Ratio::from_integer(2000), Ratio::from_integer(2500)]
        );
        assert_eq!(target.duration_in_ms(), Ratio::from_integer(3000));
    }

    #[test]
    fn test_measurewise_lookups() {
        let schema = MeasurewiseQSchema::default()
            .with_item(1, MeasurewiseQSchemaItem { time_signature: Some(TimeSignature::new(3, 8).unwrap()), ..Default::default() })
            .with_item(3, MeasurewiseQSchemaItem { use_full_measure: Some(true), ..Default::default() });
        assert_eq!(schema.lookup(0).time_signature, TimeSignature::default());
        assert_eq!(schema.lookup(2).time_signature, TimeSignature::new(3, 8).unwrap());
        assert!(!schema.lookup(2).use_full_measure);
        assert!(schema.lookup(5).use_full_measure);
        assert_eq!(schema.lookup(2).beatspan(), Duration::new(1, 8));
        assert_eq!(schema.lookup(3).beatspan(), Duration::new(3, 8));
    }

    #[test]
    fn test_measurewise_target() {
        let schema = MeasurewiseQSchema::default()
            .with_item(1, MeasurewiseQSchemaItem { time_signature: Some(TimeSignature::new(3, 8).unwrap()), ..Default::default() });
        let target = schema.target(Ratio::from_integer(6000));
        let measures = target.measures();
        assert_eq!(measures.len(), 3);
        assert_eq!(measures[0].beats.len(), 4);
        assert_eq!(measures[1].offset_in_ms, Ratio::from_integer(4000));
        assert_eq!(measures[1].beats.len(), 3);
        assert_eq!(measures[1].beats[2].offset_in_ms, Ratio::from_integer(5000));
        assert_eq!(measures[2].offset_in_ms, Ratio::from_integer(5500));
    }

    #[test]
    fn test_deserialize_rejects_invalid_settings() {
        let schema: BeatwiseQSchema =
            serde_json::from_str(r#"{"beatspan": [1, 8], "items": {"2": {"beatspan": [3, 16]}}}"#).unwrap();
        assert_eq!(schema.lookup(0).beatspan, Duration::new(1, 8));
        assert_eq!(schema.lookup(2).beatspan, Duration::new(3, 16));
        assert_eq!(schema.tempo(), MetronomeMark::default());

        assert!(serde_json::from_str::<BeatwiseQSchema>(r#"{"beatspan": [0, 1]}"#).is_err());
        assert!(serde_json::from_str::<BeatwiseQSchema>(r#"{"items": {"1": {"beatspan": [-1, 4]}}}"#).is_err());
        assert!(serde_json::from_str::<BeatwiseQSchemaItem>(r#"{"beatspan": [0, 1]}"#).is_err());
        assert!(serde_json::from_str::<BeatwiseQSchemaItem>(
            r#"{"tempo": {"reference_duration": [1, 4], "units_per_minute": [0, 1]}}"#
        )
        .is_err());
        assert!(serde_json::from_str::<MeasurewiseQSchemaItem>(
            r#"{"time_signature": {"numerator": 4, "denominator": 0}}"#
        )
        .is_err());
        assert!(serde_json::from_str::<QSchema>(
            r#"{"measurewise": {"time_signature": {"numerator": 0, "denominator": 4}}}"#
        )
        .is_err());
    }

    #[test]
    fn test_schema_item_serde() {
        let item: MeasurewiseQSchemaItem =
            serde_json::from_str(r#"{"time_signature": {"numerator": 5, "denominator": 8}}"#).unwrap();
        assert_eq!(item.time_signature, Some(TimeSignature::new(5, 8).unwrap()));
        assert_eq!(item.tempo, None);
        assert_eq!(item.use_full_measure, None);
    }
}
