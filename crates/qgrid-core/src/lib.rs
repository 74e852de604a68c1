//! qgrid-core: Rhythm quantization over nested ratio grids

mod error;
mod event;
pub mod grace;
mod grid;
pub mod heuristic;
mod job;
pub mod job_handler;
pub mod notation;
mod offset;
pub mod optimizer;
mod proxy;
pub mod schema;
pub mod search_tree;
mod sequence;
pub mod target;

pub use error::{QuantizeError, Result};
pub use event::{Attachment, Pitch, QEvent};
pub use grace::{
    CollapsingGraceHandler, ConcatenatingGraceHandler, DiscardingGraceHandler,
    GraceContainer, GraceHandler, GraceHandling, GraceLeaf, GraceResult,
};
pub use grid::{AnnotatedLeaf, NodeId, QGrid, QGridContainer, QGridLeaf, QGridNode};
pub use heuristic::{DistanceHeuristic, Heuristic};
pub use job::QuantizationJob;
pub use job_handler::{JobHandler, SerialJobHandler};
pub use notation::{LeafKind, NotatedBeat, NotatedLeaf, NotatedMeasure, Notation};
pub use offset::{is_dyadic, Duration, MetronomeMark, RationalOffset, TimeSignature};
pub use optimizer::{AttackPointOptimization, AttackPointOptimizer};
pub use optimizer::{MeasurewiseAttackPointOptimizer, NaiveAttackPointOptimizer, NullAttackPointOptimizer};
pub use proxy::QEventProxy;
pub use schema::{BeatwiseQSchema, BeatwiseQSchemaItem, BeatwiseSetting};
pub use schema::{MeasurewiseQSchema, MeasurewiseQSchemaItem, MeasurewiseSetting, QSchema};
pub use search_tree::{
    Definition, DefinitionBranch, SearchStrategy, SearchTree, Subdivision, SubdivisionCommand,
    UnweightedSearchTree, WeightedDefinition, WeightedSearchTree, DEFAULT_DEFINITION,
};
pub use sequence::QEventSequence;
pub use target::{BeatwiseQTarget, MeasurewiseQTarget, QTarget, QTargetBeat, QTargetMeasure, QuantizeOptions};
