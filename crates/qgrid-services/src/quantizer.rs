//! Quantizer façade: schema in, notation out

use qgrid_core::{GraceHandler, Notation, QEventSequence, QSchema, QuantizeError, QuantizeOptions};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, QuantizerConfig};

#[derive(Debug, Error)]
pub enum QuantizerError {
    #[error("Quantization error: {0}")]
    Quantize(#[from] QuantizeError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Owns the collaborators and runs sequences against schemas.
///
/// The grace handler is reused between runs, so a discarding handler keeps
/// accumulating what it threw away.
#[derive(Debug, Default)]
pub struct Quantizer {
    options: QuantizeOptions,
}

impl Quantizer {
    pub fn new(options: QuantizeOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &QuantizerConfig) -> Result<Self, QuantizerError> {
        let options = QuantizeOptions {
            grace_handler: config.grace_handler()?,
            job_handler: config.job_handler(),
            attack_point_optimizer: config.attack_point_optimizer(),
            attach_tempos: config.attach_tempos,
            ..Default::default()
        };
        Ok(Self::new(options))
    }

    pub fn options(&self) -> &QuantizeOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut QuantizeOptions {
        &mut self.options
    }

    pub fn quantize(&mut self, sequence: &QEventSequence, schema: &QSchema) -> Result<Notation, QuantizerError> {
        let duration_in_ms = sequence.duration_in_ms();
        let target = schema.target(duration_in_ms);
        info!(
            events = sequence.len(),
            duration_ms = %duration_in_ms,
            job_handler = self.options.job_handler.name(),
            grace_handler = self.options.grace_handler.name(),
            "Quantizing sequence"
        );
        Ok(target.quantize(sequence, &mut self.options)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, OptimizerKind};
    use qgrid_core::{
        BeatwiseQSchema, Duration, GraceHandling, LeafKind, MeasurewiseQSchema, MeasurewiseQSchemaItem, NotatedLeaf,
        Pitch, TimeSignature,
    };

    fn melody() -> QEventSequence {
        let pairs = vec![
            (1000, Some(vec![Pitch::from(0)])),
            (500, Some(vec![Pitch::from(2)])),
            (500, Some(vec![Pitch::from(4), Pitch::from(7)])),
            (1000, None),
            (1500, Some(vec![Pitch::from(5)])),
            (500, Some(vec![Pitch::from(4)])),
        ];
        QEventSequence::from_millisecond_pitch_pairs(pairs).unwrap()
    }

    fn kinds(leaves: &[&NotatedLeaf]) -> Vec<LeafKind> {
        leaves.iter().map(|leaf| leaf.kind.clone()).collect()
    }

    #[test]
    fn test_beatwise_end_to_end() {
        let mut quantizer = Quantizer::default();
        let schema = QSchema::from(BeatwiseQSchema::default());
        let notation = quantizer.quantize(&melody(), &schema).unwrap();
        assert_eq!(notation.beats().len(), 5);
        assert_eq!(notation.duration(), Duration::new(5, 4));
        let rtm: Vec<&str> = notation.beats().into_iter().map(|beat| beat.rtm_format.as_str()).collect();
        assert_eq!(rtm, vec!["1", "(1 (1 1))", "1", "1", "(1 (1 1))"]);
        let leaves = notation.leaves();
        assert_eq!(
            kinds(&leaves),
            vec![
                LeafKind::Note(Pitch::from(0)),
                LeafKind::Note(Pitch::from(2)),
                LeafKind::Chord(vec![Pitch::from(4), Pitch::from(7)]),
                LeafKind::Rest,
                LeafKind::Note(Pitch::from(5)),
                LeafKind::Note(Pitch::from(5)),
                LeafKind::Note(Pitch::from(4)),
            ]
        );
        assert!(leaves[5].tied);
    }

    #[test]
    fn test_measurewise_end_to_end_parallel() {
        let config = parse_config("[jobs]\nparallel = true\nworkers = 2\n").unwrap();
        let mut quantizer = Quantizer::from_config(&config).unwrap();
        let schema = QSchema::from(MeasurewiseQSchema::default());
        let notation = quantizer.quantize(&melody(), &schema).unwrap();
        let Notation::Measurewise { measures } = &notation else {
            panic!("expected measurewise notation");
        };
        assert_eq!(measures.len(), 2);
        assert_eq!(notation.duration(), Duration::from_integer(2));

        let mut serial = Quantizer::default();
        let expected = serial.quantize(&melody(), &schema).unwrap();
        let rtm = |n: &Notation| n.beats().iter().map(|beat| beat.rtm_format.clone()).collect::<Vec<_>>();
        assert_eq!(rtm(&notation), rtm(&expected));
    }

    #[test]
    fn test_time_signature_changes() {
        let schema = MeasurewiseQSchema::default()
            .with_item(1, MeasurewiseQSchemaItem { time_signature: TimeSignature::new(3, 4).ok(), ..Default::default() });
        let notation = Quantizer::default().quantize(&melody(), &QSchema::from(schema)).unwrap();
        let Notation::Measurewise { measures } = &notation else {
            panic!("expected measurewise notation");
        };
        assert_eq!(measures.len(), 2);
        assert_eq!(measures[1].time_signature, TimeSignature::new(3, 4).unwrap());
        assert_eq!(measures[1].beats.len(), 3);
        assert_eq!(measures[1].beats[0].leaves[0].time_signature, TimeSignature::new(3, 4).ok());
    }

    #[test]
    fn test_from_config_collaborators() {
        let config = parse_config("attach_tempos = false\noptimizer = \"null\"\n[grace]\nkind = \"collapsing\"\n").unwrap();
        assert_eq!(config.optimizer, OptimizerKind::Null);
        let mut quantizer = Quantizer::from_config(&config).unwrap();
        assert!(matches!(quantizer.options().grace_handler, GraceHandling::Collapsing(_)));
        assert!(!quantizer.options().attach_tempos);
        let notation = quantizer.quantize(&melody(), &QSchema::from(BeatwiseQSchema::default())).unwrap();
        assert!(notation.leaves().iter().all(|leaf| leaf.tempo.is_none()));
    }

    #[test]
    fn test_job_handler_failure_is_a_quantize_error() {
        let err = QuantizerError::from(QuantizeError::from(crate::parallel::JobHandlerError::JobPanicked { job_id: 2 }));
        assert!(matches!(err, QuantizerError::Quantize(QuantizeError::JobFailed { job_id: 2, .. })));
    }

    #[test]
    fn test_invalid_config_surfaces() {
        let config = parse_config("[grace]\ngrace_duration = [1, 6]\n").unwrap();
        assert!(matches!(Quantizer::from_config(&config), Err(QuantizerError::Config(_))));
    }
}
