//! Telemetry feature vector produced by a controller.

use crate::config::Metric;

/// Encoding of the current phase within an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseFeature {
    /// Raw phase index as a scalar.
    Index(f64),
    /// One-hot vector over the phase program.
    OneHot(Vec<f64>),
}

impl PhaseFeature {
    fn dim(&self) -> usize {
        match self {
            PhaseFeature::Index(_) => 1,
            PhaseFeature::OneHot(v) => v.len(),
        }
    }
}

/// One intersection's telemetry summary for a single step.
///
/// The phase feature (when collected) always comes first in the flattened
/// vector; the remaining metrics follow in configured order.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Phase encoding, present when `CurrentPhase` is a state metric.
    pub phase: Option<PhaseFeature>,
    /// Aggregated detector metrics in configured order.
    pub metrics: Vec<(Metric, f64)>,
}

impl Observation {
    /// The aggregated value of a detector metric, if collected.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
    }

    /// Flattens the observation into a feature vector.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.dim());
        match &self.phase {
            Some(PhaseFeature::Index(i)) => out.push(*i),
            Some(PhaseFeature::OneHot(v)) => out.extend_from_slice(v),
            None => {}
        }
        out.extend(self.metrics.iter().map(|(_, v)| *v));
        out
    }

    /// Length of the flattened feature vector.
    pub fn dim(&self) -> usize {
        self.phase.as_ref().map_or(0, PhaseFeature::dim) + self.metrics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_index_comes_first() {
        let obs = Observation {
            phase: Some(PhaseFeature::Index(2.0)),
            metrics: vec![(Metric::QueueLength, 4.0), (Metric::MeanSpeed, 8.5)],
        };
        assert_eq!(obs.to_vec(), vec![2.0, 4.0, 8.5]);
        assert_eq!(obs.dim(), 3);
    }

    #[test]
    fn one_hot_expands_dimension() {
        let obs = Observation {
            phase: Some(PhaseFeature::OneHot(vec![0.0, 1.0, 0.0, 0.0])),
            metrics: vec![(Metric::QueueLength, 4.0)],
        };
        assert_eq!(obs.to_vec(), vec![0.0, 1.0, 0.0, 0.0, 4.0]);
        assert_eq!(obs.dim(), 5);
    }

    #[test]
    fn metric_lookup() {
        let obs = Observation {
            phase: None,
            metrics: vec![(Metric::HaltCount, 3.0)],
        };
        assert_eq!(obs.metric(Metric::HaltCount), Some(3.0));
        assert_eq!(obs.metric(Metric::Occupancy), None);
    }
}
