//! Phase classification and regulatory minimum durations.

use std::fmt;

use crate::sumo::PhaseDef;

/// Classification of a signal phase by its state string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Green,
    Amber,
    AllRed,
    Clearance,
}

impl PhaseKind {
    /// Classifies a raw signal-state string.
    ///
    /// An active green character anywhere makes the phase green; otherwise
    /// an amber character makes it amber; a string of only red signals is
    /// all-red; anything else is a clearance phase.
    pub fn classify(state: &str) -> Self {
        if state.contains(['G', 'g']) {
            PhaseKind::Green
        } else if state.contains(['y', 'Y']) {
            PhaseKind::Amber
        } else if state.chars().all(|c| c == 'r') {
            PhaseKind::AllRed
        } else {
            PhaseKind::Clearance
        }
    }

    /// Regulatory minimum display time in seconds for this phase kind.
    pub fn regulatory_min_duration(&self) -> f64 {
        match self {
            PhaseKind::Green => 7.0,
            PhaseKind::Amber => 3.0,
            PhaseKind::AllRed => 1.0,
            PhaseKind::Clearance => 3.0,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Green => "green",
            PhaseKind::Amber => "amber",
            PhaseKind::AllRed => "all-red",
            PhaseKind::Clearance => "clearance",
        };
        write!(f, "{}", name)
    }
}

/// One classified phase of a traffic-light program. Immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    /// Position within the program.
    pub index: usize,
    /// Programmed duration in seconds.
    pub duration: f64,
    /// Raw signal-state string.
    pub state: String,
    /// Classified kind.
    pub kind: PhaseKind,
}

impl Phase {
    /// Builds a classified phase from a raw program entry.
    pub fn from_def(index: usize, def: &PhaseDef) -> Self {
        Self {
            index,
            duration: def.duration,
            state: def.state.clone(),
            kind: PhaseKind::classify(&def.state),
        }
    }

    /// Regulatory minimum display time for this phase.
    pub fn regulatory_min_duration(&self) -> f64 {
        self.kind.regulatory_min_duration()
    }
}
