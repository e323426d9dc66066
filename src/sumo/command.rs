//! Simulator invocation composition.

use crate::config::SimulationConfig;

/// A composed simulator invocation: binary name plus arguments.
///
/// The collision policy is fixed and always appended: colliding vehicles are
/// removed, junction collisions are checked, and only physical contact
/// (mingap factor 0) registers as a collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumoCommand {
    pub binary: String,
    pub args: Vec<String>,
}

impl SumoCommand {
    /// Composes the invocation for a simulation configuration.
    pub fn compose(config: &SimulationConfig) -> Self {
        let binary = if config.gui { "sumo-gui" } else { "sumo" };

        let mut args = vec![
            "-c".to_string(),
            config.sumocfg_path().to_string_lossy().into_owned(),
        ];
        if config.no_warnings {
            args.push("--no-warnings".to_string());
        }
        args.extend(
            [
                "--collision.action",
                "remove",
                "--collision.check-junctions",
                "--collision.mingap-factor",
                "0",
            ]
            .map(String::from),
        );

        Self {
            binary: binary.to_string(),
            args,
        }
    }
}
