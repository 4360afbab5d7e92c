pub mod port;

pub use port::{DecisionPort, PolicyPort, RecoveryDecision, RecoveryOption, RecoveryPrompt};
