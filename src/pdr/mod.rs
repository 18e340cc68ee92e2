pub mod engine;
pub mod heading;
pub mod steps;

pub use engine::{PdrEngine, PdrStep, StepSource};
pub use heading::HeadingFusion;
pub use steps::{DetectedStep, StepDetector};
