pub mod config;
pub mod errors;
pub mod graph;
pub mod perception;
pub mod registration;

pub use crate::config::RegistrationConfig;
pub use crate::errors::{ScenefitError, ScenefitResult};
pub use crate::graph::{GraphModel, ModelNode};
pub use crate::perception::traits::{ElementDetector, ScreenCapture};
pub use crate::perception::types::{Detection, Frame, Rect};
pub use crate::registration::engine::{RegistrationEngine, RegistrationOptions};
pub use crate::registration::transform::{FitReport, FitStrategy, ViewTransform};
