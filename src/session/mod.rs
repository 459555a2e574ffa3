pub mod controller;
pub mod pipeline;
pub mod policy;

pub use controller::SessionController;
pub use pipeline::{PassOutcome, PassRequest, PassStage, Pipeline};
pub use policy::{TrainingCursor, TrainingTrigger};
