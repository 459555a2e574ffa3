pub mod model_weights;
pub mod moves;
