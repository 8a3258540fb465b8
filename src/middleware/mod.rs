//! HTTP middleware surface built on tower.

mod layer;
mod response;

pub use layer::{ThrottleLayer, ThrottleLayerBuilder, ThrottleService, WeightFn};
pub use response::ResponseShaper;
