pub mod boosting;
pub mod evaluation;
pub mod experiments;
pub mod features;
pub mod forecast;
pub mod linear;
