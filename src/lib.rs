pub mod metrics;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod providers;
pub mod transformations;
pub mod utils;
