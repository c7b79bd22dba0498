pub mod export;
pub mod metrics;

pub use metrics::Metrics;
