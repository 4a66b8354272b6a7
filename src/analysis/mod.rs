mod growth;

pub use growth::{GrowthAnalyzer, GrowthOptions, GrowthReport};
