pub mod aggregator;
pub mod config;
pub mod gemini;
pub mod heuristic;
pub mod lifecycle;
pub mod normalizer;
