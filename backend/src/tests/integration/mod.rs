pub mod deadlines;
pub mod engine;
