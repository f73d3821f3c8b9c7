pub mod dataset;
pub mod evaluate;
