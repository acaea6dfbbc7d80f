// Library module for the scorecard pipeline

pub mod pipeline;
