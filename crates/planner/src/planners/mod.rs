//! Built-in planners.

pub mod simple_demo;

pub use simple_demo::SimpleDemoPlanner;
