pub mod config;
pub mod harness;
pub mod optimizer;
pub mod report;
pub mod util;
