//! Application module for the msgbus benchmark binary

pub mod bench;
pub mod cli;
pub mod startup;
