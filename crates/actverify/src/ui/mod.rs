//! Terminal rendering for command output

pub mod report;
