pub mod matchdtos;
pub mod queuedtos;
