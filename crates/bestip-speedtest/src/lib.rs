// # Speed-Test Collaborators
//
// This crate connects the workflow to the external speed-test binary
// (`cfst` and compatible tools).
//
// - [`SpeedTestRunner`]: spawns the binary and moves its CSV into place
// - [`CsvResultParser`]: reads the CSV back into measurement records
//
// The runner never leaves a half-written artifact behind: the tool writes to
// a temporary path that is renamed over the result file only after a clean
// exit.

pub mod parser;
pub mod runner;

pub use parser::CsvResultParser;
pub use runner::SpeedTestRunner;
