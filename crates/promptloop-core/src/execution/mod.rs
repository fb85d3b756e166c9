//! Running a test case against the model under test.
//!
//! - [`executor`]: `execute_once`, one isolated model call, never errors
//! - [`coordinator`]: `run_parallel`, N concurrent executions, index-ordered

pub mod coordinator;
pub mod executor;

pub use coordinator::run_parallel;
pub use executor::execute_once;
