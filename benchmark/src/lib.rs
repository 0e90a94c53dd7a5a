//! Scenarios shared by the benchmarks.
//!
//! Every scenario runs the scheduler to completion, leaving its stacks free for the next iteration.

pub mod channel;
pub mod round_robin;
