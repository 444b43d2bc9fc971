//! Acceptance scenarios for the stealwatch measurement loop.

mod common;
mod config_test;
mod loop_test;
mod steal_source_test;
