//! Hardware acceptance tests for the cycle timer.

mod busy_wait_test;
mod common;
mod independence_test;
mod monotonic_test;
