//! Integration tests for the plugin runtime.

mod helpers;

mod dispatch_test;
mod manager_test;
mod scenario_test;
