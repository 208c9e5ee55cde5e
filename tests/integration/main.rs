//! Integration tests for Sumi-Fetch
//!
//! These tests use wiremock to stand in for the hosts being fetched and run
//! the whole fetch loop end-to-end against temporary files.

mod fetch_tests;
mod partition_tests;
