//! Integration test harness
//!
//! End-to-end tests run the real fetch service against wiremock servers and
//! push records through the full crawl -> merge -> import pipeline.

mod harvest_tests;
