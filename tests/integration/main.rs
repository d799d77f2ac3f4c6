//! Integration tests for the Libris server

mod api_tests;
mod borrowing_tests;
mod search_tests;
