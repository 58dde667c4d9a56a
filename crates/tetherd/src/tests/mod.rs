//! Test suites for the tether server.

mod support;
