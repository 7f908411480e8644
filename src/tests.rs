// Cross-module tests for the state stream
//
// Shared fixtures live in `support`; property-based invariants over
// randomly generated streams live in `property_tests`. Module-local tests
// sit at the bottom of each source file.

pub mod support;
