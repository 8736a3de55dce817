//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against mock
//! adapters or the simulated rig.  No instruments required.

mod control_scenarios;
mod mock_hw;
mod persistence_tests;
mod service_tests;
