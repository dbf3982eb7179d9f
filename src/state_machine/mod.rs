// State definitions for retrying upload units
//
// The lifecycle itself is driven by `execution::unit`; this module only holds
// the tagged states and the outcome vocabulary shared with reporting.

pub mod states;

pub use states::{AttemptResponse, UnitOutcome, UnitState};
