//! Stable error codes reported in execution results

pub const CAPABILITY_NOT_FOUND: &str = "CAPABILITY_NOT_FOUND";
pub const INVALID_PARAMETERS: &str = "INVALID_PARAMETERS";
pub const EXECUTION_FAILED: &str = "EXECUTION_FAILED";
pub const STEP_FAILED: &str = "STEP_FAILED";
pub const MULTI_STEP_FAILED: &str = "MULTI_STEP_FAILED";
pub const INVALID_PLAN: &str = "INVALID_PLAN";
