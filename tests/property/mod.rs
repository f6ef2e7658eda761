//! Property tests for field selection rules

mod field_rules;
