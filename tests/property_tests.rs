//! Property tests entry point
//!
//! Property modules live under property/ and are compiled into one test binary.

mod property;
