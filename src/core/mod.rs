// Core modules implementing input readiness, line decoding, and error modeling.
pub mod error;
pub mod readiness;
pub mod reader;
pub mod record;
