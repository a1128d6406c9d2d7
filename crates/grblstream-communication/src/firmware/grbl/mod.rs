//! GRBL 1.1 output classification and error/alarm descriptions

pub mod error_decoder;
pub mod response_parser;

pub use error_decoder::{describe_alarm, describe_error};
pub use response_parser::GrblLineClassifier;
