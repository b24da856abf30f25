pub mod citation;
pub mod domain;
pub mod error;
pub mod protocol;
