pub mod consume_strategy;
pub mod errors;
pub mod message;
pub mod protocol;
