use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("message {message_id} has no `{key}` property")]
    MissingProperty { message_id: String, key: &'static str },

    #[error("message {message_id} has an invalid `{key}` property: {value}")]
    InvalidProperty {
        message_id: String,
        key: &'static str,
        value: String,
    },

    #[error("unknown consume strategy: {0}")]
    UnknownStrategy(String),
}
