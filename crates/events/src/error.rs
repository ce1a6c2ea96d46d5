use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("failed to serialize event message: {0}")]
    Serialization(String),
}
