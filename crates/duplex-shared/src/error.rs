use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to encode wire frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode wire frame: {0}")]
    Decode(#[source] serde_json::Error),
}
