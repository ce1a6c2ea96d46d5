use exchange_port::error::ExchangeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OkxError {
    #[error("request build failed: {0}")]
    RequestBuild(#[from] reqwest::Error),
    #[error("okx api error {code}: {message}")]
    Api { code: String, message: String },
    #[error("failed to deserialize okx response: {0}")]
    Deserialization(String),
    #[error("okx returned no data for this request")]
    EmptyData,
}

impl From<OkxError> for ExchangeError {
    fn from(err: OkxError) -> Self {
        match &err {
            OkxError::Api { code, message } => match code.as_str() {
                "50011" | "50013" => ExchangeError::RateLimited(message.clone()),
                "50101" | "50102" | "50103" | "50104" => ExchangeError::Auth(message.clone()),
                "51001" => ExchangeError::SymbolUnknown(message.clone()),
                "51008" | "51004" => ExchangeError::InsufficientBalance(message.clone()),
                "51000" | "51006" | "51023" => ExchangeError::OrderRejected(message.clone()),
                _ => ExchangeError::Unavailable(format!("{code}: {message}")),
            },
            OkxError::RequestBuild(_) => ExchangeError::Network { operation: "http".into(), message: err.to_string() },
            OkxError::Deserialization(m) => ExchangeError::Decode(m.clone()),
            OkxError::EmptyData => ExchangeError::Decode("okx returned no data".into()),
        }
    }
}
