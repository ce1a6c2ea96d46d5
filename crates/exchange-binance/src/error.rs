use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinanceError {
    #[error("failed to build the HTTP request: {0}")]
    RequestBuild(#[from] reqwest::Error),

    #[error("binance API error {0}: {1}")]
    Api(i64, String),

    #[error("failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("invalid data format from API: {0}")]
    InvalidData(String),
}

impl From<BinanceError> for exchange_port::ExchangeError {
    fn from(err: BinanceError) -> Self {
        use exchange_port::ExchangeError as E;
        match err {
            BinanceError::RequestBuild(e) => E::Network { operation: "http".into(), message: e.to_string() },
            BinanceError::Api(code, msg) => match code {
                -1021 | -1003 => E::RateLimited(msg),
                -2014 | -2015 => E::Auth(msg),
                -1121 => E::SymbolUnknown(msg),
                -2019 => E::InsufficientBalance(msg),
                -2010 => E::OrderRejected(msg),
                _ => E::Unavailable(format!("{code}: {msg}")),
            },
            BinanceError::Deserialization(m) => E::Decode(m),
            BinanceError::InvalidData(m) => E::Decode(m),
        }
    }
}
