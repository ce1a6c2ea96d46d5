use bot_types::ExchangeName;

/// Credentials required to instantiate an adapter. Deliberately has no
/// `Default` impl and every constructor requires `is_testnet` explicitly —
/// omitting it is a compile error, not a silent default to production.
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub exchange: ExchangeName,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
    pub proxy_url: Option<String>,
    pub is_testnet: bool,
}

impl ExchangeCredentials {
    pub fn new(
        exchange: ExchangeName,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        is_testnet: bool,
    ) -> Self {
        Self {
            exchange,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: None,
            proxy_url: None,
            is_testnet,
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }
}
