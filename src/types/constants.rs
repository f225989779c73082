//! Protocol constants: header names and configuration defaults

/// Protocol version advertised in challenge responses
pub const PROTOCOL_VERSION: &str = "1.0";

/// SDK version sent with every client request
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Header names used on the wire
///
/// Names are lowercase so they can be turned into `HeaderName`s with
/// `HeaderName::from_static`; header lookups are case-insensitive.
pub mod headers {
    /// Challenge protocol version
    pub const VERSION: &str = "x-402-version";
    /// Amount to pay, as a decimal string
    pub const AMOUNT: &str = "x-402-amount";
    /// Currency of the payment (`SOL` or `USDC`)
    pub const CURRENCY: &str = "x-402-currency";
    /// Recipient address
    pub const RECIPIENT: &str = "x-402-recipient";
    /// Single-use payment reference
    pub const REFERENCE: &str = "x-402-reference";
    /// Absolute expiry as unix seconds
    pub const EXPIRES: &str = "x-402-expires";
    /// Optional chain identifier
    pub const NETWORK: &str = "x-402-network";
    /// Signature proving the payment was made
    pub const PAYMENT_SIGNATURE: &str = "x-402-payment-signature";
    /// Reference the signature pays for
    pub const PAYMENT_REFERENCE: &str = "x-402-payment-reference";
    /// Client SDK version
    pub const SDK_VERSION: &str = "x-402-sdk-version";
}

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default API base URL
    pub const BASE_URL: &str = "https://api.x402agent.tech";
    /// Default per-request payment ceiling, in whole currency units
    pub const MAX_PAYMENT_PER_REQUEST: &str = "0.1";
    /// Default per-send timeout
    pub const TIMEOUT: Duration = Duration::from_secs(30);
    /// Default number of attempts for the initial send
    pub const RETRY_ATTEMPTS: u32 = 3;
    /// Base delay between transport retries
    pub const RETRY_DELAY: Duration = Duration::from_secs(1);
    /// Delay used when a 429 response carries no usable `Retry-After`
    pub const RATE_LIMIT_RETRY_AFTER: u64 = 60;
    /// Validity window of an issued challenge
    pub const CHALLENGE_EXPIRES_IN: Duration = Duration::from_secs(600);
}
