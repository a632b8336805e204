/// Accounts and order shapes
///
/// An `Account` is fixed for a worker's whole lifetime. `OrderTemplate`
/// describes what every order of a run looks like; `OrderRequest` is the
/// concrete submission handed to the gateway.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// One trading account under load
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Login / account identifier
    pub id: String,

    /// Target orders per one-second window
    pub target_rate: u32,

    /// Optional per-account bound on trading time
    pub max_duration: Option<Duration>,

    /// Optional cap on open positions kept between windows
    pub persist_cap: Option<usize>,
}

impl Account {
    pub fn new(id: impl Into<String>, target_rate: u32) -> Self {
        Self {
            id: id.into(),
            target_rate,
            max_duration: None,
            persist_cap: None,
        }
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn with_persist_cap(mut self, cap: usize) -> Self {
        self.persist_cap = Some(cap);
        self
    }
}

/// Login credentials and server address
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub server: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("password", &"***")
            .finish()
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    /// Immediate-or-cancel
    Ioc,
}

/// Shape shared by every order a worker sends
#[derive(Debug, Clone)]
pub struct OrderTemplate {
    pub symbol: Arc<str>,
    pub side: Side,
    pub time_in_force: TimeInForce,
    pub volume: f64,

    /// Price increments added in the aggressive direction
    pub price_offset: i32,
}

impl Default for OrderTemplate {
    fn default() -> Self {
        Self {
            symbol: Arc::from("EURUSD"),
            side: Side::Buy,
            time_in_force: TimeInForce::Ioc,
            volume: 100_000.0,
            price_offset: 10,
        }
    }
}

/// A single submission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub correlation_id: String,
    pub symbol: Arc<str>,
    pub side: Side,
    pub time_in_force: TimeInForce,
    pub price: f64,
    pub volume: f64,
}
