/// Collaborator traits
///
/// The worker sees the trading venue only through these seams: a connector
/// that yields a session, the session's quote cache and order gateway, and
/// a listener it registers for execution reports.
///
/// ## Threading
/// - `TradingSession` calls happen on the owning worker thread
/// - `ExecutionReportListener` is invoked on the venue's own callback thread

use super::account::{Account, Credentials, OrderRequest};
use super::attempt::StageKind;
use super::error::VenueError;
use std::sync::Arc;
use std::time::Duration;

/// Exchange-assigned order identifier
pub type OrderId = String;

/// Asynchronous lifecycle event for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub correlation_id: String,
    pub stage: StageKind,
    pub terminal: bool,
}

/// Receives execution reports from the venue's delivery thread
pub trait ExecutionReportListener: Send + Sync {
    fn on_execution_report(&self, report: ExecutionReport);
}

/// Latest cached quotes
pub trait QuoteSource {
    fn best_bid(&self, symbol: &str) -> Option<f64>;

    fn best_ask(&self, symbol: &str) -> Option<f64>;

    /// Smallest price step of the symbol, if known
    fn price_increment(&self, symbol: &str) -> Option<f64>;
}

/// Synchronous order entry
pub trait OrderGateway {
    /// Blocks until the transport accepts or rejects the order
    fn submit(&self, request: &OrderRequest) -> Result<OrderId, VenueError>;

    fn close_position(&self, order_id: &str) -> Result<(), VenueError>;
}

/// One logged-on account session
pub trait TradingSession: QuoteSource + OrderGateway + Send {
    /// Waits until account metadata is available
    fn wait_ready(&self, timeout: Duration) -> Result<(), VenueError>;

    fn disconnect(&mut self);
}

/// Opens sessions; shared by every worker of a run
pub trait Venue: Send + Sync {
    fn connect(
        &self,
        account: &Account,
        credentials: &Credentials,
        listener: Arc<dyn ExecutionReportListener>,
    ) -> Result<Box<dyn TradingSession>, VenueError>;
}
