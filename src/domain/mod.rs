/// Domain Layer - Core Measurement Model
///
/// Pure types and the thread-safe correlator; no threads are spawned here
/// and nothing talks to a venue directly.
///
/// ## Modules
/// - `account`: Accounts, credentials and order shapes
/// - `attempt`: In-flight orders, stage samples, correlation ids
/// - `correlator`: Correlation id -> attempt map shared with the report thread
/// - `ports`: Traits for the external trading collaborators
/// - `error`: Venue and correlator errors

pub mod account;
pub mod attempt;
pub mod correlator;
pub mod error;
pub mod ports;

// Re-export key types
pub use account::{Account, Credentials, OrderRequest, OrderTemplate, Side, TimeInForce};
pub use attempt::{
    AttemptStatus, CompletedAttempt, CorrelationIdGenerator, OrderAttempt, StageKind, StageSample,
};
pub use correlator::{AttemptHandle, LatencyCorrelator, ReportOutcome};
pub use error::{CorrelatorError, VenueError};
pub use ports::{
    ExecutionReport, ExecutionReportListener, OrderGateway, OrderId, QuoteSource, TradingSession,
    Venue,
};
