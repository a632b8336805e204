/// Infrastructure Layer - Technical Implementations
///
/// Everything that touches the outside world: the venue implementation,
/// the result file and the HTTP observability endpoints.
///
/// ## Modules
/// - `simulated`: In-process venue implementing the collaborator traits
/// - `report_writer`: Append-only delimited result file
/// - `observability`: Health checker and `/metrics` server

pub mod observability;
pub mod report_writer;
pub mod simulated;

// Re-export key types
pub use observability::{HealthChecker, ObservabilityServer};
pub use report_writer::ReportWriter;
pub use simulated::{SimulatedVenue, VenueProfile};
