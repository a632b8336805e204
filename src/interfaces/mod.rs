/// Interfaces Layer - Process Entry Points
///
/// ## Modules
/// - `cli`: Command-line run configuration and the sweep entry point

pub mod cli;
