// Declare the modules to re-export
#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "pubsub")]
pub mod pubsub;
#[cfg(feature = "trending")]
pub mod trending;

// Re-export the primary types
#[cfg(feature = "configs")]
pub use configs::config_app::*;
#[cfg(feature = "loggers")]
pub use loggers::loggerlocal::*;
#[cfg(feature = "pubsub")]
pub use pubsub::session::*;
#[cfg(feature = "trending")]
pub use trending::engine::*;
#[cfg(feature = "trending")]
pub use trending::store::*;
