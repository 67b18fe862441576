//! Application layer - Use cases and orchestration
//!
//! Runs chaos experiments through their phases, enforces safety policies,
//! scores results and coordinates multi-region runs. Port definitions here
//! are implemented by the infrastructure layer.

pub mod cancellation;
pub mod error;
pub mod ports;
pub mod services;

pub use cancellation::CancellationToken;
pub use error::ApplicationError;
pub use ports::*;
pub use services::*;
