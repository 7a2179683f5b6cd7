pub mod backends;
pub mod error;
pub mod inventory;
pub mod power;
pub mod props;
pub mod shutdown;
pub mod task;
pub mod traits;
pub mod types;

pub use backends::{RouterEndpoint, SimBackend, SimOptions, VSphereBackend};
pub use error::{Result, VmError};
pub use inventory::Inventory;
pub use power::{PowerAction, PowerExecutor, PowerReport, ShutdownReport};
pub use shutdown::{ShutdownOutcome, ShutdownPoller};
pub use task::{TaskOutcome, TaskWaiter};
pub use traits::Endpoint;
pub use types::*;
