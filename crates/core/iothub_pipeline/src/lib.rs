//! The operation pipeline of an Azure IoT Hub device client
//!
//! The device intents (authenticate, get the twin, update the reported properties)
//! are submitted as [Operation]s to a [Pipeline], i.e. a chain of [Stage]s.
//! Each stage either handles an operation or passes it down to the next stage,
//! possibly decomposing it into lower-level operations.
//! The transport stages at the bottom of the pipeline only have to understand
//! protocol-neutral operations, as `SetAuthProviderArgs`, `SetSasToken`
//! and `SendIotRequest`.
//!
//! Completion flows upward through callbacks: each operation callback is called exactly once,
//! the operation carrying its error if it failed.
//!
//! ```
//! # use iothub_pipeline::*;
//! # use iothub_pipeline::test_helpers::FakeTransport;
//! # #[tokio::main]
//! # async fn main() -> Result<(), PipelineError> {
//! let transport = FakeTransport::new().with_response(200, r#"{"desired":{"fan_speed":3}}"#);
//! let pipeline = iothub_pipeline(transport).try_build()?;
//!
//! let twin = pipeline.get_twin().await?;
//! assert_eq!(twin.desired["fan_speed"], 3);
//! # Ok(())
//! # }
//! ```

mod auth;
mod errors;
mod events;
pub mod operation_flow;
mod operations;
mod pipeline;
mod request_response;
mod stage;
pub mod test_helpers;
mod twin;

pub use auth::*;
pub use errors::*;
pub use events::*;
pub use operations::*;
pub use pipeline::*;
pub use request_response::*;
pub use stage::*;
pub use twin::*;
