use crate::auth::AuthenticationProvider;
use crate::auth::UseAuthProviderStage;
use crate::errors::PipelineError;
use crate::events::PipelineEvent;
use crate::operations::Connect;
use crate::operations::Disconnect;
use crate::operations::GetTwin;
use crate::operations::Operation;
use crate::operations::OperationKind;
use crate::operations::PatchTwinReportedProperties;
use crate::operations::SetAuthProvider;
use crate::request_response::CoordinateRequestAndResponseStage;
use crate::stage::EventHandler;
use crate::stage::Stage;
use crate::stage::StageChain;
use crate::stage::StageContext;
use crate::twin::HandleTwinOperationsStage;
use crate::twin::Twin;
use futures::channel::oneshot;
use serde_json::Map;
use serde_json::Value;
use std::sync::Arc;

/// Build the pipeline of an IoT Hub device client on top of a transport stage
///
/// The operations go through:
/// - the [UseAuthProviderStage],
/// - the [HandleTwinOperationsStage],
/// - the [CoordinateRequestAndResponseStage],
/// - the transport stage.
pub fn iothub_pipeline(transport: impl Stage) -> PipelineBuilder {
    PipelineBuilder::new()
        .with_stage(UseAuthProviderStage)
        .with_stage(HandleTwinOperationsStage)
        .with_stage(CoordinateRequestAndResponseStage::default())
        .with_stage(transport)
}

/// Assemble stages into a pipeline
///
/// The stages are listed top-down: the first one receives the operations submitted to the pipeline.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
    event_handler: Option<EventHandler>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        PipelineBuilder::default()
    }

    /// Add a stage below the stages already added
    pub fn with_stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Set the handler of the events reaching the top of the pipeline
    pub fn with_event_handler(
        mut self,
        handler: impl Fn(PipelineEvent) + Send + Sync + 'static,
    ) -> Self {
        self.event_handler = Some(Box::new(handler));
        self
    }

    pub fn try_build(self) -> Result<Pipeline, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        let chain = Arc::new(StageChain::new(self.stages, self.event_handler));
        let root = StageContext::root(&chain);
        Ok(Pipeline { chain, root })
    }
}

/// A chain of stages, fixed once built
///
/// The stages live as long as a clone of the pipeline.
/// When the last one is dropped, the requests still waiting for a response
/// are completed with a [PipelineError::PipelineClosed] error.
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<StageChain>,
    root: StageContext,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Submit an operation to the first stage
    ///
    /// The operation callback is called once the operation completes,
    /// possibly from another thread than the caller's.
    pub fn run_op(&self, op: Operation) {
        self.chain.run_op(&self.root, op)
    }

    /// Submit an operation and wait for its completion
    pub async fn await_completion(
        &self,
        op: impl Into<OperationKind>,
    ) -> Result<OperationKind, PipelineError> {
        let (sender, receiver) = oneshot::channel();
        self.run_op(Operation::new(op, move |completed: Operation| {
            let _ = sender.send(completed.into_result());
        }));
        receiver.await?
    }

    pub async fn set_auth_provider(
        &self,
        auth_provider: Arc<dyn AuthenticationProvider>,
    ) -> Result<(), PipelineError> {
        self.await_completion(SetAuthProvider::new(auth_provider))
            .await
            .map(|_| ())
    }

    pub async fn connect(&self) -> Result<(), PipelineError> {
        self.await_completion(Connect).await.map(|_| ())
    }

    pub async fn disconnect(&self) -> Result<(), PipelineError> {
        self.await_completion(Disconnect).await.map(|_| ())
    }

    pub async fn get_twin(&self) -> Result<Twin, PipelineError> {
        match self.await_completion(GetTwin::default()).await? {
            OperationKind::GetTwin(GetTwin { twin }) => Ok(twin.unwrap_or_default()),
            other => Err(PipelineError::UnexpectedOperation {
                expected: "GetTwin",
                actual: other.name(),
            }),
        }
    }

    pub async fn patch_twin_reported_properties(
        &self,
        patch: Map<String, Value>,
    ) -> Result<(), PipelineError> {
        self.await_completion(PatchTwinReportedProperties::new(patch))
            .await
            .map(|_| ())
    }
}
