use crate::events::PipelineEvent;
use crate::operation_flow;
use crate::operations::Operation;
use log::warn;
use std::sync::Arc;
use std::sync::Weak;

/// A node of the pipeline
///
/// A stage either handles an operation itself or passes it unchanged to the next stage.
/// Symmetrically, a stage either handles an event or passes it to the previous stage.
///
/// Stages are not given their neighbours:
/// these are reached through the [StageContext] provided along each operation and event.
pub trait Stage: 'static + Send + Sync {
    fn name(&self) -> &str;

    /// Handle an operation travelling down the pipeline
    fn run_op(&self, ctx: &StageContext, op: Operation);

    /// Handle an event travelling up the pipeline
    fn handle_event(&self, ctx: &StageContext, event: PipelineEvent) {
        operation_flow::pass_event_to_previous_stage(ctx, event)
    }
}

/// The handler of the events reaching the top of the pipeline
pub type EventHandler = Box<dyn Fn(PipelineEvent) + Send + Sync + 'static>;

/// The stages of a pipeline, fixed at construction
///
/// The chain is owned by the [Pipeline](crate::Pipeline) handles only.
/// Stage contexts refer to it weakly, so the callbacks of pending operations
/// don't keep alive the stages that hold these operations.
pub(crate) struct StageChain {
    stages: Vec<Box<dyn Stage>>,
    names: Vec<Arc<str>>,
    event_handler: Option<EventHandler>,
}

impl StageChain {
    pub(crate) fn new(stages: Vec<Box<dyn Stage>>, event_handler: Option<EventHandler>) -> Self {
        let names = stages.iter().map(|stage| Arc::from(stage.name())).collect();
        StageChain {
            stages,
            names,
            event_handler,
        }
    }

    pub(crate) fn run_op(&self, ctx: &StageContext, op: Operation) {
        self.stages[ctx.index].run_op(ctx, op)
    }

    pub(crate) fn handle_event(&self, ctx: &StageContext, event: PipelineEvent) {
        self.stages[ctx.index].handle_event(ctx, event)
    }

    /// Hand an event over to the pipeline owner
    pub(crate) fn deliver_event(&self, event: PipelineEvent) {
        match &self.event_handler {
            Some(handler) => handler(event),
            None => warn!("No handler for pipeline event: {event:?}"),
        }
    }
}

/// The position of a stage in its pipeline
///
/// Cloning a context is cheap, and a clone can be moved into the callback of a sub-operation
/// to resume the work of the stage once that sub-operation completes.
///
/// A context doesn't keep the pipeline alive.
/// Once all the [Pipeline](crate::Pipeline) handles are dropped,
/// the neighbours of a stage are no longer reachable.
#[derive(Clone)]
pub struct StageContext {
    chain: Weak<StageChain>,
    index: usize,
    name: Arc<str>,
}

impl StageContext {
    pub(crate) fn root(chain: &Arc<StageChain>) -> Self {
        StageContext::at(chain, 0)
    }

    fn at(chain: &Arc<StageChain>, index: usize) -> Self {
        StageContext {
            chain: Arc::downgrade(chain),
            index,
            name: chain.names[index].clone(),
        }
    }

    pub fn stage_name(&self) -> &str {
        &self.name
    }

    /// The chain this stage belongs to, unless the pipeline has been dropped
    pub(crate) fn chain(&self) -> Option<Arc<StageChain>> {
        self.chain.upgrade()
    }

    pub(crate) fn next(&self, chain: &Arc<StageChain>) -> Option<StageContext> {
        let index = self.index + 1;
        (index < chain.stages.len()).then(|| StageContext::at(chain, index))
    }

    pub(crate) fn previous(&self, chain: &Arc<StageChain>) -> Option<StageContext> {
        self.index
            .checked_sub(1)
            .map(|index| StageContext::at(chain, index))
    }
}
