//! How operations flow along the pipeline
//!
//! These functions are the only way for a stage to reach its neighbours:
//! - passing an operation to the next stage,
//! - completing an operation, i.e. notifying the stage that submitted it,
//! - running a sequence of sub-operations in serial,
//! - passing an event to the previous stage.

use crate::errors::PipelineError;
use crate::events::PipelineEvent;
use crate::operations::Operation;
use crate::operations::OperationCallback;
use crate::operations::OperationKind;
use crate::stage::StageContext;
use log::debug;
use log::error;
use log::warn;
use std::collections::VecDeque;

/// Hand an operation to the next stage
///
/// If there is no next stage, the pipeline is malformed:
/// the operation is completed with an [PipelineError::UnhandledOperation] error.
/// If the pipeline has been dropped, the operation is completed with a [PipelineError::PipelineClosed] error.
pub fn pass_op_to_next_stage(ctx: &StageContext, mut op: Operation) {
    let Some(chain) = ctx.chain() else {
        warn!(
            "{}({}): the pipeline has been dropped",
            ctx.stage_name(),
            op.name()
        );
        let operation = op.name();
        op.set_error(PipelineError::PipelineClosed { operation });
        return complete_op(ctx, op);
    };

    match ctx.next(&chain) {
        Some(next) => {
            debug!(
                "{}({}): passing to next stage {}",
                ctx.stage_name(),
                op.name(),
                next.stage_name()
            );
            chain.run_op(&next, op)
        }
        None => {
            error!(
                "{}({}): no next stage, the pipeline is malformed",
                ctx.stage_name(),
                op.name()
            );
            let err = PipelineError::UnhandledOperation {
                stage: ctx.stage_name().to_string(),
                operation: op.name(),
            };
            op.set_error(err);
            complete_op(ctx, op)
        }
    }
}

/// Complete an operation, calling its callback
///
/// # Panics
///
/// Completing twice the same operation is a bug of the stage doing so.
pub fn complete_op(ctx: &StageContext, mut op: Operation) {
    let Some(callback) = op.take_callback() else {
        panic!(
            "{}({}): the operation has already been completed",
            ctx.stage_name(),
            op.name()
        );
    };

    match op.error() {
        None => debug!("{}({}): completed", ctx.stage_name(), op.name()),
        Some(err) => debug!(
            "{}({}): completed with error: {err}",
            ctx.stage_name(),
            op.name()
        ),
    }
    callback(op)
}

/// Run a sequence of operations one after the other, each passed to the next stage
///
/// An operation is only started once the previous one has completed.
/// The sequence stops on the first operation that fails.
/// The `callback` is given either this failed operation or, on success, the last operation.
pub fn run_ops_in_serial(
    ctx: &StageContext,
    first: impl Into<OperationKind>,
    rest: impl IntoIterator<Item = OperationKind>,
    callback: impl FnOnce(Operation) + Send + 'static,
) {
    run_next_in_serial(
        ctx.clone(),
        first.into(),
        rest.into_iter().collect(),
        Box::new(callback),
    )
}

fn run_next_in_serial(
    ctx: StageContext,
    current: OperationKind,
    mut remaining: VecDeque<OperationKind>,
    callback: OperationCallback,
) {
    let resume_ctx = ctx.clone();
    let op = Operation::new(current, move |completed: Operation| {
        if completed.is_failed() {
            debug!(
                "{}({}): failed, skipping {} remaining operations",
                resume_ctx.stage_name(),
                completed.name(),
                remaining.len()
            );
            return callback(completed);
        }
        match remaining.pop_front() {
            Some(next) => run_next_in_serial(resume_ctx, next, remaining, callback),
            None => callback(completed),
        }
    });
    pass_op_to_next_stage(&ctx, op)
}

/// Hand an event to the previous stage, or to the pipeline owner when on top of the pipeline
///
/// Events emitted once the pipeline has been dropped are ignored.
pub fn pass_event_to_previous_stage(ctx: &StageContext, event: PipelineEvent) {
    let Some(chain) = ctx.chain() else {
        debug!(
            "{}: the pipeline has been dropped, ignoring event: {event:?}",
            ctx.stage_name()
        );
        return;
    };

    match ctx.previous(&chain) {
        Some(previous) => chain.handle_event(&previous, event),
        None => chain.deliver_event(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Connect;
    use crate::operations::Disconnect;
    use crate::operations::SetAuthProviderArgs;
    use crate::operations::SetSasToken;
    use crate::test_helpers::FakeTransport;
    use crate::PipelineBuilder;
    use crate::Stage;
    use assert_matches::assert_matches;
    use std::sync::mpsc;

    /// Runs three sub-operations in serial on `Connect`, forwarding everything else
    struct SerialStage;

    impl Stage for SerialStage {
        fn name(&self) -> &str {
            "SerialStage"
        }

        fn run_op(&self, ctx: &StageContext, op: Operation) {
            if !matches!(op.kind, OperationKind::Connect(_)) {
                return pass_op_to_next_stage(ctx, op);
            }
            let mut op = op;
            let done_ctx = ctx.clone();
            run_ops_in_serial(
                ctx,
                SetAuthProviderArgs::default(),
                [OperationKind::from(SetSasToken::default()), Disconnect.into()],
                move |last| {
                    let last_name = last.name();
                    if let Some(err) = last.into_error() {
                        op.set_error(err);
                    }
                    op.kind = OperationKind::SetSasToken(SetSasToken {
                        sas_token: last_name.to_string(),
                    });
                    complete_op(&done_ctx, op)
                },
            );
        }
    }

    fn run(transport: FakeTransport) -> Operation {
        let pipeline = PipelineBuilder::new()
            .with_stage(SerialStage)
            .with_stage(transport)
            .try_build()
            .unwrap();
        let (sender, receiver) = mpsc::channel();
        pipeline.run_op(Operation::new(Connect, move |op| sender.send(op).unwrap()));
        receiver.try_recv().unwrap()
    }

    fn last_sub_op_name(op: &Operation) -> &str {
        match &op.kind {
            OperationKind::SetSasToken(SetSasToken { sas_token }) => sas_token,
            _ => panic!("unexpected operation {op:?}"),
        }
    }

    #[test]
    fn serial_operations_are_run_in_order() {
        let transport = FakeTransport::new();
        let journal = transport.journal();

        let op = run(transport);

        assert!(!op.is_failed());
        assert_eq!(last_sub_op_name(&op), "Disconnect");
        assert_eq!(
            journal.names(),
            vec!["SetAuthProviderArgs", "SetSasToken", "Disconnect"]
        );
    }

    #[test]
    fn serial_operations_stop_on_first_error() {
        let transport = FakeTransport::new().failing_on("SetSasToken", "not authorized");
        let journal = transport.journal();

        let op = run(transport);

        assert_eq!(last_sub_op_name(&op), "SetSasToken");
        assert_matches!(op.error(), Some(PipelineError::Transport(msg)) if msg == "not authorized");
        assert_eq!(journal.names(), vec!["SetAuthProviderArgs", "SetSasToken"]);
    }

    #[test]
    fn an_operation_reaching_the_end_of_the_pipeline_fails() {
        let pipeline = PipelineBuilder::new()
            .with_stage(SerialStage)
            .try_build()
            .unwrap();
        let (sender, receiver) = mpsc::channel();

        pipeline.run_op(Operation::new(Disconnect, move |op| sender.send(op).unwrap()));

        let op = receiver.try_recv().unwrap();
        assert_matches!(
            op.error(),
            Some(PipelineError::UnhandledOperation { stage, operation: "Disconnect" }) if stage == "SerialStage"
        );
    }

    /// Completes an operation whose callback completes it again
    struct BuggyStage;

    impl Stage for BuggyStage {
        fn name(&self) -> &str {
            "BuggyStage"
        }

        fn run_op(&self, ctx: &StageContext, _op: Operation) {
            let again = ctx.clone();
            let op = Operation::new(Connect, move |completed| complete_op(&again, completed));
            complete_op(ctx, op)
        }
    }

    #[test]
    #[should_panic(expected = "already been completed")]
    fn completing_an_operation_twice_fails_loudly() {
        let pipeline = PipelineBuilder::new()
            .with_stage(BuggyStage)
            .try_build()
            .unwrap();

        pipeline.run_op(Operation::new(Connect, |_| {}));
    }
}
