use crate::errors::PipelineError;
use crate::events::IotResponse;
use crate::events::PipelineEvent;
use crate::operation_flow::complete_op;
use crate::operation_flow::pass_event_to_previous_stage;
use crate::operation_flow::pass_op_to_next_stage;
use crate::operations::Operation;
use crate::operations::OperationKind;
use crate::operations::SendIotRequest;
use crate::stage::Stage;
use crate::stage::StageContext;
use log::debug;
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// Pending requests, indexed by request id
type PendingRequests = Arc<Mutex<HashMap<String, Operation>>>;

/// Correlate requests and responses
///
/// A `SendIotRequestAndWaitForResponse` operation is given a unique request id,
/// and passed down as a `SendIotRequest` operation. The original operation
/// is completed when an `IotResponse` event is received with the same request id,
/// or as soon as the request cannot be sent.
///
/// Responses to unknown requests are dropped.
#[derive(Default)]
pub struct CoordinateRequestAndResponseStage {
    pending: PendingRequests,
}

impl Stage for CoordinateRequestAndResponseStage {
    fn name(&self) -> &str {
        "CoordinateRequestAndResponseStage"
    }

    fn run_op(&self, ctx: &StageContext, op: Operation) {
        let send_op = match &op.kind {
            OperationKind::SendIotRequestAndWaitForResponse(request) => SendIotRequest {
                request_type: request.request_type,
                method: request.method,
                resource_location: request.resource_location.clone(),
                request_body: request.request_body.clone(),
                request_id: nanoid::nanoid!(),
            },
            _ => return pass_op_to_next_stage(ctx, op),
        };

        let request_id = send_op.request_id.clone();
        debug!(
            "{}({}): sending {} request {request_id}",
            self.name(),
            op.name(),
            send_op.method
        );
        lock(&self.pending).insert(request_id.clone(), op);

        let pending = self.pending.clone();
        let done_ctx = ctx.clone();
        let on_request_sent = move |sent: Operation| {
            let Some(err) = sent.into_error() else {
                return;
            };
            let original = lock(&pending).remove(&request_id);
            if let Some(mut original) = original {
                original.set_error(err);
                complete_op(&done_ctx, original)
            }
        };

        pass_op_to_next_stage(ctx, Operation::new(send_op, on_request_sent))
    }

    fn handle_event(&self, ctx: &StageContext, event: PipelineEvent) {
        match event {
            PipelineEvent::IotResponse(response) => self.handle_response(ctx, response),
            event => pass_event_to_previous_stage(ctx, event),
        }
    }
}

impl CoordinateRequestAndResponseStage {
    fn handle_response(&self, ctx: &StageContext, response: IotResponse) {
        let pending = lock(&self.pending).remove(&response.request_id);
        let Some(mut op) = pending else {
            warn!(
                "{}: dropping response to unknown request {}",
                self.name(),
                response.request_id
            );
            return;
        };

        debug!(
            "{}({}): response {} received for request {}",
            self.name(),
            op.name(),
            response.status_code,
            response.request_id
        );
        if let OperationKind::SendIotRequestAndWaitForResponse(request) = &mut op.kind {
            request.status_code = Some(response.status_code);
            request.response_body = Some(response.response_body);
        }
        complete_op(ctx, op)
    }
}

impl Drop for CoordinateRequestAndResponseStage {
    fn drop(&mut self) {
        let abandoned: Vec<(String, Operation)> = lock(&self.pending).drain().collect();
        for (request_id, mut op) in abandoned {
            warn!(
                "{}({}): the pipeline has been dropped with no response for request {request_id}",
                self.name(),
                op.name()
            );
            let operation = op.name();
            op.set_error(PipelineError::PipelineClosed { operation });
            if let Some(callback) = op.take_callback() {
                callback(op)
            }
        }
    }
}

fn lock(pending: &PendingRequests) -> MutexGuard<'_, HashMap<String, Operation>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Method;
    use crate::operations::RequestType;
    use crate::operations::SendIotRequestAndWaitForResponse;
    use crate::test_helpers::FakeTransport;
    use crate::PipelineBuilder;
    use assert_matches::assert_matches;
    use std::sync::mpsc;
    use std::time::Duration;

    fn twin_request() -> SendIotRequestAndWaitForResponse {
        SendIotRequestAndWaitForResponse::new(RequestType::Twin, Method::Get, "/", " ")
    }

    fn pipeline(transport: FakeTransport) -> crate::Pipeline {
        pipeline_with(CoordinateRequestAndResponseStage::default(), transport)
    }

    fn pipeline_with(
        stage: CoordinateRequestAndResponseStage,
        transport: FakeTransport,
    ) -> crate::Pipeline {
        PipelineBuilder::new()
            .with_stage(stage)
            .with_stage(transport)
            .try_build()
            .unwrap()
    }

    fn response_of(op: &Operation) -> (Option<u16>, Option<&[u8]>) {
        match &op.kind {
            OperationKind::SendIotRequestAndWaitForResponse(request) => {
                (request.status_code, request.response_body.as_deref())
            }
            _ => panic!("unexpected operation {op:?}"),
        }
    }

    #[test]
    fn a_request_is_completed_with_the_matching_response() {
        let transport = FakeTransport::new().with_response(200, r#"{"desired":{}}"#);
        let journal = transport.journal();
        let pipeline = pipeline(transport);
        let (sender, receiver) = mpsc::channel();

        pipeline.run_op(Operation::new(twin_request(), move |op| sender.send(op).unwrap()));

        let op = receiver.try_recv().unwrap();
        assert!(!op.is_failed());
        assert_eq!(
            response_of(&op),
            (Some(200), Some(&br#"{"desired":{}}"#[..]))
        );
        let ops = journal.operations();
        assert_matches!(
            &ops[..],
            [OperationKind::SendIotRequest(SendIotRequest { method: Method::Get, resource_location, request_body, .. })]
                if resource_location == "/" && request_body == " "
        );
    }

    #[test]
    fn each_request_is_given_a_distinct_id() {
        let transport = FakeTransport::new()
            .with_response(200, "{}")
            .with_response(200, "{}");
        let journal = transport.journal();
        let pipeline = pipeline(transport);

        pipeline.run_op(Operation::new(twin_request(), |_| {}));
        pipeline.run_op(Operation::new(twin_request(), |_| {}));

        let ids: Vec<String> = journal
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                OperationKind::SendIotRequest(request) => Some(request.request_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn a_request_that_cannot_be_sent_fails() {
        let stage = CoordinateRequestAndResponseStage::default();
        let pending = stage.pending.clone();
        let transport = FakeTransport::new().failing_on("SendIotRequest", "not connected");
        let pipeline = pipeline_with(stage, transport);
        let (sender, receiver) = mpsc::channel();

        pipeline.run_op(Operation::new(twin_request(), move |op| sender.send(op).unwrap()));

        let op = receiver.try_recv().unwrap();
        assert_matches!(op.error(), Some(PipelineError::Transport(msg)) if msg == "not connected");
        assert!(lock(&pending).is_empty());
    }

    #[test]
    fn a_request_is_pending_till_its_response_is_received() {
        let stage = CoordinateRequestAndResponseStage::default();
        let pending = stage.pending.clone();
        let pipeline = pipeline_with(stage, FakeTransport::new());
        let (sender, receiver) = mpsc::channel();

        pipeline.run_op(Operation::new(twin_request(), move |op| {
            let _ = sender.send(op);
        }));

        assert!(receiver.try_recv().is_err());
        assert_eq!(lock(&pending).len(), 1);
    }

    #[test]
    fn pending_requests_are_failed_when_the_pipeline_is_dropped() {
        let stage = CoordinateRequestAndResponseStage::default();
        let pending = stage.pending.clone();
        let pipeline = pipeline_with(stage, FakeTransport::new());
        let (sender, receiver) = mpsc::channel();
        pipeline.run_op(Operation::new(twin_request(), move |op| sender.send(op).unwrap()));

        drop(pipeline);

        let op = receiver.try_recv().unwrap();
        assert_matches!(
            op.error(),
            Some(PipelineError::PipelineClosed {
                operation: "SendIotRequestAndWaitForResponse"
            })
        );
        assert_eq!(response_of(&op), (None, None));
        assert!(lock(&pending).is_empty());
    }

    #[test]
    fn a_response_received_from_another_thread_completes_the_request() {
        let transport = FakeTransport::new()
            .with_response(201, "{}")
            .responding_from_another_thread();
        let pipeline = pipeline(transport);
        let (sender, receiver) = mpsc::channel();

        pipeline.run_op(Operation::new(twin_request(), move |op| sender.send(op).unwrap()));

        let op = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(response_of(&op), (Some(201), Some(&b"{}"[..])));
    }

    #[test]
    fn other_operations_are_passed_down_unchanged() {
        let transport = FakeTransport::new();
        let journal = transport.journal();
        let pipeline = pipeline(transport);

        pipeline.run_op(Operation::new(crate::operations::Disconnect, |_| {}));

        assert_eq!(journal.names(), vec!["Disconnect"]);
    }
}
