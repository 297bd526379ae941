//! A fake transport stage to test the pipeline stages.
use crate::errors::PipelineError;
use crate::events::IotResponse;
use crate::events::PipelineEvent;
use crate::operation_flow::complete_op;
use crate::operation_flow::pass_event_to_previous_stage;
use crate::operations::Operation;
use crate::operations::OperationKind;
use crate::stage::Stage;
use crate::stage::StageContext;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// A terminal stage simulating a transport connected to an IoT Hub
///
/// - All the operations received are recorded in a [Journal].
/// - The operations named with [FakeTransport::failing_on] fail with a transport error.
/// - Requests are given the responses registered with [FakeTransport::with_response], in order.
///   A `SendIotRequestAndWaitForResponse` is directly completed with the response,
///   while for a `SendIotRequest` the response is sent up as an `IotResponse` event.
/// - Any other operation succeeds.
#[derive(Default)]
pub struct FakeTransport {
    journal: Journal,
    failures: HashMap<String, String>,
    responses: Mutex<VecDeque<FakeResponse>>,
    from_another_thread: bool,
    events: EventEmitter,
}

struct FakeResponse {
    status_code: Option<u16>,
    body: Vec<u8>,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport::default()
    }

    /// A handle to the operations received by this transport
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// A handle to send events up the pipeline, as if received by this transport
    ///
    /// The emitter can only be used once the transport has received an operation.
    pub fn event_emitter(&self) -> EventEmitter {
        self.events.clone()
    }

    /// Fail all the operations with the given name
    pub fn failing_on(mut self, op_name: &str, message: &str) -> Self {
        self.failures
            .insert(op_name.to_string(), message.to_string());
        self
    }

    /// Queue a response to be given to the next request
    pub fn with_response(self, status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        self.queue_response(FakeResponse {
            status_code: Some(status_code),
            body: body.into(),
        })
    }

    /// Queue a response with no status code, as a broken transport would do
    pub fn with_no_status_code(self) -> Self {
        self.queue_response(FakeResponse {
            status_code: None,
            body: vec![],
        })
    }

    /// Complete the operations and send the responses from a background thread
    pub fn responding_from_another_thread(self) -> Self {
        FakeTransport {
            from_another_thread: true,
            ..self
        }
    }

    fn queue_response(self, response: FakeResponse) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    fn next_response(&self) -> Option<FakeResponse> {
        lock(&self.responses).pop_front()
    }

    fn complete(&self, ctx: &StageContext, op: Operation, response: Option<PipelineEvent>) {
        let ctx = ctx.clone();
        let deliver = move || {
            complete_op(&ctx, op);
            if let Some(event) = response {
                pass_event_to_previous_stage(&ctx, event)
            }
        };
        if self.from_another_thread {
            std::thread::spawn(deliver);
        } else {
            deliver()
        }
    }
}

impl Stage for FakeTransport {
    fn name(&self) -> &str {
        "FakeTransport"
    }

    fn run_op(&self, ctx: &StageContext, mut op: Operation) {
        self.journal.record(op.kind.clone());
        self.events.attach(ctx);

        if let Some(message) = self.failures.get(op.name()) {
            op.set_error(PipelineError::Transport(message.clone()));
            return self.complete(ctx, op, None);
        }

        let mut event = None;
        let mut error = None;
        match &mut op.kind {
            OperationKind::SendIotRequestAndWaitForResponse(request) => match self.next_response() {
                Some(response) => {
                    request.status_code = response.status_code;
                    request.response_body = Some(response.body);
                }
                None => error = Some(PipelineError::Transport("no response".into())),
            },
            OperationKind::SendIotRequest(request) => {
                event = self.next_response().and_then(|response| {
                    let status_code = response.status_code?;
                    Some(PipelineEvent::IotResponse(IotResponse {
                        request_type: request.request_type,
                        request_id: request.request_id.clone(),
                        status_code,
                        response_body: response.body,
                    }))
                })
            }
            _ => {}
        }
        if let Some(err) = error {
            op.set_error(err);
        }
        self.complete(ctx, op, event)
    }
}

/// The operations received by a [FakeTransport], in order
#[derive(Clone, Default)]
pub struct Journal {
    operations: Arc<Mutex<Vec<OperationKind>>>,
}

impl Journal {
    pub fn operations(&self) -> Vec<OperationKind> {
        lock(&self.operations).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        lock(&self.operations).iter().map(OperationKind::name).collect()
    }

    fn record(&self, op: OperationKind) {
        lock(&self.operations).push(op)
    }
}

/// Send events up the pipeline from a [FakeTransport]
///
/// The emitter doesn't keep the pipeline alive:
/// once the pipeline is dropped, emitted events are ignored.
#[derive(Clone, Default)]
pub struct EventEmitter {
    ctx: Arc<Mutex<Option<StageContext>>>,
}

impl EventEmitter {
    /// # Panics
    ///
    /// If the transport has received no operation yet.
    pub fn emit(&self, event: PipelineEvent) {
        let ctx = lock(&self.ctx)
            .clone()
            .expect("the transport must receive an operation before emitting events");
        pass_event_to_previous_stage(&ctx, event)
    }

    fn attach(&self, ctx: &StageContext) {
        lock(&self.ctx).get_or_insert_with(|| ctx.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
