use crate::errors::PipelineError;
use crate::operation_flow::complete_op;
use crate::operation_flow::pass_op_to_next_stage;
use crate::operations::Method;
use crate::operations::Operation;
use crate::operations::OperationKind;
use crate::operations::RequestType;
use crate::operations::SendIotRequestAndWaitForResponse;
use crate::stage::Stage;
use crate::stage::StageContext;
use log::error;
use log::info;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// The properties of a device twin
///
/// The content of both property sets is defined by the solution, hence kept as raw JSON.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Twin {
    /// Set by the solution back end, read by the device
    #[serde(default)]
    pub desired: Map<String, Value>,

    /// Set by the device, read and queried by the solution back end
    #[serde(default)]
    pub reported: Map<String, Value>,
}

/// Placeholder body of a twin GET request: the body must not be empty
const GET_TWIN_REQUEST_BODY: &str = " ";
const GET_TWIN_RESOURCE: &str = "/";
const PATCH_REPORTED_PROPERTIES_RESOURCE: &str = "/properties/reported/";

/// Handle the twin operations
///
/// `GetTwin` and `PatchTwinReportedProperties` operations are converted into
/// `SendIotRequestAndWaitForResponse` operations. Nothing here is protocol specific:
/// it's up to the transport stages to map these requests and their responses
/// to the protocol in use.
///
/// All other operations are passed down.
pub struct HandleTwinOperationsStage;

impl Stage for HandleTwinOperationsStage {
    fn name(&self) -> &str {
        "HandleTwinOperationsStage"
    }

    fn run_op(&self, ctx: &StageContext, op: Operation) {
        match &op.kind {
            OperationKind::GetTwin(_) => self.get_twin(ctx, op),
            OperationKind::PatchTwinReportedProperties(patch) => {
                let request_body = serde_json::to_string(&patch.patch);
                self.patch_reported_properties(ctx, op, request_body)
            }
            _ => pass_op_to_next_stage(ctx, op),
        }
    }
}

impl HandleTwinOperationsStage {
    fn get_twin(&self, ctx: &StageContext, mut op: Operation) {
        let request = SendIotRequestAndWaitForResponse::new(
            RequestType::Twin,
            Method::Get,
            GET_TWIN_RESOURCE,
            GET_TWIN_REQUEST_BODY,
        );

        let done_ctx = ctx.clone();
        let on_twin_response = move |twin_op: Operation| {
            info!("{}({}): got response", done_ctx.stage_name(), op.name());
            match map_twin_error(twin_op).and_then(decode_twin) {
                Ok(twin) => {
                    if let OperationKind::GetTwin(get_twin) = &mut op.kind {
                        get_twin.twin = Some(twin)
                    }
                }
                Err(err) => op.set_error(err),
            }
            complete_op(&done_ctx, op)
        };

        pass_op_to_next_stage(ctx, Operation::new(request, on_twin_response))
    }

    fn patch_reported_properties(
        &self,
        ctx: &StageContext,
        mut op: Operation,
        request_body: Result<String, serde_json::Error>,
    ) {
        let request_body = match request_body {
            Ok(body) => body,
            Err(err) => {
                op.set_error(PipelineError::InvalidPatch(err));
                return complete_op(ctx, op);
            }
        };
        info!(
            "{}({}): sending reported properties patch: {request_body}",
            self.name(),
            op.name()
        );

        let request = SendIotRequestAndWaitForResponse::new(
            RequestType::Twin,
            Method::Patch,
            PATCH_REPORTED_PROPERTIES_RESOURCE,
            request_body,
        );

        let done_ctx = ctx.clone();
        let on_twin_response = move |twin_op: Operation| {
            info!("{}({}): got response", done_ctx.stage_name(), op.name());
            if let Err(err) = map_twin_error(twin_op) {
                op.set_error(err)
            }
            complete_op(&done_ctx, op)
        };

        pass_op_to_next_stage(ctx, Operation::new(request, on_twin_response))
    }
}

/// Extract the response body of a twin request, unless the request failed
///
/// Any status code from 300 upward is reported as a generic service error.
fn map_twin_error(twin_op: Operation) -> Result<Vec<u8>, PipelineError> {
    let response = match twin_op.into_result()? {
        OperationKind::SendIotRequestAndWaitForResponse(response) => response,
        other => {
            return Err(PipelineError::UnexpectedOperation {
                expected: "SendIotRequestAndWaitForResponse",
                actual: other.name(),
            })
        }
    };

    let response_body = response.response_body.unwrap_or_default();
    match response.status_code {
        None => Err(PipelineError::MissingStatusCode {
            operation: "SendIotRequestAndWaitForResponse",
        }),
        Some(status_code) if status_code >= 300 => {
            // TODO map the status codes to specific errors (not found, conflict, throttled)
            error!("Error {status_code} received from twin operation");
            error!(
                "response body: {}",
                String::from_utf8_lossy(&response_body)
            );
            Err(PipelineError::ServiceStatus {
                status_code,
                response_body,
            })
        }
        Some(_) => Ok(response_body),
    }
}

fn decode_twin(response_body: Vec<u8>) -> Result<Twin, PipelineError> {
    let json = std::str::from_utf8(&response_body)?;
    Ok(serde_json::from_str(json)?)
}
