use crate::operations::RequestType;
use serde_json::Map;
use serde_json::Value;

/// An event travelling up the pipeline, from the transport toward the caller
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    IotResponse(IotResponse),

    /// Desired properties updated by the cloud
    TwinDesiredPropertiesPatch(Map<String, Value>),
}

/// The response to a [SendIotRequest](crate::SendIotRequest)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IotResponse {
    pub request_type: RequestType,
    pub request_id: String,
    pub status_code: u16,
    pub response_body: Vec<u8>,
}

impl From<IotResponse> for PipelineEvent {
    fn from(response: IotResponse) -> Self {
        PipelineEvent::IotResponse(response)
    }
}
