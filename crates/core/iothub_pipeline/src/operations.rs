use crate::auth::AuthenticationProvider;
use crate::errors::PipelineError;
use crate::twin::Twin;
use log::warn;
use serde_json::Map;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// The continuation called when an operation completes
pub type OperationCallback = Box<dyn FnOnce(Operation) + Send + 'static>;

/// A unit of work travelling down the pipeline
///
/// An operation is completed exactly once, by calling its callback
/// with the operation itself, the error being set if the operation failed.
pub struct Operation {
    pub kind: OperationKind,
    error: Option<PipelineError>,
    callback: Option<OperationCallback>,
}

impl Operation {
    pub fn new(
        kind: impl Into<OperationKind>,
        callback: impl FnOnce(Operation) + Send + 'static,
    ) -> Self {
        Operation {
            kind: kind.into(),
            error: None,
            callback: Some(Box::new(callback)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Mark the operation as failed
    ///
    /// An error is never cleared nor replaced: the first error wins.
    pub fn set_error(&mut self, error: PipelineError) {
        match &self.error {
            None => self.error = Some(error),
            Some(first) => warn!(
                "{}: ignoring '{error}' as the operation already failed with '{first}'",
                self.name()
            ),
        }
    }

    /// Consume a completed operation, returning its error if any
    pub fn into_error(self) -> Option<PipelineError> {
        self.error
    }

    /// Consume a completed operation, returning either its outcome or its error
    pub fn into_result(self) -> Result<OperationKind, PipelineError> {
        match self.error {
            None => Ok(self.kind),
            Some(err) => Err(err),
        }
    }

    pub(crate) fn take_callback(&mut self) -> Option<OperationCallback> {
        self.callback.take()
    }
}

impl Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field("error", &self.error)
            .field("completed", &self.callback.is_none())
            .finish()
    }
}

/// Define the `OperationKind` enum grouping all the operation types
///
/// `operation_kinds!(A, B)` expands to an enum with a variant per type,
/// a `name()` method returning the type name and a `From` impl per type.
macro_rules! operation_kinds {
    ( $( $kind:ident ),* $(,)? ) => {
        /// The operations understood by the pipeline stages
        #[derive(Clone, Debug)]
        pub enum OperationKind {
            $(
                $kind($kind),
            )*
        }

        impl OperationKind {
            pub fn name(&self) -> &'static str {
                match self {
                    $(
                        OperationKind::$kind(_) => stringify!($kind),
                    )*
                }
            }
        }

        $(
            impl From<$kind> for OperationKind {
                fn from(op: $kind) -> Self {
                    OperationKind::$kind(op)
                }
            }
        )*
    };
}

operation_kinds!(
    Connect,
    Disconnect,
    SetAuthProvider,
    SetAuthProviderArgs,
    SetSasToken,
    GetTwin,
    PatchTwinReportedProperties,
    SendIotRequestAndWaitForResponse,
    SendIotRequest,
);

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Connect;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Disconnect;

/// Configure the pipeline with the identity and credentials of a device
#[derive(Clone)]
pub struct SetAuthProvider {
    pub auth_provider: Arc<dyn AuthenticationProvider>,
}

impl SetAuthProvider {
    pub fn new(auth_provider: Arc<dyn AuthenticationProvider>) -> Self {
        SetAuthProvider { auth_provider }
    }
}

impl Debug for SetAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetAuthProvider")
            .field("device_id", &self.auth_provider.device_id())
            .field("hostname", &self.auth_provider.hostname())
            .finish()
    }
}

/// Connection arguments, as extracted from an authentication provider
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SetAuthProviderArgs {
    pub device_id: String,
    pub module_id: Option<String>,
    pub hostname: String,
    pub gateway_hostname: Option<String>,
    pub ca_cert: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SetSasToken {
    pub sas_token: String,
}

/// Retrieve the device twin
///
/// On success, `twin` holds the desired and reported properties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetTwin {
    pub twin: Option<Twin>,
}

/// Merge a delta into the reported properties of the device twin
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchTwinReportedProperties {
    pub patch: Map<String, Value>,
}

impl PatchTwinReportedProperties {
    pub fn new(patch: Map<String, Value>) -> Self {
        PatchTwinReportedProperties { patch }
    }
}

/// The domain of an IoT Hub request
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RequestType {
    Twin,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Patch,
    Post,
    Put,
    Delete,
}

/// A protocol-neutral request, completed once the matching response is received
///
/// The `status_code` follows HTTP semantics: any code >= 300 is a failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SendIotRequestAndWaitForResponse {
    pub request_type: RequestType,
    pub method: Method,
    pub resource_location: String,
    pub request_body: String,
    pub status_code: Option<u16>,
    pub response_body: Option<Vec<u8>>,
}

impl SendIotRequestAndWaitForResponse {
    pub fn new(
        request_type: RequestType,
        method: Method,
        resource_location: impl Into<String>,
        request_body: impl Into<String>,
    ) -> Self {
        SendIotRequestAndWaitForResponse {
            request_type,
            method,
            resource_location: resource_location.into(),
            request_body: request_body.into(),
            status_code: None,
            response_body: None,
        }
    }
}

/// A protocol-neutral request, completed as soon as sent
///
/// The response is received later as an [IotResponse](crate::IotResponse) event
/// carrying the same `request_id`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SendIotRequest {
    pub request_type: RequestType,
    pub method: Method,
    pub resource_location: String,
    pub request_body: String,
    pub request_id: String,
}
