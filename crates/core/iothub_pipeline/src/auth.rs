use crate::errors::AuthProviderError;
use crate::operation_flow::complete_op;
use crate::operation_flow::pass_op_to_next_stage;
use crate::operation_flow::run_ops_in_serial;
use crate::operations::Operation;
use crate::operations::OperationKind;
use crate::operations::SetAuthProviderArgs;
use crate::operations::SetSasToken;
use crate::stage::Stage;
use crate::stage::StageContext;
use iothub_config::ConfigError;
use iothub_config::DeviceConfig;
use log::error;
use log::info;
use std::sync::Arc;

/// The identity and credentials of a device
///
/// The provider is only read by the pipeline, never updated.
pub trait AuthenticationProvider: Send + Sync {
    fn device_id(&self) -> &str;

    fn module_id(&self) -> Option<&str> {
        None
    }

    fn hostname(&self) -> &str;

    fn gateway_hostname(&self) -> Option<&str> {
        None
    }

    fn ca_cert(&self) -> Option<&[u8]> {
        None
    }

    /// Return a SAS token valid now
    fn current_sas_token(&self) -> Result<String, AuthProviderError>;
}

/// An authentication provider using a SAS token generated out of band
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StaticAuthProvider {
    pub device_id: String,
    pub module_id: Option<String>,
    pub hostname: String,
    pub gateway_hostname: Option<String>,
    pub ca_cert: Option<Vec<u8>>,
    pub sas_token: String,
}

impl StaticAuthProvider {
    pub fn from_config(config: &DeviceConfig) -> Result<Self, ConfigError> {
        Ok(StaticAuthProvider {
            device_id: config.device_id.clone(),
            module_id: config.module_id.clone(),
            hostname: config.hostname.clone(),
            gateway_hostname: config.gateway_hostname.clone(),
            ca_cert: config.read_root_cert()?,
            sas_token: config.sas_token.clone(),
        })
    }
}

impl AuthenticationProvider for StaticAuthProvider {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn gateway_hostname(&self) -> Option<&str> {
        self.gateway_hostname.as_deref()
    }

    fn ca_cert(&self) -> Option<&[u8]> {
        self.ca_cert.as_deref()
    }

    fn current_sas_token(&self) -> Result<String, AuthProviderError> {
        if self.sas_token.is_empty() {
            return Err(AuthProviderError::NoToken {
                device_id: self.device_id.clone(),
            });
        }
        Ok(self.sas_token.clone())
    }
}

impl SetAuthProviderArgs {
    pub fn from_provider(auth_provider: &dyn AuthenticationProvider) -> Self {
        SetAuthProviderArgs {
            device_id: auth_provider.device_id().to_string(),
            module_id: auth_provider.module_id().map(str::to_string),
            hostname: auth_provider.hostname().to_string(),
            gateway_hostname: auth_provider.gateway_hostname().map(str::to_string),
            ca_cert: auth_provider.ca_cert().map(<[u8]>::to_vec),
        }
    }
}

/// Handle `SetAuthProvider` operations
///
/// The arguments and the SAS token extracted from the provider are passed down
/// using a `SetAuthProviderArgs` operation followed by a `SetSasToken` operation.
/// The `SetAuthProvider` operation is completed once both have completed,
/// or as soon as one fails.
///
/// All other operations are passed down.
pub struct UseAuthProviderStage;

impl Stage for UseAuthProviderStage {
    fn name(&self) -> &str {
        "UseAuthProviderStage"
    }

    fn run_op(&self, ctx: &StageContext, op: Operation) {
        match &op.kind {
            OperationKind::SetAuthProvider(set_auth_provider) => {
                let auth_provider = set_auth_provider.auth_provider.clone();
                self.set_auth_provider(ctx, op, auth_provider)
            }
            _ => pass_op_to_next_stage(ctx, op),
        }
    }
}

impl UseAuthProviderStage {
    fn set_auth_provider(
        &self,
        ctx: &StageContext,
        mut op: Operation,
        auth_provider: Arc<dyn AuthenticationProvider>,
    ) {
        info!(
            "{}({}): using the credentials of {}",
            self.name(),
            op.name(),
            auth_provider.device_id()
        );

        let args = SetAuthProviderArgs::from_provider(auth_provider.as_ref());
        let sas_token = match auth_provider.current_sas_token() {
            Ok(sas_token) => sas_token,
            Err(err) => {
                error!("{}({}): no SAS token: {err}", self.name(), op.name());
                op.set_error(err.into());
                return complete_op(ctx, op);
            }
        };

        let done_ctx = ctx.clone();
        run_ops_in_serial(
            ctx,
            args,
            [OperationKind::from(SetSasToken { sas_token })],
            move |completed: Operation| {
                if let Some(err) = completed.into_error() {
                    op.set_error(err);
                }
                complete_op(&done_ctx, op)
            },
        )
    }
}
