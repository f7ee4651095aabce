//! gRPC server for the Hemmer provider protocol.
//!
//! [`ProviderService`] is the plain-Rust view of the protocol; the private
//! gRPC wrapper decodes JSON payloads, calls the service and turns every
//! failure into diagnostics on the response.
//!
//! # Signal Handling
//!
//! On SIGTERM or SIGINT the server stops accepting connections, waits up to
//! [`ServeOptions::shutdown_timeout`] for in-flight requests, then calls
//! [`ProviderService::stop`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated;
use crate::schema::{
    has_errors, Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema,
};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// Operations a provider exposes to the host.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Schemas of the provider block, resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names plus capabilities, derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    /// Validate the provider block.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Configure credentials and defaults.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Release resources before exit.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Validate a resource block.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Migrate state written by an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan a create (`prior_state` is `None`), update, or destroy (`proposed_state` is null).
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Refresh a resource. `null` means it no longer exists.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update a resource in place.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Adopt an existing object by ID.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError>;

    /// Validate a data source block.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Read a data source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError>;
}

/// Decode a JSON payload. Empty bytes decode to `null`.
fn decode(bytes: &[u8]) -> Result<Value, ProviderError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn encode(value: &Value) -> Result<Vec<u8>, ProviderError> {
    Ok(serde_json::to_vec(value)?)
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<generated::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| generated::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => generated::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => generated::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_diagnostics(err: &ProviderError) -> Vec<generated::Diagnostic> {
    diagnostics_to_proto(vec![Diagnostic::error(err.to_string())])
}

/// Collapse a diagnostics result, logging how it went.
fn finish_diagnostics(
    operation: &str,
    result: Result<Vec<Diagnostic>, ProviderError>,
) -> Vec<generated::Diagnostic> {
    match result {
        Ok(diagnostics) => {
            if has_errors(&diagnostics) {
                warn!(diagnostics = diagnostics.len(), "{} completed with errors", operation);
            } else {
                debug!("{} completed", operation);
            }
            diagnostics_to_proto(diagnostics)
        }
        Err(e) => {
            error!(error = %e, "{} failed", operation);
            error_diagnostics(&e)
        }
    }
}

fn schema_to_proto(schema: &Schema) -> generated::Schema {
    generated::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &Block) -> generated::Block {
    let mut attributes: Vec<_> = block
        .attributes
        .iter()
        .map(|(name, attr)| generated::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: attr.force_new,
            default_value: Vec::new(),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut block_types: Vec<_> = block
        .blocks
        .iter()
        .map(|(name, nested)| generated::NestedBlock {
            type_name: name.clone(),
            block: Some(block_to_proto(&nested.block)),
            nesting_mode: match nested.nesting_mode {
                BlockNestingMode::List => generated::nested_block::NestingMode::List as i32,
                BlockNestingMode::Set => generated::nested_block::NestingMode::Set as i32,
            },
            min_items: nested.min_items as i32,
            max_items: nested.max_items as i32,
        })
        .collect();
    block_types.sort_by(|a, b| a.type_name.cmp(&b.type_name));

    generated::Block {
        attributes,
        block_types,
        description: block.description.clone().unwrap_or_default(),
    }
}

/// Adapts a [`ProviderService`] to the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

type GrpcResult<T> = Result<tonic::Response<T>, tonic::Status>;

#[tonic::async_trait]
impl<P: ProviderService> generated::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<generated::GetMetadataRequest>,
    ) -> GrpcResult<generated::GetMetadataResponse> {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(generated::GetMetadataResponse {
            server_capabilities: Some(generated::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<generated::GetSchemaRequest>,
    ) -> GrpcResult<generated::GetSchemaResponse> {
        let schema = self.provider.schema();
        Ok(tonic::Response::new(generated::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<generated::ValidateProviderConfigRequest>,
    ) -> GrpcResult<generated::ValidateProviderConfigResponse> {
        let req = request.into_inner();
        let result = match decode(&req.config) {
            Ok(config) => self.provider.validate_provider_config(config).await,
            Err(e) => Err(e),
        };
        Ok(tonic::Response::new(
            generated::ValidateProviderConfigResponse {
                diagnostics: finish_diagnostics("ValidateProviderConfig", result),
            },
        ))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<generated::ConfigureRequest>,
    ) -> GrpcResult<generated::ConfigureResponse> {
        let req = request.into_inner();
        let result = match decode(&req.config) {
            Ok(config) => self.provider.configure(config).await,
            Err(e) => Err(e),
        };
        Ok(tonic::Response::new(generated::ConfigureResponse {
            diagnostics: finish_diagnostics("Configure", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<generated::StopRequest>,
    ) -> GrpcResult<generated::StopResponse> {
        info!("Stop requested");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            }
        };
        Ok(tonic::Response::new(generated::StopResponse { error }))
    }

    #[instrument(
        skip_all,
        name = "grpc.validate_resource_config",
        fields(resource_type = tracing::field::Empty)
    )]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<generated::ValidateResourceConfigRequest>,
    ) -> GrpcResult<generated::ValidateResourceConfigResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = match decode(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_resource_config(&req.resource_type, config)
                    .await
            }
            Err(e) => Err(e),
        };
        Ok(tonic::Response::new(
            generated::ValidateResourceConfigResponse {
                diagnostics: finish_diagnostics("ValidateResourceConfig", result),
            },
        ))
    }

    #[instrument(
        skip_all,
        name = "grpc.upgrade_resource_state",
        fields(resource_type = tracing::field::Empty)
    )]
    async fn upgrade_resource_state(
        &self,
        request: tonic::Request<generated::UpgradeResourceStateRequest>,
    ) -> GrpcResult<generated::UpgradeResourceStateResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let result = async {
            let state = decode(&req.raw_state)?;
            let upgraded = self
                .provider
                .upgrade_resource_state(&req.resource_type, req.version, state)
                .await?;
            encode(&upgraded)
        }
        .await;

        let response = match result {
            Ok(upgraded_state) => generated::UpgradeResourceStateResponse {
                upgraded_state,
                diagnostics: vec![],
            },
            Err(e) => {
                error!(version = req.version, error = %e, "UpgradeResourceState failed");
                generated::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.plan", fields(resource_type = tracing::field::Empty))]
    async fn plan(
        &self,
        request: tonic::Request<generated::PlanRequest>,
    ) -> GrpcResult<generated::PlanResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let result = async {
            let prior_state = match decode(&req.prior_state)? {
                Value::Null => None,
                prior => Some(prior),
            };
            let proposed_state = decode(&req.proposed_state)?;
            let config = decode(&req.config)?;
            let plan = self
                .provider
                .plan(&req.resource_type, prior_state, proposed_state, config)
                .await?;
            Ok::<_, ProviderError>((encode(&plan.planned_state)?, plan))
        }
        .await;

        let response = match result {
            Ok((planned_state, plan)) => {
                info!(
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "Plan completed"
                );
                generated::PlanResponse {
                    planned_state,
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Plan failed");
                generated::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_diagnostics(&e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.create", fields(resource_type = tracing::field::Empty))]
    async fn create(
        &self,
        request: tonic::Request<generated::CreateRequest>,
    ) -> GrpcResult<generated::CreateResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let result = async {
            let planned = decode(&req.planned_state)?;
            encode(&self.provider.create(&req.resource_type, planned).await?)
        }
        .await;

        let response = match result {
            Ok(state) => {
                info!("Create completed");
                generated::CreateResponse {
                    state,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Create failed");
                generated::CreateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.read", fields(resource_type = tracing::field::Empty))]
    async fn read(
        &self,
        request: tonic::Request<generated::ReadRequest>,
    ) -> GrpcResult<generated::ReadResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let result = async {
            let current = decode(&req.current_state)?;
            encode(&self.provider.read(&req.resource_type, current).await?)
        }
        .await;

        let response = match result {
            Ok(state) => {
                debug!("Read completed");
                generated::ReadResponse {
                    state,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Read failed");
                generated::ReadResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.update", fields(resource_type = tracing::field::Empty))]
    async fn update(
        &self,
        request: tonic::Request<generated::UpdateRequest>,
    ) -> GrpcResult<generated::UpdateResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let result = async {
            let prior = decode(&req.prior_state)?;
            let planned = decode(&req.planned_state)?;
            encode(
                &self
                    .provider
                    .update(&req.resource_type, prior, planned)
                    .await?,
            )
        }
        .await;

        let response = match result {
            Ok(state) => {
                info!("Update completed");
                generated::UpdateResponse {
                    state,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Update failed");
                generated::UpdateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.delete", fields(resource_type = tracing::field::Empty))]
    async fn delete(
        &self,
        request: tonic::Request<generated::DeleteRequest>,
    ) -> GrpcResult<generated::DeleteResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let result = async {
            let current = decode(&req.current_state)?;
            self.provider.delete(&req.resource_type, current).await
        }
        .await;

        let diagnostics = match result {
            Ok(()) => {
                info!("Delete completed");
                vec![]
            }
            Err(e) => {
                error!(error = %e, "Delete failed");
                error_diagnostics(&e)
            }
        };
        Ok(tonic::Response::new(generated::DeleteResponse { diagnostics }))
    }

    #[instrument(
        skip_all,
        name = "grpc.import_resource_state",
        fields(resource_type = tracing::field::Empty, id = tracing::field::Empty)
    )]
    async fn import_resource_state(
        &self,
        request: tonic::Request<generated::ImportResourceStateRequest>,
    ) -> GrpcResult<generated::ImportResourceStateResponse> {
        let req = request.into_inner();
        let span = tracing::Span::current();
        span.record("resource_type", req.resource_type.as_str());
        span.record("id", req.id.as_str());

        let result = async {
            self.provider
                .import_resource(&req.resource_type, &req.id)
                .await?
                .into_iter()
                .map(|r| {
                    Ok(generated::ImportedResource {
                        state: encode(&r.state)?,
                        resource_type: r.resource_type,
                    })
                })
                .collect::<Result<Vec<_>, ProviderError>>()
        }
        .await;

        let response = match result {
            Ok(imported) => {
                info!(imported = imported.len(), "ImportResourceState completed");
                generated::ImportResourceStateResponse {
                    imported,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "ImportResourceState failed");
                generated::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(
        skip_all,
        name = "grpc.validate_data_source_config",
        fields(data_source_type = tracing::field::Empty)
    )]
    async fn validate_data_source_config(
        &self,
        request: tonic::Request<generated::ValidateDataSourceConfigRequest>,
    ) -> GrpcResult<generated::ValidateDataSourceConfigResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let result = match decode(&req.config) {
            Ok(config) => {
                self.provider
                    .validate_data_source_config(&req.data_source_type, config)
                    .await
            }
            Err(e) => Err(e),
        };
        Ok(tonic::Response::new(
            generated::ValidateDataSourceConfigResponse {
                diagnostics: finish_diagnostics("ValidateDataSourceConfig", result),
            },
        ))
    }

    #[instrument(
        skip_all,
        name = "grpc.read_data_source",
        fields(data_source_type = tracing::field::Empty)
    )]
    async fn read_data_source(
        &self,
        request: tonic::Request<generated::ReadDataSourceRequest>,
    ) -> GrpcResult<generated::ReadDataSourceResponse> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());

        let result = async {
            let config = decode(&req.config)?;
            encode(
                &self
                    .provider
                    .read_data_source(&req.data_source_type, config)
                    .await?,
            )
        }
        .await;

        let response = match result {
            Ok(state) => {
                info!("ReadDataSource completed");
                generated::ReadDataSourceResponse {
                    state,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "ReadDataSource failed");
                generated::ReadDataSourceResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(&e),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }
}

/// Options for running the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long to wait for in-flight requests after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for SIGTERM or SIGINT (CTRL+C elsewhere).
///
/// If the handlers cannot be installed the server runs until killed.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Serve a provider on an ephemeral localhost port.
///
/// Prints the handshake line `HEMMER_PROVIDER|<version>|<address>` to stdout
/// and runs until SIGTERM or SIGINT.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), ProviderError> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Like [`serve`] with custom [`ServeOptions`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let listener = bind("127.0.0.1:0".parse().map_err(|_| {
        ProviderError::Configuration("invalid listen address".to_string())
    })?)
    .await?;
    serve_on_listener(provider, listener, options).await
}

/// Serve a provider on a specific address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), ProviderError> {
    let listener = bind(addr).await?;
    serve_on_listener(provider, listener, ServeOptions::default()).await
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ProviderError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ProviderError::Unavailable(format!("failed to bind {}: {}", addr, e)))
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let addr = listener
        .local_addr()
        .map_err(|e| ProviderError::Unavailable(format!("listener has no address: {}", e)))?;

    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let service = generated::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let shutdown = Arc::new(Notify::new());
    let server = Server::builder().add_service(service).serve_with_incoming_shutdown(
        tokio_stream::wrappers::TcpListenerStream::new(listener),
        {
            let shutdown = Arc::clone(&shutdown);
            async move { shutdown.notified().await }
        },
    );
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = wait_for_shutdown_signal() => {
            shutdown.notify_one();
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, dropping in-flight requests"
                ),
            }
        }
    }

    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop returned an error");
    }

    info!("Provider shutdown complete");
    Ok(())
}
