//! `aws_apigatewayv2_api`: an HTTP or WebSocket API.
//!
//! With `body` set, the definition comes from an OpenAPI document reimported
//! on create and whenever the document changes. A reimport overwrites the
//! name, description, version and CORS settings, so the configured values are
//! written back afterwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_engine::schema::{FieldSpec, FieldType, ResourceDescriptor, Validation};
use cumulus_engine::waiter::retry_transient;
use cumulus_engine::{
    DesiredState, Fields, Invocation, ObservedState, ProviderConfig, ReadResult, Resource, Result,
    Value,
};
use tracing::{debug, info, warn};

use super::{apply_tag_delta, create_with_tags, set_tags, tag_after_create, update_resource_tags};
use crate::api::ApiGatewayClient;
use crate::api::apigatewayv2::{
    Api, Cors, CreateApiRequest, NOT_FOUND, PROTOCOL_HTTP, PROTOCOL_WEBSOCKET, UpdateApiRequest,
};

pub const TYPE_NAME: &str = "aws_apigatewayv2_api";

const API_KEY_SELECTION_EXPRESSIONS: &[&str] = &[
    "$context.authorizer.usageIdentifierKey",
    "$request.header.x-api-key",
];

fn descriptor() -> ResourceDescriptor {
    let strings = || FieldType::list_of(FieldType::String);
    ResourceDescriptor::new(TYPE_NAME)
        .field(
            FieldSpec::required("name", FieldType::String)
                .validate(Validation::StringLen { min: 1, max: 128 }),
        )
        .field(
            FieldSpec::required("protocol_type", FieldType::String)
                .force_new()
                .validate(Validation::OneOf(&[PROTOCOL_HTTP, PROTOCOL_WEBSOCKET])),
        )
        .field(
            FieldSpec::optional("api_key_selection_expression", FieldType::String)
                .default_value("$request.header.x-api-key")
                .validate(Validation::OneOf(API_KEY_SELECTION_EXPRESSIONS)),
        )
        .field(FieldSpec::optional("body", FieldType::String))
        .field(FieldSpec::optional(
            "cors_configuration",
            FieldType::Block(vec![
                FieldSpec::optional("allow_credentials", FieldType::Bool),
                FieldSpec::optional("allow_headers", strings()),
                FieldSpec::optional("allow_methods", strings()),
                FieldSpec::optional("allow_origins", strings()),
                FieldSpec::optional("expose_headers", strings()),
                FieldSpec::optional("max_age", FieldType::Int),
            ]),
        ))
        .field(FieldSpec::optional("credentials_arn", FieldType::String).force_new())
        .field(
            FieldSpec::optional("description", FieldType::String)
                .validate(Validation::StringLen { min: 0, max: 1024 }),
        )
        .field(FieldSpec::optional("disable_execute_api_endpoint", FieldType::Bool))
        .field(FieldSpec::optional("fail_on_warnings", FieldType::Bool))
        .field(FieldSpec::optional("route_key", FieldType::String).force_new())
        .field(
            FieldSpec::optional("route_selection_expression", FieldType::String)
                .default_value("$request.method $request.path"),
        )
        .field(FieldSpec::optional("target", FieldType::String).force_new())
        .field(
            FieldSpec::optional("version", FieldType::String)
                .validate(Validation::StringLen { min: 1, max: 64 }),
        )
        .field(FieldSpec::computed("api_endpoint", FieldType::String))
        .field(FieldSpec::computed("arn", FieldType::String))
        .field(FieldSpec::computed("execution_arn", FieldType::String))
        .taggable()
}

fn expand_cors(fields: &Fields) -> Result<Option<Cors>> {
    let Some(block) = fields.block("cors_configuration")? else {
        return Ok(None);
    };
    Ok(Some(Cors {
        allow_credentials: block.bool("allow_credentials")?,
        allow_headers: block.string_list("allow_headers")?,
        allow_methods: block.string_list("allow_methods")?,
        allow_origins: block.string_list("allow_origins")?,
        expose_headers: block.string_list("expose_headers")?,
        max_age: block.int("max_age")?,
    }))
}

fn string_list(items: &[String]) -> Value {
    Value::string_list(items.iter().map(String::as_str))
}

fn flatten_cors(cors: &Cors) -> Value {
    Value::block(
        Fields::new()
            .with("allow_credentials", cors.allow_credentials.unwrap_or(false))
            .with("allow_headers", string_list(&cors.allow_headers))
            .with("allow_methods", string_list(&cors.allow_methods))
            .with("allow_origins", string_list(&cors.allow_origins))
            .with("expose_headers", string_list(&cors.expose_headers))
            .with("max_age", cors.max_age.unwrap_or(0)),
    )
}

fn flatten(api: &Api, arn: &str, execution_arn: &str, desired: Option<&DesiredState>) -> Fields {
    let mut fields = Fields::new()
        .with("api_endpoint", api.endpoint.as_str())
        .with("api_key_selection_expression", api.api_key_selection_expression.as_str())
        .with("arn", arn)
        .with("description", api.description.clone())
        .with("disable_execute_api_endpoint", api.disable_execute_api_endpoint)
        .with("execution_arn", execution_arn)
        .with("name", api.name.as_str())
        .with("protocol_type", api.protocol_type.as_str())
        .with("route_selection_expression", api.route_selection_expression.as_str())
        .with("version", api.version.clone());
    if let Some(cors) = &api.cors {
        fields.set("cors_configuration", flatten_cors(cors));
    }
    // Write-only inputs are not returned by the remote side.
    if let Some(desired) = desired {
        for name in ["body", "credentials_arn", "fail_on_warnings", "route_key", "target"] {
            if let Some(value) = desired.fields.get(name) {
                fields.set(name, value.clone());
            }
        }
    }
    fields
}

/// The update request for changed groups. CORS is only sent when configured;
/// a removed block is cleared with a separate call.
fn update_request(inv: &Invocation<'_>, id: &str, fields: &Fields) -> Result<UpdateApiRequest> {
    let changed = |name: &str| inv.has_change(name);
    let string = |name: &str| -> Result<Option<String>> {
        Ok(if changed(name) {
            Some(fields.string(name)?.unwrap_or_default().to_string())
        } else {
            None
        })
    };
    Ok(UpdateApiRequest {
        api_id: id.to_string(),
        api_key_selection_expression: string("api_key_selection_expression")?,
        cors: if changed("cors_configuration") {
            expand_cors(fields)?
        } else {
            None
        },
        description: string("description")?,
        disable_execute_api_endpoint: if changed("disable_execute_api_endpoint") {
            Some(fields.bool_or("disable_execute_api_endpoint", false)?)
        } else {
            None
        },
        name: string("name")?,
        route_selection_expression: string("route_selection_expression")?,
        version: string("version")?,
    })
}

pub struct ApiResource<C> {
    cloud: Arc<C>,
    descriptor: ResourceDescriptor,
}

impl<C: ApiGatewayClient> ApiResource<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self {
            cloud,
            descriptor: descriptor(),
        }
    }

    fn arn(&self, config: &ProviderConfig, id: &str) -> String {
        format!(
            "arn:{}:apigateway:{}::/apis/{}",
            config.partition.id,
            self.cloud.region(),
            id
        )
    }

    fn execution_arn(&self, config: &ProviderConfig, id: &str) -> String {
        format!(
            "arn:{}:execute-api:{}:{}:{}",
            config.partition.id,
            self.cloud.region(),
            self.cloud.account_id(),
            id
        )
    }

    async fn get(&self, config: &ProviderConfig, id: &str) -> Result<Api> {
        config.classify(self.cloud.get_api(id).await, &[NOT_FOUND])
    }

    /// Reimport `body`, then restore the configured name, description,
    /// version, CORS and tags the import replaced.
    async fn import_openapi(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: &DesiredState,
        timeout: Duration,
    ) -> Result<()> {
        let fields = &desired.fields;
        let Some(body) = fields.non_empty_string("body")? else {
            return Ok(());
        };
        let fail_on_warnings = fields.bool_or("fail_on_warnings", false)?;
        let (client, config, interval) = (self.cloud.as_ref(), inv.config, inv.poll_interval());

        info!(id, fail_on_warnings, "Importing API Gateway v2 API OpenAPI specification");
        retry_transient(timeout, interval, || async {
            config.classify(client.reimport_api(id, body, fail_on_warnings).await, &[])
        })
        .await?;

        let imported = retry_transient(timeout, interval, || self.get(config, id)).await?;
        let cors = expand_cors(fields)?;
        let mut request = UpdateApiRequest {
            api_id: id.to_string(),
            name: Some(fields.required_string("name")?.to_string()),
            description: Some(fields.string("description")?.unwrap_or_default().to_string()),
            version: Some(fields.string("version")?.unwrap_or_default().to_string()),
            ..Default::default()
        };
        if imported.cors != cors {
            match cors {
                None => {
                    debug!(id, "Clearing imported CORS configuration");
                    retry_transient(timeout, interval, || async {
                        config.classify(client.delete_cors_configuration(id).await, &[])
                    })
                    .await?;
                }
                Some(cors) => request.cors = Some(cors),
            }
        }

        let effective = config.effective_tags(&desired.tags);
        let delta = imported.tags.diff(&effective, &config.ignore_tags);
        apply_tag_delta(inv, client, &self.arn(config, id), desired, delta).await?;

        retry_transient(timeout, interval, || async {
            config.classify(client.update_api(&request).await, &[])
        })
        .await
    }
}

#[async_trait]
impl<C: ApiGatewayClient + 'static> Resource for ApiResource<C> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn create(&self, inv: &mut Invocation<'_>, desired: &DesiredState) -> Result<String> {
        let fields = &desired.fields;
        let owned = |name: &str| -> Result<Option<String>> {
            Ok(fields.non_empty_string(name)?.map(str::to_string))
        };
        let request = CreateApiRequest {
            name: fields.required_string("name")?.to_string(),
            protocol_type: fields.required_string("protocol_type")?.to_string(),
            api_key_selection_expression: owned("api_key_selection_expression")?,
            cors: expand_cors(fields)?,
            credentials_arn: owned("credentials_arn")?,
            description: owned("description")?,
            disable_execute_api_endpoint: fields.bool("disable_execute_api_endpoint")?,
            route_key: owned("route_key")?,
            route_selection_expression: owned("route_selection_expression")?,
            target: owned("target")?,
            version: owned("version")?,
            tags: None,
        };

        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (api, deferred) = create_with_tags(inv, desired, |tags| {
            let request = CreateApiRequest {
                tags,
                ..request.clone()
            };
            async move { config.classify(client.create_api(&request).await, &[]) }
        })
        .await?;

        let id = api.id;
        info!(id = %id, "Created API Gateway v2 API");
        inv.assign_id(id.as_str());

        tag_after_create(inv, client, &self.arn(config, &id), desired, deferred).await?;
        let timeout = inv.timeouts.create;
        self.import_openapi(inv, &id, desired, timeout).await?;
        Ok(id)
    }

    async fn read(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Result<ReadResult> {
        let (config, timeout, interval) = (inv.config, inv.propagation_timeout(), inv.poll_interval());
        let api = match retry_transient(timeout, interval, || self.get(config, id)).await {
            Ok(api) => api,
            Err(e) if e.is_not_found() && !inv.new_resource => {
                warn!(id, "API Gateway v2 API not found, removing from state");
                return Ok(ReadResult::Absent);
            }
            Err(e) => return Err(e),
        };

        let fields = flatten(
            &api,
            &self.arn(config, id),
            &self.execution_arn(config, id),
            desired,
        );
        let mut state = ObservedState::new(id, fields);
        set_tags(inv, &mut state, &api.tags, desired);
        Ok(ReadResult::Found(state))
    }

    async fn update(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        _old: &DesiredState,
        new: &DesiredState,
    ) -> Result<()> {
        let fields = &new.fields;
        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (timeout, interval) = (inv.timeouts.update, inv.poll_interval());

        let clear_cors = inv.has_change("cors_configuration") && expand_cors(fields)?.is_none();
        if clear_cors {
            debug!(id, "Deleting API Gateway v2 API CORS configuration");
            retry_transient(timeout, interval, || async {
                config.classify(client.delete_cors_configuration(id).await, &[])
            })
            .await?;
        }

        let request = update_request(inv, id, fields)?;
        if !request.is_empty() {
            info!(id, "Updating API Gateway v2 API");
            retry_transient(timeout, interval, || async {
                config.classify(client.update_api(&request).await, &[])
            })
            .await?;
        }

        update_resource_tags(inv, client, &self.arn(config, id), new).await?;

        if inv.has_change("body") {
            self.import_openapi(inv, id, new, timeout).await?;
        }
        Ok(())
    }

    async fn delete(&self, inv: &mut Invocation<'_>, id: &str, _state: &DesiredState) -> Result<()> {
        info!(id, "Deleting API Gateway v2 API");
        let (client, config) = (self.cloud.as_ref(), inv.config);
        let deleted = retry_transient(inv.timeouts.delete, inv.poll_interval(), || async {
            config.classify(client.delete_api(id).await, &[NOT_FOUND])
        })
        .await;
        match deleted {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}
