use async_trait::async_trait;
use cumulus_engine::ApiError;
use serde_json::Value as Json;

use super::{DEFAULT_ACCOUNT, DEFAULT_REGION, Entry, Lifecycle, MemoryCloud, observe, peek};
use crate::api::apigatewayv2::{
    Api, ApiGatewayClient, BAD_REQUEST, CreateApiRequest, Cors, NOT_FOUND, PROTOCOL_HTTP,
    PROTOCOL_WEBSOCKET, UpdateApiRequest,
};

const DEFAULT_API_KEY_SELECTION: &str = "$request.header.x-api-key";
const DEFAULT_ROUTE_SELECTION: &str = "$request.method $request.path";

impl Lifecycle for Api {
    fn set_status(&mut self, _status: &'static str) {}
}

fn not_found(id: &str) -> ApiError {
    ApiError::new(
        NOT_FOUND,
        format!("Invalid API identifier specified {}:{}", DEFAULT_ACCOUNT, id),
    )
}

fn api_arn(id: &str) -> String {
    format!("arn:aws:apigateway:{}::/apis/{}", DEFAULT_REGION, id)
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::new(BAD_REQUEST, message)
}

fn strings(value: Option<&Json>) -> Vec<String> {
    value
        .and_then(Json::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Json::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// CORS settings carried by the `x-amazon-apigateway-cors` extension.
fn import_cors(document: &Json) -> Option<Cors> {
    let cors = document.get("x-amazon-apigateway-cors")?;
    Some(Cors {
        allow_credentials: cors.get("allowCredentials").and_then(Json::as_bool),
        allow_headers: strings(cors.get("allowHeaders")),
        allow_methods: strings(cors.get("allowMethods")),
        allow_origins: strings(cors.get("allowOrigins")),
        expose_headers: strings(cors.get("exposeHeaders")),
        max_age: cors.get("maxAge").and_then(Json::as_i64),
    })
}

#[async_trait]
impl ApiGatewayClient for MemoryCloud {
    fn region(&self) -> &str {
        DEFAULT_REGION
    }

    fn account_id(&self) -> &str {
        DEFAULT_ACCOUNT
    }

    async fn create_api(&self, request: &CreateApiRequest) -> Result<Api, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("create_api")?;
        state.check_tags_on_create(request.tags.as_ref())?;
        if ![PROTOCOL_HTTP, PROTOCOL_WEBSOCKET].contains(&request.protocol_type.as_str()) {
            return Err(bad_request(format!(
                "Invalid protocol type {}",
                request.protocol_type
            )));
        }
        if request.protocol_type == PROTOCOL_WEBSOCKET && request.cors.is_some() {
            return Err(bad_request("CORS is only supported for HTTP APIs"));
        }

        let id = format!("{:010x}", state.sequence());
        let api = Api {
            endpoint: format!("https://{}.execute-api.{}.amazonaws.com", id, DEFAULT_REGION),
            api_key_selection_expression: request
                .api_key_selection_expression
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_SELECTION.to_string()),
            cors: request.cors.clone(),
            description: request.description.clone(),
            disable_execute_api_endpoint: request.disable_execute_api_endpoint.unwrap_or(false),
            name: request.name.clone(),
            protocol_type: request.protocol_type.clone(),
            route_selection_expression: request
                .route_selection_expression
                .clone()
                .unwrap_or_else(|| DEFAULT_ROUTE_SELECTION.to_string()),
            version: request.version.clone(),
            tags: request.tags.clone().unwrap_or_default(),
            id,
        };
        state.store_tags(&api_arn(&api.id), request.tags.as_ref());
        let hidden = state.describe_lag;
        state
            .apis
            .insert(api.id.clone(), Entry::new(api.clone(), hidden));
        Ok(api)
    }

    async fn get_api(&self, id: &str) -> Result<Api, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("get_api")?;
        let mut api = observe(&mut state.apis, id).ok_or_else(|| not_found(id))?;
        api.tags = state.tags.get(&api_arn(id)).cloned().unwrap_or_default();
        Ok(api)
    }

    async fn update_api(&self, request: &UpdateApiRequest) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("update_api")?;
        let api = peek(&mut state.apis, &request.api_id)
            .ok_or_else(|| not_found(&request.api_id))?;
        if let Some(v) = &request.api_key_selection_expression {
            api.api_key_selection_expression = v.clone();
        }
        if let Some(cors) = &request.cors {
            api.cors = Some(cors.clone());
        }
        if let Some(v) = &request.description {
            api.description = Some(v.clone());
        }
        if let Some(v) = request.disable_execute_api_endpoint {
            api.disable_execute_api_endpoint = v;
        }
        if let Some(v) = &request.name {
            api.name = v.clone();
        }
        if let Some(v) = &request.route_selection_expression {
            api.route_selection_expression = v.clone();
        }
        if let Some(v) = &request.version {
            api.version = Some(v.clone());
        }
        Ok(())
    }

    async fn delete_cors_configuration(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("delete_cors_configuration")?;
        let api = peek(&mut state.apis, id).ok_or_else(|| not_found(id))?;
        api.cors = None;
        Ok(())
    }

    async fn reimport_api(
        &self,
        id: &str,
        body: &str,
        fail_on_warnings: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("reimport_api")?;
        let document: Json = serde_json::from_str(body)
            .map_err(|e| bad_request(format!("Unable to parse the OpenAPI document: {}", e)))?;
        let api = peek(&mut state.apis, id).ok_or_else(|| not_found(id))?;

        let info = document.get("info");
        let title = info.and_then(|i| i.get("title")).and_then(Json::as_str);
        if fail_on_warnings && title.is_none() {
            return Err(bad_request("Warnings found during import: missing info.title"));
        }
        if let Some(title) = title {
            api.name = title.to_string();
        }
        api.version = info
            .and_then(|i| i.get("version"))
            .and_then(Json::as_str)
            .map(str::to_string);
        api.description = info
            .and_then(|i| i.get("description"))
            .and_then(Json::as_str)
            .map(str::to_string);
        api.cors = import_cors(&document);
        Ok(())
    }

    async fn delete_api(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("delete_api")?;
        if state.apis.remove(id).is_none() {
            return Err(not_found(id));
        }
        state.tags.remove(&api_arn(id));
        Ok(())
    }
}
