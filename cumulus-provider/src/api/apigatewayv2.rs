//! HTTP and WebSocket API gateway.

use async_trait::async_trait;
use cumulus_engine::{ApiError, TagSet};

use super::TagClient;

pub const NOT_FOUND: &str = "NotFoundException";
pub const BAD_REQUEST: &str = "BadRequestException";

pub const PROTOCOL_HTTP: &str = "HTTP";
pub const PROTOCOL_WEBSOCKET: &str = "WEBSOCKET";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cors {
    pub allow_credentials: Option<bool>,
    pub allow_headers: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_origins: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Api {
    pub id: String,
    pub endpoint: String,
    pub api_key_selection_expression: String,
    pub cors: Option<Cors>,
    pub description: Option<String>,
    pub disable_execute_api_endpoint: bool,
    pub name: String,
    pub protocol_type: String,
    pub route_selection_expression: String,
    pub version: Option<String>,
    pub tags: TagSet,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateApiRequest {
    pub name: String,
    pub protocol_type: String,
    pub api_key_selection_expression: Option<String>,
    pub cors: Option<Cors>,
    pub credentials_arn: Option<String>,
    pub description: Option<String>,
    pub disable_execute_api_endpoint: Option<bool>,
    pub route_key: Option<String>,
    pub route_selection_expression: Option<String>,
    pub target: Option<String>,
    pub version: Option<String>,
    pub tags: Option<TagSet>,
}

/// Fields left `None` are not changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateApiRequest {
    pub api_id: String,
    pub api_key_selection_expression: Option<String>,
    pub cors: Option<Cors>,
    pub description: Option<String>,
    pub disable_execute_api_endpoint: Option<bool>,
    pub name: Option<String>,
    pub route_selection_expression: Option<String>,
    pub version: Option<String>,
}

impl UpdateApiRequest {
    pub fn is_empty(&self) -> bool {
        self.api_key_selection_expression.is_none()
            && self.cors.is_none()
            && self.description.is_none()
            && self.disable_execute_api_endpoint.is_none()
            && self.name.is_none()
            && self.route_selection_expression.is_none()
            && self.version.is_none()
    }
}

#[async_trait]
pub trait ApiGatewayClient: TagClient {
    /// Region the client is bound to.
    fn region(&self) -> &str;

    /// Account the client acts as.
    fn account_id(&self) -> &str;

    async fn create_api(&self, request: &CreateApiRequest) -> Result<Api, ApiError>;

    async fn get_api(&self, id: &str) -> Result<Api, ApiError>;

    async fn update_api(&self, request: &UpdateApiRequest) -> Result<(), ApiError>;

    async fn delete_cors_configuration(&self, id: &str) -> Result<(), ApiError>;

    /// Replace the API definition with an OpenAPI document.
    async fn reimport_api(&self, id: &str, body: &str, fail_on_warnings: bool)
    -> Result<(), ApiError>;

    async fn delete_api(&self, id: &str) -> Result<(), ApiError>;
}
