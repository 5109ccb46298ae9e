use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::error::ErrorResponse;
use super::api::telescope::{AutoInitRequest, ConnectRequest, GotoRequest, ObserveRequest};
use crate::telescope::{ConnectionState, Pose, SessionStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::telescope::connect,
        super::api::telescope::disconnect,
        super::api::telescope::goto,
        super::api::telescope::observe,
        super::api::telescope::stop,
        super::api::telescope::park,
        super::api::telescope::focus,
        super::api::telescope::open_arm,
        super::api::telescope::auto_init,
        super::api::telescope::status,
    ),
    components(
        schemas(
            ConnectRequest,
            GotoRequest,
            ObserveRequest,
            AutoInitRequest,
            SessionStatus,
            ConnectionState,
            Pose,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Scope-O-Mat Telescope API",
        description = "Remote control of a network-attached telescope",
        version = "0.1.0"
    ),
    tags(
        (name = "telescope", description = "Telescope session control")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
