#![allow(clippy::needless_for_each)]

use super::{
    handlers::{debug, health, tokens, users},
    types,
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        tokens::request_registration_token,
        tokens::request_password_reset_token,
        tokens::request_email_change_token,
        tokens::request_account_deletion_token,
        tokens::create_authentication_token,
        tokens::delete_authentication_tokens,
        users::register_user,
        users::reset_password,
        users::show_current_user,
        users::update_current_user,
        users::delete_current_user,
        debug::vars,
    ),
    components(schemas(
        types::EmailRequest,
        types::LoginRequest,
        types::TokenPasswordRequest,
        types::UpdateProfileRequest,
        types::DeleteAccountRequest,
        types::MessageResponse,
        types::UserView,
        types::UserResponse,
        types::AuthenticationTokenView,
        types::AuthenticationTokenResponse,
        types::SystemInfo,
        types::Health,
        types::ErrorResponse,
        types::RequestTotals,
        types::DatabaseStats,
        types::DebugVars,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness and build information"),
        (name = "tokens", description = "Verification and bearer tokens"),
        (name = "users", description = "Account lifecycle"),
        (name = "debug", description = "Process counters")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/tokens/verification/registration",
            "/v1/tokens/verification/password-reset",
            "/v1/tokens/verification/email-change",
            "/v1/tokens/verification/account-deletion",
            "/v1/tokens/authentication",
            "/v1/users",
            "/v1/users/password",
            "/v1/users/me",
            "/debug/vars",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
