//! Mapping serenity failures onto [`ApiError`].

use {
    beenbag_channels::{ApiError, ApiErrorKind},
    serenity::{gateway::GatewayError, http::HttpError},
};

/// JSON error codes that mean the target is already gone.
const UNKNOWN_CHANNEL: i64 = 10003;
const UNKNOWN_MESSAGE: i64 = 10008;
const UNKNOWN_USER: i64 = 10013;

/// Kind for an unsuccessful REST response.
///
/// serenity's ratelimiter sleeps on a `retry-after` header and re-sends by
/// itself, so a 429 that reaches this point carries no hint and the gate
/// falls back to its own backoff.
#[must_use]
pub fn kind_for_response(status: u16, code: i64) -> ApiErrorKind {
    match (status, code) {
        (429, _) => ApiErrorKind::Throttled,
        (_, UNKNOWN_CHANNEL | UNKNOWN_MESSAGE | UNKNOWN_USER) | (404, _) => ApiErrorKind::NotFound,
        (500..=599, _) => ApiErrorKind::Transient,
        _ => ApiErrorKind::Permanent,
    }
}

fn kind_of(err: &serenity::Error) -> ApiErrorKind {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
            kind_for_response(resp.status_code.as_u16(), resp.error.code as i64)
        },
        serenity::Error::Http(HttpError::Request(_)) | serenity::Error::Io(_) => {
            ApiErrorKind::Transient
        },
        serenity::Error::Gateway(gateway) => gateway_kind(gateway),
        _ => ApiErrorKind::Permanent,
    }
}

/// Gateway failures are transient unless retrying cannot help.
#[must_use]
pub fn gateway_kind(err: &GatewayError) -> ApiErrorKind {
    match err {
        GatewayError::InvalidAuthentication
        | GatewayError::NoAuthentication
        | GatewayError::InvalidGatewayIntents
        | GatewayError::DisallowedGatewayIntents => ApiErrorKind::Permanent,
        GatewayError::OverloadedShard => ApiErrorKind::Throttled,
        _ => ApiErrorKind::Transient,
    }
}

/// Classify a failed REST call.
#[must_use]
pub fn classify(operation: &'static str, err: serenity::Error) -> ApiError {
    ApiError::external(kind_of(&err), operation, err)
}

/// Classify the error that ended a gateway session. Anything serenity
/// cannot attribute to a specific cause is worth a reconnect.
#[must_use]
pub fn classify_session(err: serenity::Error) -> ApiError {
    let kind = match &err {
        serenity::Error::Http(_) | serenity::Error::Gateway(_) | serenity::Error::Io(_) => {
            kind_of(&err)
        },
        _ => ApiErrorKind::Transient,
    };
    ApiError::external(kind, "gateway session", err)
}
