/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `store`.)

Authentication lives upstream: whatever fronts this service (the auth
proxy) verifies credentials and injects the requesting user's id in the
`x-lanyard-uid` header. Handlers here trust that header and nothing else.
*/
use axum::{
    http::StatusCode,
    http::header::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

pub mod cards;
pub mod students;

/// Header the authentication collaborator sets on every proxied request.
pub static UID_HEADER: &str = "x-lanyard-uid";

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/**
Return a response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

/**
The requesting user's id, per the authentication collaborator.

Every handler calls this first; a request that arrives without a usable
`x-lanyard-uid` header never made it through the auth layer and gets a
401.
*/
pub fn request_uid(headers: &HeaderMap) -> Result<i64, Response> {
    let val = match headers.get(UID_HEADER) {
        Some(val) => val,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                format!("Request must have an {} header.", UID_HEADER),
            ).into_response());
        },
    };

    let s = match val.to_str() {
        Ok(s) => s,
        Err(e) => {
            log::error!(
                "Failed converting uid value {:?} to &str: {}",
                val, &e
            );
            return Err(respond_bad_request(
                format!("{} value unrecognizable.", UID_HEADER)
            ));
        },
    };

    match s.parse::<i64>() {
        Ok(uid) => Ok(uid),
        Err(_) => Err(respond_bad_request(
            format!("{} value must be a user id.", UID_HEADER)
        )),
    }
}

/// Map a `Store` failure onto the wire.
pub fn respond_store_error(err: StoreError) -> Response {
    log::trace!("respond_store_error( {:?} ) called.", &err);

    match err {
        StoreError::Invalid(errs) => {
            let mut fields = serde_json::Map::new();
            for e in errs.into_iter() {
                fields.insert(e.field.to_owned(), e.message.into());
            }
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": fields })),
            ).into_response()
        },
        e @ StoreError::Duplicate { .. } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": e.to_string() })),
        ).into_response(),
        e @ StoreError::Forbidden => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": e.to_string() })),
        ).into_response(),
        e @ StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        ).into_response(),
        StoreError::Db(s) => {
            log::error!("Data DB error fielding request: {}", &s);
            text_500(None)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(request_uid(&headers).is_err());

        headers.insert(UID_HEADER, HeaderValue::from_static("41"));
        assert_eq!(request_uid(&headers).unwrap(), 41);

        headers.insert(UID_HEADER, HeaderValue::from_static("forty-one"));
        assert!(request_uid(&headers).is_err());
    }
}
