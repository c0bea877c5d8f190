// SPDX-License-Identifier: MIT

//! Security headers applied to every response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

const HEADERS: &[(&str, &str)] = &[
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    (
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains",
    ),
    ("Referrer-Policy", "no-referrer"),
];

/// Add security headers to all responses.
///
/// No CSP here: the callback bridge page needs its inline script, and the
/// rest of the API serves JSON where a CSP is inert.
pub async fn add_security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    for (name, value) in HEADERS {
        headers.insert(*name, HeaderValue::from_static(value));
    }

    response
}
