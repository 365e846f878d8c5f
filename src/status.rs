//! HTTP status codes as a typed enum.
//!
//! Every write on [`Context`](crate::Context) takes `impl Into<u16>`, so a
//! [`Status`] and a raw `u16` are both accepted:
//!
//! ```rust
//! use easierweb::{Context, Status};
//!
//! async fn delete_member(ctx: &mut Context) -> easierweb::Result<()> {
//!     ctx.no_content(Status::NoContent);
//!     Ok(())
//! }
//! ```

/// Status codes the framework and its plugins write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    // ── 1xx / 2xx ─────────────────────────────────────────────────────────────
    SwitchingProtocols,            // 101
    Ok,                            // 200
    Created,                       // 201
    Accepted,                      // 202
    NoContent,                     // 204

    // ── 3xx Redirection ───────────────────────────────────────────────────────
    MovedPermanently,              // 301
    Found,                         // 302
    SeeOther,                      // 303
    NotModified,                   // 304
    TemporaryRedirect,             // 307
    PermanentRedirect,             // 308

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,                    // 400
    Unauthorized,                  // 401
    Forbidden,                     // 403
    NotFound,                      // 404
    MethodNotAllowed,              // 405
    Conflict,                      // 409
    ContentTooLarge,               // 413
    UnsupportedMediaType,          // 415
    UnprocessableContent,          // 422
    TooManyRequests,               // 429

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError,           // 500
    NotImplemented,                // 501
    BadGateway,                    // 502
    ServiceUnavailable,            // 503
    GatewayTimeout,                // 504
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::SwitchingProtocols   => 101,
            Status::Ok                   => 200,
            Status::Created              => 201,
            Status::Accepted             => 202,
            Status::NoContent            => 204,
            Status::MovedPermanently     => 301,
            Status::Found                => 302,
            Status::SeeOther             => 303,
            Status::NotModified          => 304,
            Status::TemporaryRedirect    => 307,
            Status::PermanentRedirect    => 308,
            Status::BadRequest           => 400,
            Status::Unauthorized         => 401,
            Status::Forbidden            => 403,
            Status::NotFound             => 404,
            Status::MethodNotAllowed     => 405,
            Status::Conflict             => 409,
            Status::ContentTooLarge      => 413,
            Status::UnsupportedMediaType => 415,
            Status::UnprocessableContent => 422,
            Status::TooManyRequests      => 429,
            Status::InternalServerError  => 500,
            Status::NotImplemented       => 501,
            Status::BadGateway           => 502,
            Status::ServiceUnavailable   => 503,
            Status::GatewayTimeout       => 504,
        }
    }
}

impl From<Status> for http::StatusCode {
    fn from(s: Status) -> Self {
        // Every variant maps to a code inside 100..=999.
        http::StatusCode::from_u16(s.into()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_wire_codes() {
        assert_eq!(u16::from(Status::NoContent), 204);
        assert_eq!(http::StatusCode::from(Status::BadRequest), http::StatusCode::BAD_REQUEST);
    }
}
