//! HTTP status codes as a typed enum.
//!
//! The table is the RFC 2616 subset the dispatcher and the error reporter
//! speak. Anything else a handler wants to send goes through
//! [`Context::set_status`](crate::Context::set_status) as a raw `u16`.
//!
//! ```rust
//! use thistle::Status;
//!
//! assert_eq!(Status::MethodNotAllowed.code(), 405);
//! assert_eq!(Status::MethodNotAllowed.reason(), "Method Not Allowed");
//! assert_eq!(Status::from_code(304), Some(Status::NotModified));
//! ```

/// RFC 2616 status codes.
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    // ── 1xx Informational ─────────────────────────────────────────────────────
    Continue,                      // 100
    SwitchingProtocols,            // 101

    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                            // 200
    Created,                       // 201
    Accepted,                      // 202
    NonAuthoritativeInformation,   // 203
    NoContent,                     // 204
    ResetContent,                  // 205
    PartialContent,                // 206

    // ── 3xx Redirection ───────────────────────────────────────────────────────
    MultipleChoices,               // 300
    MovedPermanently,              // 301
    Found,                         // 302
    SeeOther,                      // 303
    NotModified,                   // 304
    UseProxy,                      // 305
    TemporaryRedirect,             // 307

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,                    // 400
    Unauthorized,                  // 401
    PaymentRequired,               // 402
    Forbidden,                     // 403
    NotFound,                      // 404
    MethodNotAllowed,              // 405
    NotAcceptable,                 // 406
    ProxyAuthenticationRequired,   // 407
    RequestTimeout,                // 408
    Conflict,                      // 409
    Gone,                          // 410
    LengthRequired,                // 411
    PreconditionFailed,            // 412
    RequestEntityTooLarge,         // 413
    RequestUriTooLong,             // 414
    UnsupportedMediaType,          // 415
    RequestedRangeNotSatisfiable,  // 416
    ExpectationFailed,             // 417

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError,           // 500
    NotImplemented,                // 501
    BadGateway,                    // 502
    ServiceUnavailable,            // 503
    GatewayTimeout,                // 504
    HttpVersionNotSupported,       // 505
}

const TABLE: &[(Status, u16, &str)] = &[
    (Status::Continue,                     100, "Continue"),
    (Status::SwitchingProtocols,           101, "Switching Protocols"),
    (Status::Ok,                           200, "OK"),
    (Status::Created,                      201, "Created"),
    (Status::Accepted,                     202, "Accepted"),
    (Status::NonAuthoritativeInformation,  203, "Non-Authoritative Information"),
    (Status::NoContent,                    204, "No Content"),
    (Status::ResetContent,                 205, "Reset Content"),
    (Status::PartialContent,               206, "Partial Content"),
    (Status::MultipleChoices,              300, "Multiple Choices"),
    (Status::MovedPermanently,             301, "Moved Permanently"),
    (Status::Found,                        302, "Found"),
    (Status::SeeOther,                     303, "See Other"),
    (Status::NotModified,                  304, "Not Modified"),
    (Status::UseProxy,                     305, "Use Proxy"),
    (Status::TemporaryRedirect,            307, "Temporary Redirect"),
    (Status::BadRequest,                   400, "Bad Request"),
    (Status::Unauthorized,                 401, "Unauthorized"),
    (Status::PaymentRequired,              402, "Payment Required"),
    (Status::Forbidden,                    403, "Forbidden"),
    (Status::NotFound,                     404, "Not Found"),
    (Status::MethodNotAllowed,             405, "Method Not Allowed"),
    (Status::NotAcceptable,                406, "Not Acceptable"),
    (Status::ProxyAuthenticationRequired,  407, "Proxy Authentication Required"),
    (Status::RequestTimeout,               408, "Request Timeout"),
    (Status::Conflict,                     409, "Conflict"),
    (Status::Gone,                         410, "Gone"),
    (Status::LengthRequired,               411, "Length Required"),
    (Status::PreconditionFailed,           412, "Precondition Failed"),
    (Status::RequestEntityTooLarge,        413, "Request Entity Too Large"),
    (Status::RequestUriTooLong,            414, "Request-URI Too Long"),
    (Status::UnsupportedMediaType,         415, "Unsupported Media Type"),
    (Status::RequestedRangeNotSatisfiable, 416, "Requested Range Not Satisfiable"),
    (Status::ExpectationFailed,            417, "Expectation Failed"),
    (Status::InternalServerError,          500, "Internal Server Error"),
    (Status::NotImplemented,               501, "Not Implemented"),
    (Status::BadGateway,                   502, "Bad Gateway"),
    (Status::ServiceUnavailable,           503, "Service Unavailable"),
    (Status::GatewayTimeout,               504, "Gateway Timeout"),
    (Status::HttpVersionNotSupported,      505, "HTTP Version Not Supported"),
];

impl Status {
    pub fn code(self) -> u16 {
        TABLE.iter().find(|(s, ..)| *s == self).map_or(500, |(_, code, _)| *code)
    }

    pub fn reason(self) -> &'static str {
        TABLE.iter().find(|(s, ..)| *s == self).map_or("", |(.., reason)| reason)
    }

    pub fn from_code(code: u16) -> Option<Self> {
        TABLE.iter().find(|(_, c, _)| *c == code).map(|(s, ..)| *s)
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}

/// Reason phrase for a raw code; empty for codes outside the table.
pub(crate) fn reason(code: u16) -> &'static str {
    Status::from_code(code).map_or("", Status::reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_consistent() {
        for (status, code, reason) in TABLE {
            assert_eq!(status.code(), *code);
            assert_eq!(status.reason(), *reason);
            assert_eq!(Status::from_code(*code), Some(*status));
        }
    }

    #[test]
    fn unknown_code_has_no_reason() {
        assert_eq!(reason(418), "");
        assert_eq!(reason(301), "Moved Permanently");
    }
}
