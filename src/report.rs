//! Turning a failed dispatch into exactly one error response.

use std::backtrace::Backtrace;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error};

use crate::context::Context;
use crate::dispatcher::send;
use crate::error::Error;
use crate::hive::Value;
use crate::invoker::ROUTE_HOOKS;
use crate::response::{ContentType, Transport};
use crate::status;

/// What the hive holds under `ERROR` while an error is being reported.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorReport {
    pub status: String,
    pub code: u16,
    pub text: String,
    pub trace: Vec<String>,
}

impl ErrorReport {
    fn to_value(&self) -> Value {
        Value::Map(
            [
                ("status".to_owned(), Value::from(self.status.as_str())),
                ("code".to_owned(), Value::from(u64::from(self.code))),
                ("text".to_owned(), Value::from(self.text.as_str())),
                ("trace".to_owned(), Value::from(self.trace.clone())),
            ]
            .into_iter()
            .collect(),
        )
    }
}

/// Reports `err`: logs it, records it under `ERROR`, gives the registered
/// error handler a chance to respond and otherwise renders a default page.
///
/// The default page is skipped when an error was already being reported,
/// when `QUIET` is set, or when the error handler completed without
/// aborting.
pub(crate) async fn report<T: Transport>(cx: &mut Context, err: &Error, transport: &mut T) {
    let prior = cx.hive.exists("ERROR").unwrap_or(false);
    let code = err.status().code();
    let text = if err.is_http() {
        format!("HTTP {code} ({} {})", cx.request.verb(), cx.request.path())
    } else {
        err.to_string()
    };
    error!(code, ip = %cx.request.ip(), "{text}");

    let trace: Vec<String> = if cx.hive.lookup("DEBUG").ok().flatten().and_then(Value::as_int).unwrap_or(0) > 0 {
        Backtrace::force_capture()
            .to_string()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect()
    } else {
        Vec::new()
    };
    for frame in &trace {
        debug!("- {frame}");
    }

    let report = ErrorReport {
        status: status::reason(code).to_owned(),
        code,
        text,
        trace,
    };
    cx.set_status(code);
    cx.take_output();
    if let Err(e) = cx.hive.set("ERROR", report.to_value()) {
        error!("could not record error: {e}");
    }

    let handled = match cx.app().on_error.clone() {
        Some(handler) => match cx.call(handler, &[], ROUTE_HOOKS) {
            Ok(outcome) => !outcome.is_abort(),
            Err(e) => {
                error!("error handler failed: {e}");
                false
            }
        },
        None => false,
    };

    let mut body = cx.take_output();
    if !handled && !prior && !cx.hive.flag("QUIET") {
        body = if cx.request.is_ajax() {
            cx.content_type(ContentType::Json);
            serde_json::to_string(&report).unwrap_or_default()
        } else {
            cx.content_type(ContentType::Html);
            render(&report)
        };
    }
    if let Err(e) = send(cx, transport, Bytes::from(body), 0).await {
        debug!("error response not delivered: {e}");
    }
}

fn render(report: &ErrorReport) -> String {
    let trace = if report.trace.is_empty() {
        String::new()
    } else {
        format!("<pre>{}</pre>\n", escape(&report.trace.join("\n")))
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{code} {status}</title></head>\n<body>\n\
         <h1>{status}</h1>\n<p>{text}</p>\n{trace}</body>\n</html>",
        code = report.code,
        status = escape(&report.status),
        text = escape(&report.text),
    )
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_escapes_text() {
        let page = render(&ErrorReport {
            status: "Not Found".to_owned(),
            code: 404,
            text: "HTTP 404 (GET /<script>)".to_owned(),
            trace: Vec::new(),
        });
        assert!(page.contains("<title>404 Not Found</title>"));
        assert!(page.contains("/&lt;script&gt;"));
        assert!(!page.contains("<pre>"));
    }
}
