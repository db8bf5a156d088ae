use crate::guard::media_essence;
use crate::writer::ResponseWriter;
use http::{HeaderValue, StatusCode, header};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Write an error response whose body suits the handler's content type.
///
/// With the content type set to `application/json` and the message `oops!`
/// the body is `{"error":"oops!","status":500}`. `text/html` gets the message
/// entity-escaped; anything else gets `error: oops!`.
pub fn write_error(w: &mut dyn ResponseWriter, message: &str, status: StatusCode) {
    let configured = w.content_type().map(str::to_owned);
    let body = match configured.as_deref().map(media_essence).as_deref() {
        Some(t) if t == "application/json" || t.ends_with("+json") => serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        })
        .to_string(),
        Some("text/html") => html_escape::encode_quoted_attribute(message).into_owned(),
        _ => format!("error: {message}"),
    };

    let content_type = configured
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(TEXT_PLAIN));

    let headers = w.headers_mut();
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    w.write_header(status);
    w.write(body.as_bytes());
    w.write(b"\n");
}
