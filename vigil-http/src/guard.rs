use crate::writer::ResponseWriter;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header};
use vigil_core::{NegotiationHeader, VigilError};

/// Outcome of the pre-delegation checks.
#[derive(Debug)]
pub enum Admission {
    Admit,
    Reject(Rejection),
}

/// Why a request was turned away, with the header value to send back.
#[derive(Debug, Clone)]
pub enum Rejection {
    /// 405 with `Allow`.
    MethodNotAllowed { allow: HeaderValue },
    /// 406 with `Accept`.
    NotAcceptable { accept: HeaderValue },
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Rejection::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
        }
    }

    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::MethodNotAllowed { .. } => "method",
            Rejection::NotAcceptable { .. } => "media_type",
        }
    }

    /// Set the explanatory header, then the status.
    pub fn apply(&self, w: &mut dyn ResponseWriter) {
        match self {
            Rejection::MethodNotAllowed { allow } => {
                w.headers_mut().insert(header::ALLOW, allow.clone());
            }
            Rejection::NotAcceptable { accept } => {
                w.headers_mut().insert(header::ACCEPT, accept.clone());
            }
        }
        w.write_header(self.status());
    }
}

/// Method allow-list plus media-type check, evaluated before the inner
/// handler runs. An unconfigured guard admits everything.
#[derive(Debug, Clone, Default)]
pub struct AdmissionGuard {
    allowed_methods: Vec<Method>,
    allow_header: Option<HeaderValue>,
    accepted_type: Option<String>,
    accept_header: Option<HeaderValue>,
    negotiation: NegotiationHeader,
}

impl AdmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the methods served. Order is kept for the `Allow` header;
    /// duplicates are ignored. An empty list lifts the restriction.
    pub fn set_allowed_methods<I, S>(&mut self, methods: I) -> Result<(), VigilError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed: Vec<Method> = Vec::new();
        for m in methods {
            let raw = m.as_ref().trim();
            let method = Method::from_bytes(raw.as_bytes())
                .map_err(|_| VigilError::InvalidMethod(raw.to_string()))?;
            if !parsed.contains(&method) {
                parsed.push(method);
            }
        }

        if parsed.is_empty() {
            self.allowed_methods.clear();
            self.allow_header = None;
            return Ok(());
        }

        let joined = parsed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let value = HeaderValue::from_str(&joined)
            .map_err(|_| VigilError::InvalidMethod(joined.clone()))?;
        self.allowed_methods = parsed;
        self.allow_header = Some(value);
        Ok(())
    }

    /// Only admit requests negotiating `mime`. An empty string lifts the
    /// restriction.
    pub fn set_accepted_type(&mut self, mime: &str) -> Result<(), VigilError> {
        let mime = mime.trim();
        if mime.is_empty() {
            self.accepted_type = None;
            self.accept_header = None;
            return Ok(());
        }

        let essence = media_essence(mime);
        let valid = match essence.split_once('/') {
            Some((ty, sub)) => {
                !ty.is_empty() && !sub.is_empty() && !essence.contains('*') && !sub.contains('/')
            }
            None => false,
        };
        if !valid {
            return Err(VigilError::InvalidMediaType(mime.to_string()));
        }
        let value =
            HeaderValue::from_str(mime).map_err(|_| VigilError::InvalidMediaType(mime.to_string()))?;

        self.accepted_type = Some(essence);
        self.accept_header = Some(value);
        Ok(())
    }

    pub fn set_negotiation_header(&mut self, negotiation: NegotiationHeader) {
        self.negotiation = negotiation;
    }

    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    pub fn accepted_type(&self) -> Option<&str> {
        self.accepted_type.as_deref()
    }

    pub fn negotiation(&self) -> NegotiationHeader {
        self.negotiation
    }

    /// Method check first, then media type. At most one rejection.
    pub fn check<B>(&self, req: &Request<B>) -> Admission {
        if let Some(ref allow) = self.allow_header {
            if !self.allowed_methods.contains(req.method()) {
                return Admission::Reject(Rejection::MethodNotAllowed {
                    allow: allow.clone(),
                });
            }
        }

        if let (Some(accepted), Some(accept)) = (&self.accepted_type, &self.accept_header) {
            let ok = match self.negotiation {
                NegotiationHeader::Accept => accept_admits(req.headers(), accepted),
                NegotiationHeader::ContentType => content_type_admits(req.headers(), accepted),
            };
            if !ok {
                return Admission::Reject(Rejection::NotAcceptable {
                    accept: accept.clone(),
                });
            }
        }

        Admission::Admit
    }
}

/// `type/subtype` in lower case, parameters dropped.
pub(crate) fn media_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

// Absent or empty Accept admits; otherwise one range must cover `accepted`.
// q-values are not weighed.
fn accept_admits(headers: &HeaderMap, accepted: &str) -> bool {
    let mut saw_range = false;
    for value in headers.get_all(header::ACCEPT) {
        let Ok(value) = value.to_str() else {
            return false;
        };
        for range in value.split(',').map(media_essence) {
            if range.is_empty() {
                continue;
            }
            saw_range = true;
            if range_covers(&range, accepted) {
                return true;
            }
        }
    }
    !saw_range
}

fn range_covers(range: &str, accepted: &str) -> bool {
    if range == "*/*" || range == accepted {
        return true;
    }
    match (range.strip_suffix("/*"), accepted.split_once('/')) {
        (Some(ty), Some((accepted_ty, _))) => ty == accepted_ty,
        _ => false,
    }
}

fn content_type_admits(headers: &HeaderMap, accepted: &str) -> bool {
    match headers.get(header::CONTENT_TYPE) {
        None => true,
        Some(value) => match value.to_str() {
            Ok(v) => {
                let essence = media_essence(v);
                essence.is_empty() || essence == accepted
            }
            Err(_) => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ResponseBuffer;

    fn req(method: Method) -> Request<()> {
        Request::builder().method(method).uri("/").body(()).unwrap()
    }

    fn req_with(name: header::HeaderName, value: &str) -> Request<()> {
        Request::builder()
            .uri("/")
            .header(name, value)
            .body(())
            .unwrap()
    }

    fn json_guard(negotiation: NegotiationHeader) -> AdmissionGuard {
        let mut g = AdmissionGuard::new();
        g.set_accepted_type("application/json").unwrap();
        g.set_negotiation_header(negotiation);
        g
    }

    #[test]
    fn unconfigured_guard_admits_everything() {
        let g = AdmissionGuard::new();
        assert!(matches!(g.check(&req(Method::DELETE)), Admission::Admit));
        assert!(matches!(
            g.check(&req_with(header::ACCEPT, "image/png")),
            Admission::Admit
        ));
    }

    #[test]
    fn disallowed_method_gets_405_with_allow_list() {
        let mut g = AdmissionGuard::new();
        g.set_allowed_methods(["GET", "POST"]).unwrap();
        assert!(matches!(g.check(&req(Method::GET)), Admission::Admit));
        assert!(matches!(g.check(&req(Method::POST)), Admission::Admit));

        let Admission::Reject(rejection) = g.check(&req(Method::DELETE)) else {
            panic!("DELETE should be rejected");
        };
        assert_eq!(rejection.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(rejection.reason(), "method");

        let mut buf = ResponseBuffer::new();
        rejection.apply(&mut buf);
        let resp = buf.into_response();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()[header::ALLOW], "GET, POST");
    }

    #[test]
    fn allow_list_keeps_order_and_drops_duplicates() {
        let mut g = AdmissionGuard::new();
        g.set_allowed_methods(["PUT", " GET ", "PUT"]).unwrap();
        assert_eq!(g.allowed_methods(), &[Method::PUT, Method::GET]);
    }

    #[test]
    fn empty_allow_list_lifts_restriction() {
        let mut g = AdmissionGuard::new();
        g.set_allowed_methods(["GET"]).unwrap();
        g.set_allowed_methods(Vec::<String>::new()).unwrap();
        assert!(matches!(g.check(&req(Method::PATCH)), Admission::Admit));
    }

    #[test]
    fn invalid_method_is_an_error() {
        let mut g = AdmissionGuard::new();
        let err = g.set_allowed_methods(["GET", "BAD METHOD"]).unwrap_err();
        assert!(matches!(err, VigilError::InvalidMethod(ref m) if m == "BAD METHOD"));
        assert!(g.allowed_methods().is_empty());
    }

    #[test]
    fn invalid_media_types_are_rejected() {
        let mut g = AdmissionGuard::new();
        for bad in ["json", "application/", "/json", "*/*", "text/*", "a/b/c"] {
            assert!(
                g.set_accepted_type(bad).is_err(),
                "{bad} should not be accepted"
            );
        }
        assert!(g.accepted_type().is_none());
    }

    #[test]
    fn accepted_type_is_normalised() {
        let mut g = AdmissionGuard::new();
        g.set_accepted_type("Application/JSON; charset=utf-8").unwrap();
        assert_eq!(g.accepted_type(), Some("application/json"));
        g.set_accepted_type("").unwrap();
        assert!(g.accepted_type().is_none());
    }

    #[test]
    fn explicit_other_accept_gets_406() {
        let g = json_guard(NegotiationHeader::Accept);
        let Admission::Reject(rejection) = g.check(&req_with(header::ACCEPT, "text/html")) else {
            panic!("text/html should be rejected");
        };
        let mut buf = ResponseBuffer::new();
        rejection.apply(&mut buf);
        let resp = buf.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(resp.headers()[header::ACCEPT], "application/json");
    }

    #[test]
    fn accept_wildcards_and_lists_are_admitted() {
        let g = json_guard(NegotiationHeader::Accept);
        for accept in [
            "*/*",
            "application/*",
            "application/json",
            "APPLICATION/JSON; q=0.9",
            "text/html, application/json;q=0.8",
            "",
        ] {
            assert!(
                matches!(g.check(&req_with(header::ACCEPT, accept)), Admission::Admit),
                "{accept:?} should be admitted"
            );
        }
        assert!(matches!(g.check(&req(Method::GET)), Admission::Admit));
        assert!(matches!(
            g.check(&req_with(header::ACCEPT, "text/*")),
            Admission::Reject(_)
        ));
    }

    #[test]
    fn accept_mode_ignores_content_type() {
        let g = json_guard(NegotiationHeader::Accept);
        assert!(matches!(
            g.check(&req_with(header::CONTENT_TYPE, "text/plain")),
            Admission::Admit
        ));
    }

    #[test]
    fn content_type_mode_checks_request_body_type() {
        let g = json_guard(NegotiationHeader::ContentType);
        assert!(matches!(
            g.check(&req_with(header::CONTENT_TYPE, "application/json; charset=utf-8")),
            Admission::Admit
        ));
        assert!(matches!(g.check(&req(Method::POST)), Admission::Admit));
        assert!(matches!(
            g.check(&req_with(header::CONTENT_TYPE, "text/plain")),
            Admission::Reject(Rejection::NotAcceptable { .. })
        ));
        // The Accept header is not consulted in this mode.
        assert!(matches!(
            g.check(&req_with(header::ACCEPT, "image/png")),
            Admission::Admit
        ));
    }

    #[test]
    fn method_check_runs_before_type_check() {
        let mut g = json_guard(NegotiationHeader::Accept);
        g.set_allowed_methods(["GET"]).unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .header(header::ACCEPT, "text/html")
            .body(())
            .unwrap();
        let Admission::Reject(rejection) = g.check(&request) else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
