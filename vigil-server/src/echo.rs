use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, StatusCode};
use vigil_http::{Handler, ResponseWriter, write_error};

/// Demo inner handler.
///
/// `/healthz` answers `ok`, `/missing` is a 404 and `/panic` panics so the
/// recovery path can be exercised by hand. Anything else echoes the request
/// line back.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn serve(&self, req: &Request<Bytes>, w: &mut dyn ResponseWriter) {
        match req.uri().path() {
            "/healthz" => {
                w.write(b"ok\n");
            }
            "/missing" => write_error(w, "not found", StatusCode::NOT_FOUND),
            "/panic" => panic!("panic requested via {}", req.uri()),
            path => {
                let line = format!("{} {}\n", req.method(), path);
                w.write(line.as_bytes());
            }
        }
    }
}
