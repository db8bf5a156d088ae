//! Request interception for a single downstream handler.
//!
//! [`WrappingHandler`] runs the [`AdmissionGuard`], calls the inner
//! [`Handler`] behind a panic boundary, and publishes one access event per
//! request to a [`vigil_observability::SinkRegistry`].

pub mod error_body;
pub mod guard;
pub mod handler;
pub mod recovery;
pub mod service;
pub mod writer;

pub use error_body::write_error;
pub use guard::{Admission, AdmissionGuard, Rejection};
pub use handler::{FnHandler, Handler, RemoteAddr, WrappingHandler, handler_fn};
pub use recovery::install_panic_hook;
pub use service::into_router;
pub use writer::{ObservingWriter, ResponseBuffer, ResponseWriter};
