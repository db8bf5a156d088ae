use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use tracing::error;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install a panic hook that remembers where the panic happened.
///
/// The hook chains to whatever hook was installed before and is only set
/// once per process. Without it, [`Failure`] falls back to a backtrace of the
/// recovery site, which no longer contains the panicking frames.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// A panic caught at the recovery boundary.
#[derive(Debug)]
pub struct Failure {
    pub message: String,
    pub backtrace: String,
}

impl Failure {
    /// Build from a `catch_unwind` payload.
    ///
    /// Must run on the thread that panicked, before it panics again.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        let backtrace = LAST_BACKTRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(Backtrace::capture)
            .to_string();
        Self { message, backtrace }
    }

    /// Emit the operator diagnostic for this failure.
    pub fn log(&self, method: &str, uri: &str) {
        error!(
            method,
            uri,
            panic = %self.message,
            backtrace = %self.backtrace,
            "Inner handler panicked"
        );
    }
}

/// Drive `fut` to completion, turning a panic into `Err(Failure)`.
pub async fn run_guarded<F: Future>(fut: F) -> Result<F::Output, Failure> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(Failure::from_panic)
}
