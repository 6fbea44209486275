use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

use crate::vu::VuContext;

/// An iteration that failed from the script's point of view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ScriptError(pub String);

pub type IterationFuture = Pin<Box<dyn Future<Output = Result<(), ScriptError>> + Send>>;

/// One pass of user code for one VU.
///
/// Implemented for any `Fn(VuContext) -> impl Future<Output = Result<(), E>>`
/// where `E: Display`, so plain async closures work:
///
/// ```ignore
/// scheduler.run(|vu: VuContext| async move {
///     let res = vu.get("http://127.0.0.1:8080/").await;
///     vu.check(&res, &[("status is 200", &|r: &HttpResponse| r.status == 200)]);
///     Ok::<_, ScriptError>(())
/// })
/// ```
pub trait Iteration: Send + Sync + 'static {
    fn call(&self, vu: VuContext) -> IterationFuture;
}

impl<F, Fut, E> Iteration for F
where
    F: Fn(VuContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    fn call(&self, vu: VuContext) -> IterationFuture {
        let fut = (self)(vu);
        Box::pin(async move { fut.await.map_err(|e| ScriptError(e.to_string())) })
    }
}
