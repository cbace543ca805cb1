use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use scopeguard::ScopeGuard;

use crate::{AsyncDisposable, Disposable, Result, report_error};

/// Runs `action` with `resource` and disposes the resource afterwards.
///
/// The resource is disposed on every exit path. When `action` returns, the teardown failure (if
/// any) is returned. When `action` panics, the resource is disposed during unwinding and a teardown
/// failure goes to the default error handler of the current thread.
///
/// # Errors
///
/// Returns the teardown failure of the resource.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{DisposableAction, using};
///
/// let resource = Rc::new(DisposableAction::new(|| println!("released")));
///
/// let answer = using(Rc::clone(&resource), |resource| {
///     assert!(!resource.is_disposed());
///     42
/// })?;
///
/// assert_eq!(answer, 42);
/// assert!(resource.is_disposed());
/// # Ok::<(), disposables::Error>(())
/// ```
pub fn using<D, R>(resource: Rc<D>, action: impl FnOnce(&D) -> R) -> Result<R>
where
    D: Disposable + ?Sized,
{
    let guard = scopeguard::guard(resource, |resource| {
        // Only reached if the action panicked.
        if let Err(error) = resource.dispose() {
            report_error(&error);
        }
    });

    let output = action(&**guard);

    ScopeGuard::into_inner(guard).dispose()?;
    Ok(output)
}

/// Runs the asynchronous `action` with `resource` and disposes the resource afterwards.
///
/// When the action completes, the teardown of the resource is awaited and its failure (if any) is
/// returned. If the action panics or the returned future is dropped before completion, the
/// teardown is started but not awaited, and a failure that is reported synchronously goes to the
/// default error handler of the current thread.
///
/// # Errors
///
/// Returns the teardown failure of the resource.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use disposables::{AsyncDisposableAction, using_async};
/// use futures::executor::block_on;
///
/// let connection = Rc::new(AsyncDisposableAction::new(|| async { Ok(()) }));
///
/// let echoed = block_on(using_async(Rc::clone(&connection), |_connection| async {
///     "ping"
/// }))?;
///
/// assert_eq!(echoed, "ping");
/// assert!(connection.is_disposed());
/// # Ok::<(), disposables::Error>(())
/// ```
pub async fn using_async<D, R, F, Fut>(resource: Rc<D>, action: F) -> Result<R>
where
    D: AsyncDisposable + ?Sized,
    F: FnOnce(Rc<D>) -> Fut,
    Fut: Future<Output = R>,
{
    let guard = scopeguard::guard(Rc::clone(&resource), |resource| {
        // Only reached if the action panicked or was cancelled.
        match resource.dispose_async().now_or_never() {
            Some(Err(error)) => report_error(&error),
            Some(Ok(())) => {}
            None => log::debug!("scoped resource teardown did not complete synchronously"),
        }
    });

    let output = action(resource).await;

    ScopeGuard::into_inner(guard).dispose_async().await?;
    Ok(output)
}
