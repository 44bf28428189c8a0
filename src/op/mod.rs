//! The operation contract: lifecycle hooks, retry policy, and the
//! `>>`/`|`/`<<` composition algebra.
//!
//! Rust has no multiple inheritance, so the original's
//! `BaseOp -> BaseAsyncOp -> BaseAsyncToolOp -> <concrete>` hierarchy is
//! flattened into one [`Op`] trait plus an embedded [`OpBase`] every
//! concrete op carries as a field. Tool-capable ops additionally override
//! [`Op::tool_call`] and run their input/output binding through
//! [`crate::op::tool`].

pub mod builtin;
pub mod parallel;
pub mod sequential;
pub mod tool;

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::context::Ctx;
use crate::error::OpError;
use crate::tool_call::ToolCall;

pub use parallel::ParallelOp;
pub use sequential::SequentialOp;

/// `{max_retries, raise_on_exhaust}` plus the linear back-off rule shared by
/// the sync and async call loops.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub raise_on_exhaust: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            raise_on_exhaust: true,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(1 + attempt as u64)
    }
}

/// State every operation carries regardless of what it does: its name,
/// retry policy, async flag, attached children, tool-index (for
/// disambiguating sibling copies of the same tool op sharing a context),
/// and the sub-tasks it has submitted but not yet joined.
pub struct OpBase {
    pub name: String,
    pub retry: RetryPolicy,
    pub async_mode: bool,
    pub ops: Vec<Box<dyn Op>>,
    pub tool_index: usize,
    pending_sync: Vec<JoinHandle<Result<(), OpError>>>,
    pending_async: Vec<JoinHandle<Result<(), OpError>>>,
}

impl OpBase {
    pub fn new(name: impl Into<String>, async_mode: bool) -> Self {
        Self {
            name: name.into(),
            retry: RetryPolicy::default(),
            async_mode,
            ops: Vec::new(),
            tool_index: 0,
            pending_sync: Vec::new(),
            pending_async: Vec::new(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

/// Strip a trailing `_op` the way a class's "short name" does.
pub fn short_name(name: &str) -> &str {
    name.strip_suffix("_op").unwrap_or(name)
}

impl std::fmt::Debug for dyn Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Op").field("name", &self.base().name).finish()
    }
}

#[async_trait]
pub trait Op: Send + Sync + Any {
    fn base(&self) -> &OpBase;
    fn base_mut(&mut self) -> &mut OpBase;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn before_execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }
    fn execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }
    fn after_execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }
    fn default_execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }

    async fn async_before_execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }
    async fn async_execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }
    async fn async_after_execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }
    async fn async_default_execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Ok(())
    }

    /// A tool-capable op overrides this to advertise its schema.
    fn tool_call(&self) -> Option<ToolCall> {
        None
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn short_name_str(&self) -> &str {
        short_name(&self.base().name)
    }

    fn async_mode(&self) -> bool {
        self.base().async_mode
    }

    /// Submit a blocking job to the context's worker pool without waiting
    /// for it; collect its result later with [`Op::join_task`], in
    /// submission order. Panics if `context` has no worker pool attached.
    fn submit_task(&mut self, context: &Ctx, job: Box<dyn FnOnce() -> Result<(), OpError> + Send>) {
        let pool = context
            .worker_pool
            .clone()
            .expect("submit_task requires a worker pool attached to the context");
        let handle = block_on_bridging(pool.spawn_task(job));
        self.base_mut().pending_sync.push(handle);
    }

    /// Block until every task submitted via [`Op::submit_task`] since the
    /// last call has finished, returning their results in submission order.
    fn join_task(&mut self) -> Result<Vec<Result<(), OpError>>, OpError> {
        let name = self.name().to_string();
        let handles = std::mem::take(&mut self.base_mut().pending_sync);
        block_on_bridging(join_handles(handles, &name, None, false))
    }

    /// Spawn a cooperative task without waiting for it; collect its result
    /// later with [`Op::join_async_task`], in submission order.
    fn submit_async_task(&mut self, job: Pin<Box<dyn Future<Output = Result<(), OpError>> + Send>>) {
        let handle = tokio::spawn(job);
        self.base_mut().pending_async.push(handle);
    }

    /// Await every task submitted via [`Op::submit_async_task`] since the
    /// last call, in submission order. With `timeout` set, every
    /// outstanding task is aborted the moment the deadline passes and a
    /// [`OpError::Timeout`] is returned. With `return_exceptions` false
    /// (the default sub-task contract), the first failing task aborts every
    /// task still pending and its error propagates; with it true, failures
    /// are logged and collected alongside the successes instead.
    async fn join_async_task(
        &mut self,
        timeout: Option<Duration>,
        return_exceptions: bool,
    ) -> Result<Vec<Result<(), OpError>>, OpError> {
        let name = self.name().to_string();
        let handles = std::mem::take(&mut self.base_mut().pending_async);
        join_handles(handles, &name, timeout, return_exceptions).await
    }

    /// Attach `other` as a child (the `<<` operator). The default
    /// implementation appends; `SequentialOp`/`ParallelOp` reject it.
    fn attach(&mut self, other: Box<dyn Op>) -> Result<(), OpError> {
        self.base_mut().ops.push(other);
        Ok(())
    }

    fn call(&mut self, context: &Ctx) -> Result<(), OpError> {
        let policy = self.base().retry;
        let max_retries = policy.max_retries.max(1);
        let name = self.name().to_string();

        if max_retries == 1 && policy.raise_on_exhaust {
            self.before_execute(context)?;
            self.execute(context)?;
            self.after_execute(context)?;
            return Ok(());
        }

        let mut last_err = None;
        for attempt in 0..max_retries {
            let step: Result<(), OpError> = (|| {
                self.before_execute(context)?;
                self.execute(context)?;
                self.after_execute(context)
            })();

            match step {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::warn!(op = %name, attempt, %error, "operation failed, retrying");
                    last_err = Some(error);
                    if attempt + 1 < max_retries {
                        std::thread::sleep(RetryPolicy::backoff(attempt));
                    }
                }
            }
        }

        if policy.raise_on_exhaust {
            Err(last_err.expect("loop ran at least once"))
        } else {
            self.default_execute(context)
        }
    }

    async fn async_call(&mut self, context: &Ctx) -> Result<(), OpError> {
        let policy = self.base().retry;
        let max_retries = policy.max_retries.max(1);
        let name = self.name().to_string();

        if max_retries == 1 && policy.raise_on_exhaust {
            self.async_before_execute(context).await?;
            self.async_execute(context).await?;
            self.async_after_execute(context).await?;
            return Ok(());
        }

        let mut last_err = None;
        for attempt in 0..max_retries {
            let step = async {
                self.async_before_execute(context).await?;
                self.async_execute(context).await?;
                self.async_after_execute(context).await
            }
            .await;

            match step {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::warn!(op = %name, attempt, %error, "operation failed, retrying");
                    last_err = Some(error);
                    if attempt + 1 < max_retries {
                        tokio::time::sleep(RetryPolicy::backoff(attempt)).await;
                    }
                }
            }
        }

        if policy.raise_on_exhaust {
            Err(last_err.expect("loop ran at least once"))
        } else {
            self.async_default_execute(context).await
        }
    }
}

/// Drive `future` to completion from synchronous code. Reuses the ambient
/// runtime's handle when one is entered (true for every `spawn_blocking`
/// thread, which is how `Flow` always dispatches a sync root); otherwise
/// spins up a short-lived current-thread runtime, mirroring
/// [`crate::flow::Flow::call`]'s own bridging for a standalone sync root.
/// Panics if called from a thread already polling an async task — the same
/// restriction `Flow::call`'s doc comment calls out for its callers.
pub(crate) fn block_on_bridging<F: std::future::Future>(future: F) -> F::Output {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(future),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to start bridging runtime")
            .block_on(future),
    }
}

/// Join a batch of spawned tasks in submission order, honoring an optional
/// deadline and `return_exceptions` the way [`Op::join_async_task`] and
/// [`crate::op::parallel::ParallelOp`]'s async fan-out both need: a timeout
/// aborts every task still outstanding and reports [`OpError::Timeout`];
/// otherwise, with `return_exceptions` false, the first failure aborts
/// every task still outstanding and propagates.
pub(crate) async fn join_handles(
    mut handles: Vec<JoinHandle<Result<(), OpError>>>,
    task_name: &str,
    timeout: Option<Duration>,
    return_exceptions: bool,
) -> Result<Vec<Result<(), OpError>>, OpError> {
    let started = tokio::time::Instant::now();
    let mut results = Vec::with_capacity(handles.len());
    let mut index = 0;

    while index < handles.len() {
        let outcome = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, &mut handles[index]).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        for sibling in &handles[index..] {
                            sibling.abort();
                        }
                        return Err(OpError::Timeout {
                            task: task_name.to_string(),
                            elapsed: started.elapsed(),
                        });
                    }
                }
            }
            None => (&mut handles[index]).await,
        };

        let result = match outcome {
            Ok(task_result) => task_result,
            Err(join_error) => Err(OpError::Join {
                task: task_name.to_string(),
                source: Box::new(join_error),
            }),
        };

        if let Err(error) = result {
            if return_exceptions {
                tracing::warn!(task = task_name, %error, "sub-task failed, continuing (return_exceptions=true)");
                results.push(Err(error));
                index += 1;
                continue;
            }
            for sibling in &handles[index + 1..] {
                sibling.abort();
            }
            return Err(error);
        }

        results.push(result);
        index += 1;
    }

    Ok(results)
}

/// `a >> b`: if `a` is already a [`SequentialOp`], append `b` in place;
/// otherwise wrap both into a new one. Enforces that `a` and `b` share an
/// async mode.
pub fn sequential(mut a: Box<dyn Op>, b: Box<dyn Op>) -> Result<Box<dyn Op>, OpError> {
    if a.async_mode() != b.async_mode() {
        return Err(OpError::ModeMismatch {
            op: a.name().to_string(),
            other: b.name().to_string(),
        });
    }
    if let Some(seq) = a.as_any_mut().downcast_mut::<SequentialOp>() {
        seq.base.ops.push(b);
        return Ok(a);
    }
    Ok(Box::new(SequentialOp::new(vec![a, b])))
}

/// `a | b`: the [`ParallelOp`] analogue of [`sequential`].
pub fn parallel(mut a: Box<dyn Op>, b: Box<dyn Op>) -> Result<Box<dyn Op>, OpError> {
    if a.async_mode() != b.async_mode() {
        return Err(OpError::ModeMismatch {
            op: a.name().to_string(),
            other: b.name().to_string(),
        });
    }
    if let Some(par) = a.as_any_mut().downcast_mut::<ParallelOp>() {
        par.base.ops.push(b);
        return Ok(a);
    }
    Ok(Box::new(ParallelOp::new(vec![a, b])))
}

impl std::ops::Shr for Box<dyn Op> {
    type Output = Result<Box<dyn Op>, OpError>;
    fn shr(self, rhs: Self) -> Self::Output {
        sequential(self, rhs)
    }
}

impl std::ops::BitOr for Box<dyn Op> {
    type Output = Result<Box<dyn Op>, OpError>;
    fn bitor(self, rhs: Self) -> Self::Output {
        parallel(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::builtin::EchoOp;
    use super::*;
    use crate::context::FlowContext;

    #[tokio::test]
    async fn sequential_merges_into_existing_composite() {
        let a: Box<dyn Op> = Box::new(EchoOp::new("a", false));
        let b: Box<dyn Op> = Box::new(EchoOp::new("b", false));
        let c: Box<dyn Op> = Box::new(EchoOp::new("c", false));

        let ab = sequential(a, b).unwrap();
        let abc = sequential(ab, c).unwrap();

        let seq = abc.as_any().downcast_ref::<SequentialOp>().unwrap();
        assert_eq!(seq.base.ops.len(), 3);
    }

    #[tokio::test]
    async fn mismatched_async_mode_is_rejected() {
        let a: Box<dyn Op> = Box::new(EchoOp::new("a", false));
        let b: Box<dyn Op> = Box::new(EchoOp::new("b", true));
        assert!(matches!(sequential(a, b), Err(OpError::ModeMismatch { .. })));
    }

    #[test]
    fn retry_then_fallback_records_failure() {
        let mut op = builtin::AlwaysFailOp::new("flaky", 3);
        let context = FlowContext::new("f1").into_shared();
        op.call(&context).unwrap();
        assert_eq!(context.get_str("flaky_result"), Some("flaky execution failed!".to_string()));
    }

    #[tokio::test]
    async fn submit_and_join_task_runs_sync_sub_tasks_on_the_worker_pool() {
        use crate::worker_pool::WorkerPool;

        let pool = std::sync::Arc::new(WorkerPool::new(4));
        let context = FlowContext::new("f1").with_worker_pool(pool).into_shared();

        let results = tokio::task::spawn_blocking(move || {
            let mut op = EchoOp::new("host", false);
            op.submit_task(&context, Box::new(|| Ok(())));
            op.submit_task(&context, Box::new(|| Ok(())));
            op.join_task()
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.into_iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn join_async_task_aborts_siblings_on_first_error() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let mut op = EchoOp::new("host", true);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_for_sibling = ran.clone();

        op.submit_async_task(Box::pin(async move {
            Err(OpError::Failed {
                op: "child".to_string(),
                source: "boom".into(),
            })
        }));
        op.submit_async_task(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ran_for_sibling.store(true, Ordering::SeqCst);
            Ok(())
        }));

        let error = op.join_async_task(None, false).await.unwrap_err();
        assert!(matches!(error, OpError::Failed { .. }));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!ran.load(Ordering::SeqCst), "aborted sibling must never run its delayed side effect");
    }

    #[tokio::test]
    async fn join_async_task_times_out_and_aborts_outstanding_tasks() {
        let mut op = EchoOp::new("host", true);
        op.submit_async_task(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }));

        let error = op
            .join_async_task(Some(Duration::from_millis(20)), false)
            .await
            .unwrap_err();
        assert!(matches!(error, OpError::Timeout { .. }));
    }

    #[tokio::test]
    async fn join_async_task_collects_failures_when_return_exceptions_is_set() {
        let mut op = EchoOp::new("host", true);
        op.submit_async_task(Box::pin(async move { Ok(()) }));
        op.submit_async_task(Box::pin(async move {
            Err(OpError::Failed {
                op: "child".to_string(),
                source: "boom".into(),
            })
        }));

        let results = op.join_async_task(None, true).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
