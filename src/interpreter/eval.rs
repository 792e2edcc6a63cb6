//! The recursive evaluator. `eval` walks a [`Repr`] tree to a
//! `Result<Erased, Cause<E>>`, heap-boxing each recursive call so a long
//! `FlatMap`/`FoldM` chain doesn't grow the native call stack.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cause::{Cause, Defect};
use crate::runtime_error::RuntimeError;
use crate::effect::{AsyncCompleter, Erased, Repr, erase};
use crate::environment::Environment;
use crate::fiber::{FiberContext, FiberIdAllocator, FiberOutcome};

/// The erased payload a `Fork` primitive succeeds with: a forked fiber's
/// lifecycle handle paired with the one-shot channel carrying its actual
/// result. [`crate::effect::FiberHandle`] downcasts to this and wraps it
/// with a concrete success type.
pub(crate) struct RawFiberHandle<E> {
    pub(crate) context: Arc<FiberContext<E>>,
    pub(crate) result: smol::channel::Receiver<Result<Erased, Cause<E>>>,
}

/// Start `repr` running on `env`'s scheduler as an independent fiber,
/// returning its lifecycle context and a one-shot receiver for its
/// eventual result. Used both by `Fork` and by the `mapError` bridge for
/// `FoldM` nodes, which need to evaluate a subtree under its native error
/// type before translating the outcome.
pub(crate) fn spawn_fiber<E>(
    repr: Repr<E>,
    env: Environment,
) -> (
    Arc<FiberContext<E>>,
    smol::channel::Receiver<Result<Erased, Cause<E>>>,
)
where
    E: Clone + Send + 'static,
{
    let ctx = FiberContext::new(FiberIdAllocator::next());
    let (tx, rx) = smol::channel::bounded(1);
    let task_ctx = Arc::clone(&ctx);
    let task_env = env.clone();
    env.scheduler()
        .executor()
        .spawn(async move {
            let result = eval(repr, Arc::clone(&task_ctx), task_env).await;
            let outcome = match &result {
                Ok(_) => FiberOutcome::Success,
                Err(cause) => FiberOutcome::Failure(cause.clone()),
            };
            task_ctx.done(outcome);
            let _ = tx.try_send(result);
        })
        .detach();
    (ctx, rx)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "fiber panicked with a non-string payload".to_string()
}

/// Match only a direct `Cause::Fail` leaf, leaving composite causes
/// (`Then`/`Both`, concurrent-death-plus-failure) untouched. `FoldM`'s
/// error continuation only ever runs for the simple case; anything more
/// structured propagates as-is, matching how a `race`/`ensuring` failure
/// is meant to outlive a single `fold`.
fn extract_fail<E>(cause: Cause<E>) -> Result<E, Cause<E>> {
    match cause {
        Cause::Fail(e) => Ok(e),
        other => Err(other),
    }
}

pub(crate) fn eval<E>(
    repr: Repr<E>,
    ctx: Arc<FiberContext<E>>,
    env: Environment,
) -> Pin<Box<dyn Future<Output = Result<Erased, Cause<E>>> + Send>>
where
    E: Clone + Send + 'static,
{
    Box::pin(async move {
        if let Some(budget) = env.scheduler().config().yield_after_reductions {
            if ctx.tick_reduction(budget) {
                smol::Timer::after(std::time::Duration::from_micros(0)).await;
            }
        }

        match repr {
            Repr::Succeed(value) => Ok(value),
            Repr::Fail(e) => Err(Cause::fail(e)),

            Repr::Sync(thunk) => {
                let env_ref = &env;
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || thunk(env_ref))) {
                    Ok(result) => result,
                    Err(payload) => Err(Cause::die(Defect::new(panic_message(payload)))),
                }
            }

            Repr::Async(register) => {
                let (tx, rx) = smol::channel::bounded(1);
                register(&env, AsyncCompleter::new(tx));
                ctx.mark_suspended();
                let result = match rx.recv().await {
                    Ok(result) => result,
                    Err(_) => Err(Cause::die(Defect::new(RuntimeError::AsyncCompleterDropped))),
                };
                ctx.mark_running();
                match ctx.check_interrupt() {
                    Some(cause) => Err(cause),
                    None => result,
                }
            }

            Repr::FlatMap(inner, k) => {
                let a = eval(*inner, Arc::clone(&ctx), env.clone()).await?;
                eval(k(a), ctx, env).await
            }

            Repr::FoldM(inner, err_cont, ok_cont) => {
                match eval(*inner, Arc::clone(&ctx), env.clone()).await {
                    Ok(a) => eval(ok_cont(a), ctx, env).await,
                    Err(cause) => match extract_fail(cause) {
                        Ok(e) => eval(err_cont(e), ctx, env).await,
                        Err(cause) => Err(cause),
                    },
                }
            }

            Repr::Ensuring(body, finalizer) => {
                let prev = ctx.set_interruptible(false);
                let body_result = eval(*body, Arc::clone(&ctx), env.clone()).await;
                let finalizer_result = eval(*finalizer, Arc::clone(&ctx), env.clone()).await;
                ctx.set_interruptible(prev);
                match (body_result, finalizer_result) {
                    (Ok(a), Ok(_)) => Ok(a),
                    (Ok(_), Err(fin_cause)) => Err(fin_cause),
                    (Err(body_cause), Ok(_)) => Err(body_cause),
                    (Err(body_cause), Err(fin_cause)) => Err(Cause::both(body_cause, fin_cause)),
                }
            }

            Repr::Sleep(duration) => {
                ctx.mark_suspended();
                smol::Timer::after(duration).await;
                ctx.mark_running();
                match ctx.check_interrupt() {
                    Some(cause) => Err(cause),
                    None => Ok(erase(())),
                }
            }

            Repr::Fork(body) => {
                let (child_ctx, result) = spawn_fiber(*body, env.clone());
                Ok(erase(RawFiberHandle {
                    context: child_ctx,
                    result,
                }))
            }

            Repr::SetInterruptible(body, flag) => {
                let prev = ctx.set_interruptible(flag);
                let result = eval(*body, Arc::clone(&ctx), env).await;
                ctx.set_interruptible(prev);
                result
            }

            Repr::CheckInterrupt => match ctx.check_interrupt() {
                Some(cause) => Err(cause),
                None => Ok(erase(())),
            },

            Repr::Race(children) => eval_race(children, env).await,
            Repr::RaceFirst(children) => eval_race_first(children, env).await,
            Repr::All(children) => eval_all(children, env).await,
        }
    })
}

async fn eval_race<E>(children: Vec<Repr<E>>, env: Environment) -> Result<Erased, Cause<E>>
where
    E: Clone + Send + 'static,
{
    let mut remaining = children.len();
    if remaining == 0 {
        return Err(Cause::die(Defect::new(RuntimeError::EmptyParticipants { combinator: "race" })));
    }
    let (tx, rx) = smol::channel::unbounded();
    let mut contexts = Vec::with_capacity(remaining);
    for child in children {
        let (child_ctx, child_rx) = spawn_fiber(child, env.clone());
        contexts.push(child_ctx);
        let tx = tx.clone();
        env.scheduler()
            .executor()
            .spawn(async move {
                if let Ok(result) = child_rx.recv().await {
                    let _ = tx.try_send(result);
                }
            })
            .detach();
    }
    drop(tx);

    let mut failure: Option<Cause<E>> = None;
    loop {
        match rx.recv().await {
            Ok(Ok(value)) => {
                for sibling in &contexts {
                    sibling.interrupt();
                }
                return Ok(value);
            }
            Ok(Err(cause)) => {
                remaining -= 1;
                failure = Some(match failure.take() {
                    Some(acc) => Cause::both(acc, cause),
                    None => cause,
                });
                if remaining == 0 {
                    return Err(failure.unwrap());
                }
            }
            Err(_) => {
                remaining -= 1;
                if remaining == 0 {
                    return Err(failure.unwrap_or_else(|| {
                        Cause::die(Defect::new(RuntimeError::FiberDisappeared { during: "race" }))
                    }));
                }
            }
        }
    }
}

async fn eval_race_first<E>(children: Vec<Repr<E>>, env: Environment) -> Result<Erased, Cause<E>>
where
    E: Clone + Send + 'static,
{
    if children.is_empty() {
        return Err(Cause::die(Defect::new(RuntimeError::EmptyParticipants { combinator: "race_first" })));
    }
    let (tx, rx) = smol::channel::unbounded();
    let mut contexts = Vec::with_capacity(children.len());
    let mut relays = Vec::with_capacity(children.len());
    for child in children {
        let (child_ctx, child_rx) = spawn_fiber(child, env.clone());
        contexts.push(child_ctx);
        let tx = tx.clone();
        let relay = env.scheduler().executor().spawn(async move {
            if let Ok(result) = child_rx.recv().await {
                let _ = tx.try_send(result);
            }
        });
        relays.push(relay);
    }
    drop(tx);

    let outcome = match rx.recv().await {
        Ok(result) => {
            for sibling in &contexts {
                sibling.interrupt();
            }
            result
        }
        Err(_) => Err(Cause::die(Defect::new(RuntimeError::FiberDisappeared { during: "race_first" }))),
    };

    // Every loser's relay only resolves once its fiber reaches `Done`, so
    // awaiting them here guarantees no loser side effect outlives this call.
    for relay in relays {
        relay.await;
    }

    outcome
}

async fn eval_all<E>(children: Vec<Repr<E>>, env: Environment) -> Result<Erased, Cause<E>>
where
    E: Clone + Send + 'static,
{
    let mut handles = Vec::with_capacity(children.len());
    for child in children {
        handles.push(spawn_fiber(child, env.clone()));
    }
    let contexts: Vec<_> = handles.iter().map(|(ctx, _)| Arc::clone(ctx)).collect();

    let mut values = Vec::with_capacity(handles.len());
    let mut failure: Option<Cause<E>> = None;
    for (_, result) in handles {
        match result.recv().await {
            Ok(Ok(value)) => {
                if failure.is_none() {
                    values.push(value);
                }
            }
            Ok(Err(cause)) => {
                for sibling in &contexts {
                    sibling.interrupt();
                }
                failure = Some(match failure.take() {
                    Some(acc) => Cause::both(acc, cause),
                    None => cause,
                });
            }
            Err(_) => {
                let died = Cause::die(Defect::new(RuntimeError::FiberDisappeared { during: "all" }));
                failure = Some(match failure.take() {
                    Some(acc) => Cause::both(acc, died),
                    None => died,
                });
            }
        }
    }

    match failure {
        Some(cause) => Err(cause),
        None => Ok(erase(values)),
    }
}
