//! Event loop driving accepted connections under one of two scheduling modes.
//!
//! - *Event-loop mode*: a single task drives every connection's
//!   read/dispatch/write cycle cooperatively through one
//!   [`FuturesUnordered`] — one thread owns the poller, and `tokio`'s
//!   reactor is what actually does the polling.
//! - *Worker-pool mode*: each accepted connection is handed to its own
//!   `tokio::spawn`ed task, bounded to `n` concurrent connections by a
//!   [`Semaphore`], the same per-client task shape used elsewhere in this
//!   stack for streaming handlers.
//!
//! Suspension points in both modes are exactly the transport's
//! `WouldBlock`-returning calls: `.readable()`/`.writable()`
//! are where a connection's future yields back to its driver.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulingMode;

/// One connection's complete processing future, boxed so event-loop mode
/// can hold heterogeneous connections in one `FuturesUnordered`.
pub type ConnectionFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Drives a stream of per-connection futures according to `mode`, until
/// `shutdown` is cancelled.
///
/// `accept_next` is polled for the next connection's future each
/// iteration; `None` means the accept loop itself has stopped producing
/// new connections (listener closed).
pub async fn run(
    mode: SchedulingMode,
    shutdown: CancellationToken,
    mut accept_next: impl FnMut() -> Pin<Box<dyn Future<Output = Option<ConnectionFuture>> + Send>>,
) {
    match mode {
        SchedulingMode::EventLoop => run_event_loop(shutdown, accept_next).await,
        SchedulingMode::WorkerPool(n) => run_worker_pool(n, shutdown, &mut accept_next).await,
    }
}

async fn run_event_loop(
    shutdown: CancellationToken,
    mut accept_next: impl FnMut() -> Pin<Box<dyn Future<Output = Option<ConnectionFuture>> + Send>>,
) {
    let mut inflight: FuturesUnordered<ConnectionFuture> = FuturesUnordered::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = accept_next() => {
                match next {
                    Some(fut) => inflight.push(fut),
                    None => break,
                }
            }
            _ = inflight.next(), if !inflight.is_empty() => {}
        }
    }
    // Drain whatever was still in flight so connections close cleanly.
    while inflight.next().await.is_some() {}
}

async fn run_worker_pool(
    n: usize,
    shutdown: CancellationToken,
    accept_next: &mut impl FnMut() -> Pin<Box<dyn Future<Output = Option<ConnectionFuture>> + Send>>,
) {
    let semaphore = Arc::new(Semaphore::new(n.max(1)));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = accept_next() => {
                match next {
                    Some(fut) => {
                        let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore closed");
                        tokio::spawn(async move {
                            fut.await;
                            drop(permit);
                        });
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn event_loop_runs_every_accepted_connection() {
        let completed = Arc::new(AtomicUsize::new(0));
        let remaining = Arc::new(std::sync::Mutex::new(3));
        let shutdown = CancellationToken::new();
        let shutdown_for_accept = shutdown.clone();

        let completed_for_fut = completed.clone();
        let accept = move || -> Pin<Box<dyn Future<Output = Option<ConnectionFuture>> + Send>> {
            let remaining = remaining.clone();
            let completed = completed_for_fut.clone();
            let shutdown = shutdown_for_accept.clone();
            Box::pin(async move {
                let mut guard = remaining.lock().unwrap();
                if *guard == 0 {
                    shutdown.cancel();
                    return None;
                }
                *guard -= 1;
                drop(guard);
                let completed = completed.clone();
                Some(Box::pin(async move {
                    completed.fetch_add(1, Ordering::SeqCst);
                }) as ConnectionFuture)
            })
        };

        run(SchedulingMode::EventLoop, shutdown, accept).await;
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }
}
