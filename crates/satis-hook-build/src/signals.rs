//! Signal-driven build triggers
//!
//! `SIGUSR1` rebuilds everything, `SIGUSR2` pulls the build image again and
//! `SIGTERM`/`SIGINT` cancel the execution context. Signals are translated
//! into [`SignalAction`]s and consumed by [`run_signal_loop`].

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::context::{ExecutionContext, ShutdownReason};
use crate::orchestrator::{BuildOrchestrator, BuildScope};

/// Actions waiting for the signal loop before new ones are dropped
const PENDING_ACTIONS: usize = 8;

/// What a received signal asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Full build of every repository
    Rebuild,
    /// Pull the build image again
    RefreshImage,
    /// Stop the process
    Terminate(ShutdownReason),
}

/// Install the signal handlers and forward what they receive as actions.
///
/// Terminating signals cancel `context` right away so a build in progress is
/// abandoned instead of holding up shutdown. Forwarding never waits on the
/// loop: while it is busy, actions beyond the pending limit are dropped.
pub fn forward_signals(context: ExecutionContext) -> std::io::Result<mpsc::Receiver<SignalAction>> {
    let mut rebuild = signal(SignalKind::user_defined1())?;
    let mut refresh = signal(SignalKind::user_defined2())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let (tx, rx) = mpsc::channel(PENDING_ACTIONS);

    tokio::spawn(async move {
        loop {
            let action = tokio::select! {
                _ = context.cancelled() => break,
                _ = rebuild.recv() => {
                    debug!("Received signal SIGUSR1");
                    SignalAction::Rebuild
                }
                _ = refresh.recv() => {
                    debug!("Received signal SIGUSR2");
                    SignalAction::RefreshImage
                }
                _ = terminate.recv() => {
                    debug!("Received signal SIGTERM");
                    context.cancel(ShutdownReason::Terminate);
                    SignalAction::Terminate(ShutdownReason::Terminate)
                }
                _ = interrupt.recv() => {
                    debug!("Received signal SIGINT");
                    context.cancel(ShutdownReason::Interrupt);
                    SignalAction::Terminate(ShutdownReason::Interrupt)
                }
            };

            match tx.try_send(action) {
                Ok(()) => {}
                Err(TrySendError::Full(action)) => {
                    warn!("{} actions already pending, dropping {:?}", PENDING_ACTIONS, action);
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        debug!("Signal forwarding stopped");
    });

    Ok(rx)
}

/// Handle signal actions until the context is cancelled.
///
/// Rebuild and refresh failures are logged; only termination ends the loop.
pub async fn run_signal_loop(
    orchestrator: Arc<dyn BuildOrchestrator>,
    context: ExecutionContext,
    mut actions: mpsc::Receiver<SignalAction>,
) {
    loop {
        let action = tokio::select! {
            _ = context.cancelled() => {
                debug!("Execution context cancelled, leaving signal loop");
                return;
            }
            action = actions.recv() => action,
        };

        match action {
            Some(SignalAction::Rebuild) => match orchestrator.build(BuildScope::all()).await {
                Ok(()) => info!("Successfully built satis"),
                Err(e) => error!("Failed to build satis: {}", e),
            },
            Some(SignalAction::RefreshImage) => match orchestrator.refresh_image().await {
                Ok(()) => info!("Successfully pulled satis image"),
                Err(e) => error!("Failed to pull satis image: {}", e),
            },
            Some(SignalAction::Terminate(reason)) => {
                context.cancel(reason);
                return;
            }
            None => {
                debug!("Signal channel closed, leaving signal loop");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::timeout;

    use super::*;
    use crate::error::{BuildError, Result};

    #[derive(Default)]
    struct CountingOrchestrator {
        builds: AtomicUsize,
        refreshes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl BuildOrchestrator for CountingOrchestrator {
        async fn build(&self, scope: BuildScope) -> Result<()> {
            assert!(scope.is_all());
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BuildError::workspace("/nowhere", "mock failure"));
            }
            Ok(())
        }

        async fn refresh_image(&self) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BuildError::Cancelled);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_actions_dispatch_until_terminate() {
        let orchestrator = Arc::new(CountingOrchestrator::default());
        let context = ExecutionContext::new();
        let (tx, rx) = mpsc::channel(PENDING_ACTIONS);

        tx.send(SignalAction::Rebuild).await.unwrap();
        tx.send(SignalAction::RefreshImage).await.unwrap();
        tx.send(SignalAction::Rebuild).await.unwrap();
        tx.send(SignalAction::Terminate(ShutdownReason::Terminate)).await.unwrap();

        let handle = tokio::spawn(run_signal_loop(orchestrator.clone(), context.clone(), rx));
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

        assert_eq!(orchestrator.builds.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(context.reason(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let orchestrator = Arc::new(CountingOrchestrator { fail: true, ..Default::default() });
        let context = ExecutionContext::new();
        let (tx, rx) = mpsc::channel(PENDING_ACTIONS);

        let handle = tokio::spawn(run_signal_loop(orchestrator.clone(), context.clone(), rx));

        tx.send(SignalAction::Rebuild).await.unwrap();
        tx.send(SignalAction::RefreshImage).await.unwrap();
        tx.send(SignalAction::Rebuild).await.unwrap();
        tx.send(SignalAction::Terminate(ShutdownReason::Interrupt)).await.unwrap();

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(orchestrator.builds.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(context.reason(), Some(ShutdownReason::Interrupt));
    }

    #[tokio::test]
    async fn test_cancellation_ends_the_loop() {
        let orchestrator = Arc::new(CountingOrchestrator::default());
        let context = ExecutionContext::new();
        let (_tx, rx) = mpsc::channel(8);

        let handle = tokio::spawn(run_signal_loop(orchestrator.clone(), context.clone(), rx));
        context.cancel(ShutdownReason::FatalError);

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(orchestrator.builds.load(Ordering::SeqCst), 0);
    }

    // The only test raising real signals; parallel tests would see them too
    #[tokio::test]
    async fn test_forwarded_signals() {
        use nix::sys::signal::{raise, Signal};

        let context = ExecutionContext::new();
        let mut rx = forward_signals(context.clone()).unwrap();

        raise(Signal::SIGUSR1).unwrap();
        let action = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(action, Some(SignalAction::Rebuild));

        // Nobody drains the channel, as while a long build runs
        for _ in 0..PENDING_ACTIONS + 4 {
            raise(Signal::SIGUSR1).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        raise(Signal::SIGTERM).unwrap();
        timeout(Duration::from_secs(5), context.cancelled())
            .await
            .expect("terminate signal must cancel the context while actions are pending");
        assert_eq!(context.reason(), Some(ShutdownReason::Terminate));
    }
}
