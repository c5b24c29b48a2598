//! One-shot shutdown broadcast.
//!
//! A [`Notifier`] owns the signal; every [`Noticer`] subscribed to it
//! resolves once [`Notifier::notify`] fires. `&Noticer` implements
//! [`Future`] so a subscription can sit in a `select!` arm without being
//! consumed or borrowed mutably.

use parking_lot::Mutex;
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll, Waker},
};

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

impl Inner {
    fn poll_fired(&self, cx: &mut Context<'_>) -> Poll<()> {
        if self.fired.load(Ordering::Acquire) {
            return Poll::Ready(());
        }
        {
            let mut wakers = self.wakers.lock();
            if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                wakers.push(cx.waker().clone());
            }
        }
        // Re-check after registering so a racing notify cannot be missed.
        if self.fired.load(Ordering::Acquire) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Owner side of a one-shot shutdown signal.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    inner: Arc<Inner>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe for the signal. Subscribing after [`Notifier::notify`]
    /// yields an already-resolved [`Noticer`].
    pub fn subscribe(&self) -> Noticer {
        Noticer { inner: Arc::clone(&self.inner) }
    }

    /// Fire the signal and wake every subscriber. Idempotent.
    pub fn notify(&self) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        let wakers = std::mem::take(&mut *self.inner.wakers.lock());
        for waker in wakers {
            waker.wake();
        }
    }

    /// True once [`Notifier::notify`] has fired.
    pub fn is_notified(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }
}

/// Subscriber side of a [`Notifier`]; resolves when the signal fires.
#[derive(Clone, Debug)]
pub struct Noticer {
    inner: Arc<Inner>,
}

impl Future for &Noticer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_fired(cx)
    }
}

impl Future for Noticer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_fired(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn notify_wakes_pending_subscriber() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();

        let waiter = tokio::spawn(async move { rx.await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        notifier.notify();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("subscriber woke")
            .expect("task completed");
    }

    #[tokio::test]
    async fn late_subscription_resolves_immediately() {
        let notifier = Notifier::new();
        notifier.notify();
        assert!(notifier.is_notified());
        notifier.subscribe().await;
    }

    #[tokio::test]
    async fn borrowed_noticer_selects() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        notifier.notify();

        // The reference form must be usable repeatedly.
        tokio::select! {
            _ = &rx => {}
        }
        tokio::select! {
            _ = &rx => {}
        }
    }
}
