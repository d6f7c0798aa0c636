//! One-shot asynchronous reactions.
//!
//! [`when`] keeps a reaction alive until its predicate holds, resolves the
//! returned future, and then destroys the reaction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::reaction::Reaction;
use crate::error::Result;

/// Future returned by [`when`].
///
/// Resolves to `true` once the predicate held, or `false` if the watching
/// reaction was destroyed first (see [`When::cancel`]).
#[derive(Debug)]
pub struct When {
    receiver: oneshot::Receiver<()>,
    reaction: Reaction,
    slot: Arc<Mutex<Option<Reaction>>>,
}

impl When {
    /// Stop watching. The future then resolves to `false`.
    pub fn cancel(&self) {
        self.reaction.destroy();
        self.slot.lock().take();
    }

    /// The reaction that evaluates the predicate.
    pub fn reaction(&self) -> &Reaction {
        &self.reaction
    }
}

impl Drop for When {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Future for When {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(outcome) => Poll::Ready(outcome.is_ok()),
            Poll::Pending if self.reaction.is_destroyed() => Poll::Ready(false),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Watch `predicate` reactively and resolve once it returns `true`.
///
/// The predicate runs immediately; if it already holds, the future is ready
/// straight away. Otherwise it re-runs whenever something it read changes.
pub fn when<F>(predicate: F) -> Result<When>
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let (sender, receiver) = oneshot::channel();
    let sender = Arc::new(Mutex::new(Some(sender)));
    let this: Arc<Mutex<Option<Reaction>>> = Arc::new(Mutex::new(None));

    let me = Arc::clone(&this);
    let reaction = Reaction::labelled("when", move || {
        if !predicate() {
            return Ok(());
        }
        if let Some(sender) = sender.lock().take() {
            let _ = sender.send(());
        }
        if let Some(me) = me.lock().take() {
            me.destroy();
        }
        Ok(())
    });
    *this.lock() = Some(reaction.clone());
    reaction.run()?;

    Ok(When {
        receiver,
        reaction,
        slot: this,
    })
}
