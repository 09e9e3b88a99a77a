use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures_lite::Future;

#[cfg(test)]
pub use mock_instant::Instant;
#[cfg(not(test))]
pub use std::time::Instant;

/// Time from `earlier` to `later`, or zero if the clock appears to have gone backwards.
pub fn elapsed_between(earlier: Instant, later: Instant) -> Duration {
    if later > earlier {
        later - earlier
    } else {
        Duration::from_secs(0)
    }
}

/// Combinators for the session and the demo loop.
pub trait FutExt: Future + Sized {
    /// Fails with [`TimeoutErr`] if `self` isn't done after `dur`.
    fn timeout(self, dur: Duration) -> Timeout<Self> {
        Timeout {
            fut: self,
            deadline: async_io::Timer::after(dur),
        }
    }

    /// Races `self` against `other`. `self` is polled first, so it wins a tie.
    fn first<Other>(self, other: Other) -> First<Self, Other>
    where
        Other: Future,
    {
        First { left: self, right: other }
    }
}

impl<F: Future> FutExt for F {}

#[derive(Debug, PartialEq)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

pub use Either::*;

pin_project_lite::pin_project! {
    pub struct First<L, R> {
        #[pin] left: L,
        #[pin] right: R,
    }
}

impl<L, R> Future for First<L, R>
where
    L: Future,
    R: Future,
{
    type Output = Either<L::Output, R::Output>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(left) = this.left.poll(ctx) {
            return Poll::Ready(Left(left));
        }
        this.right.poll(ctx).map(Right)
    }
}

pin_project_lite::pin_project! {
    pub struct Timeout<F> {
        #[pin] fut: F,
        #[pin] deadline: async_io::Timer,
    }
}

impl<F> Future for Timeout<F>
where
    F: Future,
{
    type Output = Result<F::Output, TimeoutErr>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(out) = this.fut.poll(ctx) {
            return Poll::Ready(Ok(out));
        }
        this.deadline.poll(ctx).map(|_| Err(TimeoutErr))
    }
}

/// The deadline passed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutErr;

impl std::fmt::Display for TimeoutErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("timed out")
    }
}

impl std::error::Error for TimeoutErr {}
