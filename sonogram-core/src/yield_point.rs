//! Cooperative suspension points and request tokens.
//!
//! Long loops call [`checkpoint`] every K units of work. The host decides what
//! a yield means (a zero-delay browser timeout, nothing at all on a worker
//! thread) and the token check drops work that a newer request superseded.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, SpectrogramError};

/// Host-provided suspension point.
pub trait YieldPoint {
    fn yield_now(&mut self) -> impl Future<Output = ()>;
}

/// Never suspends. For native callers and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl YieldPoint for Immediate {
    fn yield_now(&mut self) -> impl Future<Output = ()> {
        std::future::ready(())
    }
}

/// Issues monotonically increasing request ids.
#[derive(Clone, Debug, Default)]
pub struct TokenSource {
    latest: Arc<AtomicU64>,
}

impl TokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new token; every previously issued token becomes stale.
    pub fn issue(&self) -> RequestToken {
        let id = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        RequestToken { id, latest: Arc::clone(&self.latest) }
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }
}

/// Identity of one request, checked at each yield point.
#[derive(Clone, Debug)]
pub struct RequestToken {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl RequestToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.id
    }

    pub fn ensure_current(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(SpectrogramError::Superseded { token: self.id })
        }
    }
}

/// Yield to the host, then fail if the request went stale meanwhile.
pub async fn checkpoint<Y: YieldPoint>(yielder: &mut Y, token: &RequestToken) -> Result<()> {
    yielder.yield_now().await;
    token.ensure_current()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_token_supersedes_older() {
        let source = TokenSource::new();
        let a = source.issue();
        assert!(a.is_current());
        let b = source.issue();
        assert!(b.id() > a.id());
        assert!(!a.is_current());
        assert!(matches!(
            a.ensure_current(),
            Err(SpectrogramError::Superseded { token }) if token == a.id()
        ));
        assert!(b.ensure_current().is_ok());
    }

    #[test]
    fn checkpoint_reports_stale_token() {
        let source = TokenSource::new();
        let stale = source.issue();
        let _fresh = source.issue();
        let res = pollster::block_on(checkpoint(&mut Immediate, &stale));
        assert!(res.is_err());
    }
}
