//! Attestation authorities available to the host.

use std::{sync::mpsc, thread, time::Duration};
use tracing::{debug, warn};
use trustlet::{attestation::Authority, Error};
use zeroize::Zeroizing;

/// Issues a module key supplied on the command line.
///
/// An optional delay simulates a slow attestation service.
pub struct Static {
    key: Zeroizing<Vec<u8>>,
    delay: Duration,
}

impl Static {
    pub fn new(key: Zeroizing<Vec<u8>>, delay: Duration) -> Self {
        Self { key, delay }
    }
}

impl Authority for Static {
    fn module_key(&mut self) -> Result<Zeroizing<Vec<u8>>, Error> {
        if !self.delay.is_zero() {
            debug!(delay = ?self.delay, "waiting for authority");
            thread::sleep(self.delay);
        }
        Ok(self.key.clone())
    }
}

/// Bounds the time spent waiting on another [Authority].
///
/// The inner authority runs on its own thread. If it does not answer within the timeout, the fetch
/// fails with [Error::AuthorityUnreachable] and the inner authority is abandoned.
pub struct Bounded<A> {
    inner: Option<A>,
    timeout: Duration,
}

impl<A: Authority + Send + 'static> Bounded<A> {
    pub fn new(inner: A, timeout: Duration) -> Self {
        Self {
            inner: Some(inner),
            timeout,
        }
    }
}

impl<A: Authority + Send + 'static> Authority for Bounded<A> {
    fn module_key(&mut self) -> Result<Zeroizing<Vec<u8>>, Error> {
        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| Error::AuthorityUnreachable("authority already abandoned".into()))?;
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let result = inner.module_key();
            // The receiver may have given up already
            let _ = sender.send((inner, result));
        });
        match receiver.recv_timeout(self.timeout) {
            Ok((inner, result)) => {
                self.inner = Some(inner);
                result
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(timeout = ?self.timeout, "authority did not answer");
                Err(Error::AuthorityUnreachable(format!(
                    "no answer within {:?}",
                    self.timeout
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::AuthorityUnreachable(
                "authority thread exited".into(),
            )),
        }
    }
}
