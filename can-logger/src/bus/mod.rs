//! Frame sources
//!
//! The capture loop reads frames through `BusSource` and never touches a
//! socket directly. The Linux SocketCAN driver lives behind the `socketcan`
//! feature; tests drive the loop with scripted sources.

#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod socketcan;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use self::socketcan::SocketCanBus;

use crate::types::{Frame, Result};
use std::time::Duration;

/// A blocking source of CAN frames
pub trait BusSource: Send {
    /// Wait up to `timeout` for the next frame
    ///
    /// `Ok(None)` means the timeout elapsed with nothing received. Errors are
    /// transport faults; the caller decides whether to retry.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Drop frames already queued, returning how many were discarded
    fn discard_pending(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Interface name for log messages
    fn describe(&self) -> String {
        "bus".to_string()
    }
}

impl<B: BusSource + ?Sized> BusSource for Box<B> {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        (**self).receive(timeout)
    }

    fn discard_pending(&mut self) -> Result<usize> {
        (**self).discard_pending()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
