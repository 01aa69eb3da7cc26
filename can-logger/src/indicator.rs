//! Status indicator

use crate::types::Result;

/// Binary status output: on while a session is active
pub trait StatusIndicator: Send {
    fn set(&mut self, on: bool) -> Result<()>;
}

/// Indicator for setups without a status LED
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn set(&mut self, _on: bool) -> Result<()> {
        Ok(())
    }
}

impl<I: StatusIndicator + ?Sized> StatusIndicator for Box<I> {
    fn set(&mut self, on: bool) -> Result<()> {
        (**self).set(on)
    }
}
