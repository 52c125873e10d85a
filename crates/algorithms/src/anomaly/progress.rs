//! Coarse progress reporting
//!
//! Long operations report `(percent, step)` checkpoints to a caller-owned
//! sink. The library never stores progress itself.

/// Receiver for checkpoint updates
pub trait Progress: Sync {
    fn checkpoint(&self, percent: u8, step: &str);
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn checkpoint(&self, _percent: u8, _step: &str) {}
}

impl<F> Progress for F
where
    F: Fn(u8, &str) + Sync,
{
    fn checkpoint(&self, percent: u8, step: &str) {
        self(percent, step)
    }
}
