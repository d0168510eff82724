//! Accessory behaviors, expressed as traits the core dispatches on by
//! presence rather than by a fixed accessory class hierarchy.
//!
//! An [`Accessory`](super::Accessory) on its own is just data. Behavior —
//! identify, start/stop a long-running device loop, produce a camera
//! snapshot — is attached by implementing the relevant trait and
//! registering it with the driver alongside the accessory it governs.

use async_trait::async_trait;

use crate::error::HandlerError;

/// Invoked for `POST /identify` on an unpaired accessory, or by a write to
/// the mandatory `Identify` characteristic once paired.
pub trait Identify: Send + Sync {
    fn identify(&self);
}

/// A long-running per-accessory task, started once the driver comes up and
/// stopped on shutdown.
#[async_trait]
pub trait Run: Send + Sync {
    async fn run(&self);
}

pub trait Stop: Send + Sync {
    fn stop(&self);
}

/// Produces a JPEG snapshot synchronously, within the caller's budget.
pub trait SnapshotSync: Send + Sync {
    fn snapshot(&self, width: u32, height: u32) -> Result<Vec<u8>, HandlerError>;
}

/// Produces a JPEG snapshot asynchronously. `POST /resource` gives this a
/// 9-second deadline and maps a timeout to [`HandlerError::SnapshotTimeout`].
#[async_trait]
pub trait SnapshotAsync: Send + Sync {
    async fn snapshot(&self, width: u32, height: u32) -> Result<Vec<u8>, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Toggle(AtomicBool);

    impl Identify for Toggle {
        fn identify(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn identify_trait_is_object_safe_and_callable() {
        let toggle = Toggle(AtomicBool::new(false));
        let dyn_identify: &dyn Identify = &toggle;
        dyn_identify.identify();
        assert!(toggle.0.load(Ordering::SeqCst));
    }
}
