use tokio::sync::watch;

/// Outcome flags of one connect attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkFlags {
    pub connected: bool,
    pub failed: bool,
}

impl LinkFlags {
    pub fn is_settled(&self) -> bool {
        self.connected || self.failed
    }
}

/// Dual-flag signal written by the event dispatcher and awaited by `connect`.
///
/// Both flags live in one watch value, so a waiter always observes a
/// consistent pair.
#[derive(Debug)]
pub struct ConnectSignal {
    tx: watch::Sender<LinkFlags>,
}

impl ConnectSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LinkFlags::default());
        Self { tx }
    }

    pub fn reset(&self) {
        self.tx.send_replace(LinkFlags::default());
    }

    pub fn set_connected(&self) {
        self.tx.send_modify(|flags| flags.connected = true);
    }

    pub fn set_failed(&self) {
        self.tx.send_modify(|flags| flags.failed = true);
    }

    pub fn flags(&self) -> LinkFlags {
        *self.tx.borrow()
    }

    /// Wait until either flag is raised.
    pub async fn wait(&self) -> LinkFlags {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(LinkFlags::is_settled).await {
            Ok(flags) => *flags,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.flags(),
        }
    }
}

impl Default for ConnectSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_raised_flag() {
        let signal = Arc::new(ConnectSignal::new());
        let setter = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            setter.set_failed();
        });

        let flags = signal.wait().await;
        assert!(flags.failed);
        assert!(!flags.connected);
    }

    #[tokio::test]
    async fn test_wait_sees_flag_raised_before_subscribe() {
        let signal = ConnectSignal::new();
        signal.set_connected();
        assert!(signal.wait().await.connected);
    }

    #[test]
    fn test_reset_clears_both() {
        let signal = ConnectSignal::new();
        signal.set_connected();
        signal.set_failed();
        signal.reset();
        assert_eq!(signal.flags(), LinkFlags::default());
    }
}
