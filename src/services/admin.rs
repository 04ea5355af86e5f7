//! Hidden admin panel unlock
//!
//! Tapping the header five times opens the admin view; closing it starts
//! the count over.

use tracing::info;

pub const ADMIN_UNLOCK_CLICKS: u32 = 5;

#[derive(Debug, Default)]
pub struct AdminUnlock {
    clicks: u32,
}

impl AdminUnlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one header tap; returns true on the tap that unlocks
    pub fn click(&mut self) -> bool {
        self.clicks = self.clicks.saturating_add(1);
        let unlocked_now = self.clicks == ADMIN_UNLOCK_CLICKS;
        if unlocked_now {
            info!("admin_panel_unlocked");
        }
        unlocked_now
    }

    #[inline]
    pub fn is_unlocked(&self) -> bool {
        self.clicks >= ADMIN_UNLOCK_CLICKS
    }

    pub fn clicks(&self) -> u32 {
        self.clicks
    }

    pub fn close(&mut self) {
        self.clicks = 0;
    }
}
