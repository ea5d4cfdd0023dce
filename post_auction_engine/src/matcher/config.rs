use chrono::Duration;

/// Tunables for the event matcher. All retention and inference windows are explicit constructor inputs; the
/// matcher keeps no hidden globals.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// How long an orphan win notice waits for its submission record before the entry is abandoned, and the
    /// window inside which a notice for an unknown auction is still treated as "early" rather than lost.
    pub loss_timeout: Duration,
    /// How long a finished win is retained for late delivery telemetry.
    pub win_timeout: Duration,
    /// How long a finished loss is retained for late win notices.
    pub auction_timeout: Duration,
    /// Settle really late win notices for unknown auctions directly against the event's account, bypassing the
    /// reservation flow. Embedders that reconcile such wins elsewhere can switch this off.
    pub settle_unknown_wins: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            loss_timeout: Duration::seconds(15),
            win_timeout: Duration::hours(1),
            auction_timeout: Duration::minutes(15),
            settle_unknown_wins: true,
        }
    }
}

impl MatcherConfig {
    pub fn with_loss_timeout(mut self, timeout: Duration) -> Self {
        self.loss_timeout = timeout;
        self
    }

    pub fn with_win_timeout(mut self, timeout: Duration) -> Self {
        self.win_timeout = timeout;
        self
    }

    pub fn with_auction_timeout(mut self, timeout: Duration) -> Self {
        self.auction_timeout = timeout;
        self
    }
}
