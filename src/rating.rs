use std::time::{Duration, Instant};

pub const DEFAULT_COUNTDOWN_SECS: u64 = 10;
pub const DEFAULT_ACK_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    /// Counting down toward silent expiry; `remaining` is whole seconds.
    Counting { remaining: u64 },
    /// Rating submitted; showing the acknowledgment before hiding.
    Acknowledging { remaining: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEvent {
    /// Countdown hit zero with no rating picked. Nothing is submitted.
    Expired,
    /// Acknowledgment finished; overlay returned to hidden.
    Dismissed,
}

/// Post-watch rating overlay: `Hidden -> Counting(N) -> (submitted | expired)
/// -> Hidden`. Tick-driven rather than timer-handle-driven, so teardown is a
/// plain state reset and a stale timer can never fire into a torn-down
/// session.
#[derive(Debug)]
pub struct Overlay {
    state: OverlayState,
    countdown_secs: u64,
    ack_secs: u64,
    last_tick: Option<Instant>,
}

impl Overlay {
    pub fn new(countdown: Duration, ack: Duration) -> Self {
        Self {
            state: OverlayState::Hidden,
            countdown_secs: countdown.as_secs().max(1),
            ack_secs: ack.as_secs().max(1),
            last_tick: None,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state != OverlayState::Hidden
    }

    /// Show the overlay with a freshly reset countdown.
    pub fn show(&mut self, now: Instant) {
        self.state = OverlayState::Counting {
            remaining: self.countdown_secs,
        };
        self.last_tick = Some(now);
    }

    /// Teardown: hide immediately and forget the timer baseline.
    pub fn cancel(&mut self) {
        self.state = OverlayState::Hidden;
        self.last_tick = None;
    }

    /// Pick a rating while the countdown runs. Returns the accepted value;
    /// `None` when the overlay is not counting or the value is out of range.
    /// Acceptance is immediate regardless of remaining time.
    pub fn submit(&mut self, rating: u8, now: Instant) -> Option<u8> {
        if !(1..=5).contains(&rating) {
            return None;
        }
        match self.state {
            OverlayState::Counting { .. } => {
                self.state = OverlayState::Acknowledging {
                    remaining: self.ack_secs,
                };
                self.last_tick = Some(now);
                Some(rating)
            }
            _ => None,
        }
    }

    /// Advance by however many whole seconds have elapsed since the last
    /// tick. Returns at most one terminal event.
    pub fn tick(&mut self, now: Instant) -> Option<OverlayEvent> {
        let Some(last) = self.last_tick else {
            return None;
        };
        let elapsed = now.saturating_duration_since(last).as_secs();
        if elapsed == 0 {
            return None;
        }
        self.last_tick = Some(last + Duration::from_secs(elapsed));

        match self.state {
            OverlayState::Hidden => None,
            OverlayState::Counting { remaining } => {
                if elapsed >= remaining {
                    self.state = OverlayState::Hidden;
                    self.last_tick = None;
                    Some(OverlayEvent::Expired)
                } else {
                    self.state = OverlayState::Counting {
                        remaining: remaining - elapsed,
                    };
                    None
                }
            }
            OverlayState::Acknowledging { remaining } => {
                if elapsed >= remaining {
                    self.state = OverlayState::Hidden;
                    self.last_tick = None;
                    Some(OverlayEvent::Dismissed)
                } else {
                    self.state = OverlayState::Acknowledging {
                        remaining: remaining - elapsed,
                    };
                    None
                }
            }
        }
    }
}
