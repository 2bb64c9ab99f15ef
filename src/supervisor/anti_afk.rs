use std::time::Duration;

use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

use crate::transport::Input;

pub const PERIOD: Duration = Duration::from_secs(10);
pub const HOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStep {
    Press,
    Release,
}

impl IdleStep {
    pub fn pressed(self) -> bool {
        self == IdleStep::Press
    }
}

/// Anti-idle timer for one session generation.
///
/// Every [`PERIOD`] the inputs are pressed, then released [`HOLD`] later.
/// The first press happens one period after creation. `next` is cancel safe,
/// so it can sit in a `select!` next to the session's event stream; dropping
/// the timer cancels it.
pub struct AntiAfk {
    ticker: Interval,
    release_at: Option<Instant>,
    sneak: bool,
}

impl AntiAfk {
    pub fn new(sneak: bool) -> Self {
        let mut ticker = interval_at(Instant::now() + PERIOD, PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            release_at: None,
            sneak,
        }
    }

    /// Inputs toggled on each step: jump, plus sneak when enabled.
    pub fn inputs(&self) -> &'static [Input] {
        if self.sneak {
            &[Input::Jump, Input::Sneak]
        } else {
            &[Input::Jump]
        }
    }

    pub async fn next(&mut self) -> IdleStep {
        if let Some(release_at) = self.release_at {
            sleep_until(release_at).await;
            self.release_at = None;
            return IdleStep::Release;
        }

        let pressed_at = self.ticker.tick().await;
        self.release_at = Some(pressed_at + HOLD);
        IdleStep::Press
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_press_then_release_schedule() {
        let start = Instant::now();
        let mut timer = AntiAfk::new(false);

        assert_eq!(timer.next().await, IdleStep::Press);
        assert_eq!(start.elapsed(), PERIOD);

        assert_eq!(timer.next().await, IdleStep::Release);
        assert_eq!(start.elapsed(), PERIOD + HOLD);

        assert_eq!(timer.next().await, IdleStep::Press);
        assert_eq!(start.elapsed(), PERIOD * 2);
    }

    #[test]
    fn test_inputs() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = rt.enter();
        assert_eq!(AntiAfk::new(false).inputs(), &[Input::Jump]);
        assert_eq!(AntiAfk::new(true).inputs(), &[Input::Jump, Input::Sneak]);
    }
}
