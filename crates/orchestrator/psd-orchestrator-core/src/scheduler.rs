//! When to run a compute pass.
//!
//! The scheduler never touches host hooks itself. Every transition returns the
//! [`Subscriptions`] the host should have attached, and every hook callback
//! (`on_frame`, `on_graph_update`, `on_timer`) answers whether a pass runs now.
//! Time is host-supplied seconds on a monotonic clock.

use serde::{Deserialize, Serialize};

use crate::config::clamp_hz;

/// Scheduling strategies supported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Frame hook during playback, idle timer otherwise.
    #[default]
    Auto,
    /// Frame and graph-update hooks regardless of playback.
    ForcePlayback,
    /// Idle timer regardless of playback.
    ForceTimer,
}

/// Hooks the host should have attached after a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscriptions {
    pub playback_notifications: bool,
    pub frame_hook: bool,
    pub graph_update_hook: bool,
    /// Interval in seconds of the self re-arming timer, when one should run.
    pub timer_interval: Option<f64>,
}

/// Answer to a timer callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerTick {
    pub run: bool,
    /// Seconds until the next callback; `None` means do not reschedule.
    pub reschedule: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    mode: ScheduleMode,
    idle_hz: f64,
    running: bool,
    playing: bool,
    last_run: Option<f64>,
}

impl Scheduler {
    pub fn new(mode: ScheduleMode, idle_hz: f64) -> Self {
        Self {
            mode,
            idle_hz: clamp_hz(idle_hz),
            running: false,
            playing: false,
            last_run: None,
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    pub fn idle_hz(&self) -> f64 {
        self.idle_hz
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn last_run(&self) -> Option<f64> {
        self.last_run
    }

    pub fn idle_interval(&self) -> f64 {
        1.0 / self.idle_hz
    }

    pub fn start(&mut self) -> Subscriptions {
        if !self.running {
            log::info!("psd scheduler started in {:?} mode", self.mode);
        }
        self.running = true;
        self.last_run = None;
        self.subscriptions()
    }

    pub fn stop(&mut self) -> Subscriptions {
        if self.running {
            log::info!("psd scheduler stopped");
        }
        self.running = false;
        self.subscriptions()
    }

    pub fn set_mode(&mut self, mode: ScheduleMode) -> Subscriptions {
        self.mode = mode;
        self.subscriptions()
    }

    /// Takes effect on the next scheduling decision.
    pub fn set_idle_hz(&mut self, hz: f64) -> Subscriptions {
        self.idle_hz = clamp_hz(hz);
        self.subscriptions()
    }

    pub fn on_playback_changed(&mut self, playing: bool) -> Subscriptions {
        self.playing = playing;
        self.subscriptions()
    }

    pub fn subscriptions(&self) -> Subscriptions {
        if !self.running {
            return Subscriptions::default();
        }
        match self.mode {
            ScheduleMode::Auto => Subscriptions {
                playback_notifications: true,
                frame_hook: true,
                graph_update_hook: true,
                timer_interval: (!self.playing).then(|| self.idle_interval()),
            },
            ScheduleMode::ForcePlayback => Subscriptions {
                playback_notifications: true,
                frame_hook: true,
                graph_update_hook: true,
                timer_interval: None,
            },
            ScheduleMode::ForceTimer => Subscriptions {
                playback_notifications: false,
                frame_hook: false,
                graph_update_hook: false,
                timer_interval: Some(self.idle_interval()),
            },
        }
    }

    /// Minimum spacing between passes: none while playing, else the idle interval.
    pub fn min_interval(&self) -> f64 {
        if self.playing {
            0.0
        } else {
            self.idle_interval()
        }
    }

    /// Rate limiter shared by every hook. Records `now` when it admits a pass.
    fn admit(&mut self, now: f64) -> bool {
        if let Some(last) = self.last_run {
            if now - last < self.min_interval() {
                return false;
            }
        }
        self.last_run = Some(now);
        true
    }

    /// Animation frame changed.
    pub fn on_frame(&mut self, now: f64) -> bool {
        if !self.running || self.mode == ScheduleMode::ForceTimer {
            return false;
        }
        self.admit(now)
    }

    /// Host dependency graph finished an update.
    pub fn on_graph_update(&mut self, now: f64) -> bool {
        if !self.running {
            return false;
        }
        let active = match self.mode {
            ScheduleMode::Auto => self.playing,
            ScheduleMode::ForcePlayback => true,
            ScheduleMode::ForceTimer => false,
        };
        active && self.admit(now)
    }

    pub fn on_timer(&mut self, now: f64) -> TimerTick {
        let armed = self.running
            && match self.mode {
                ScheduleMode::Auto => !self.playing,
                ScheduleMode::ForceTimer => true,
                ScheduleMode::ForcePlayback => false,
            };
        if !armed {
            return TimerTick {
                run: false,
                reschedule: None,
            };
        }
        TimerTick {
            run: self.admit(now),
            reschedule: Some(self.idle_interval()),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(ScheduleMode::Auto, 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_scheduler_runs_nothing() {
        let mut s = Scheduler::default();
        assert_eq!(s.subscriptions(), Subscriptions::default());
        assert!(!s.on_frame(0.0));
        assert_eq!(
            s.on_timer(0.0),
            TimerTick {
                run: false,
                reschedule: None
            }
        );
    }

    #[test]
    fn auto_switches_between_timer_and_frame_hook() {
        let mut s = Scheduler::new(ScheduleMode::Auto, 10.0);
        let subs = s.start();
        assert_eq!(subs.timer_interval, Some(0.1));
        assert!(subs.playback_notifications);

        let subs = s.on_playback_changed(true);
        assert_eq!(subs.timer_interval, None);
        // timer fired after playback resumed cancels itself
        assert_eq!(s.on_timer(1.0).reschedule, None);
        // no throttle while playing
        assert!(s.on_frame(1.0));
        assert!(s.on_frame(1.001));
        assert!(s.on_graph_update(1.002));

        s.on_playback_changed(false);
        assert!(!s.on_graph_update(1.5));
        let tick = s.on_timer(1.05);
        assert!(!tick.run);
        assert_eq!(tick.reschedule, Some(0.1));
        assert!(s.on_timer(1.2).run);
    }

    #[test]
    fn rate_limit_is_strict_less_than() {
        let mut s = Scheduler::new(ScheduleMode::ForceTimer, 4.0);
        s.start();
        assert!(s.on_timer(0.0).run);
        assert!(!s.on_timer(0.2).run);
        assert!(s.on_timer(0.25).run);
    }

    #[test]
    fn force_modes_ignore_playback() {
        let mut s = Scheduler::new(ScheduleMode::ForceTimer, 10.0);
        s.start();
        s.on_playback_changed(true);
        assert!(!s.on_frame(0.0));
        assert!(!s.on_graph_update(0.0));
        assert!(s.on_timer(0.0).run);

        let subs = s.set_mode(ScheduleMode::ForcePlayback);
        assert_eq!(subs.timer_interval, None);
        assert_eq!(s.on_timer(1.0).reschedule, None);
        s.on_playback_changed(false);
        assert!(s.on_graph_update(1.0));
        // not playing, so still throttled at the idle rate
        assert!(!s.on_frame(1.05));
        assert!(s.on_frame(1.1));
    }

    #[test]
    fn idle_hz_is_clamped_and_applies_to_next_decision() {
        let mut s = Scheduler::new(ScheduleMode::ForceTimer, 1000.0);
        assert_eq!(s.idle_hz(), 240.0);
        s.start();
        let subs = s.set_idle_hz(0.5);
        assert_eq!(subs.timer_interval, Some(1.0));
        assert_eq!(s.on_timer(0.0).reschedule, Some(1.0));
    }

    #[test]
    fn stop_detaches_everything() {
        let mut s = Scheduler::new(ScheduleMode::Auto, 10.0);
        s.start();
        assert_eq!(s.stop(), Subscriptions::default());
        assert_eq!(s.on_timer(5.0).reschedule, None);
        assert!(!s.on_graph_update(5.0));
    }
}
