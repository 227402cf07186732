//! Parameter automation timeline
//!
//! Holds the scheduled value changes of one parameter: jumps at a time and
//! linear ramps that arrive at a time. The renderer asks for the value at
//! monotonically increasing times, so events already passed are folded
//! into the current value and dropped.

use std::collections::VecDeque;

use crate::engine::graph::Time;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Step,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AutomationEvent {
    time: Time,
    value: f32,
    shape: Shape,
}

/// Automation state for one parameter
#[derive(Debug, Clone)]
pub struct ParamTimeline {
    /// Value held since the last passed event
    value: f32,
    /// Time and value a pending ramp starts from
    anchor: (Time, f32),
    /// Future events, sorted by time
    events: VecDeque<AutomationEvent>,
}

impl ParamTimeline {
    /// Create a timeline holding `value` from `now`
    pub fn new(now: Time, value: f32) -> Self {
        Self {
            value,
            anchor: (now, value),
            events: VecDeque::new(),
        }
    }

    /// Set the value immediately and drop all scheduled events
    pub fn set(&mut self, now: Time, value: f32) {
        self.events.clear();
        self.value = value;
        self.anchor = (now, value);
    }

    /// Jump to `value` at `time`
    pub fn schedule_value(&mut self, time: Time, value: f32) {
        self.insert(AutomationEvent {
            time,
            value,
            shape: Shape::Step,
        });
    }

    /// Ramp linearly from the preceding event to `value` at `time`
    pub fn schedule_ramp(&mut self, time: Time, value: f32) {
        self.insert(AutomationEvent {
            time,
            value,
            shape: Shape::Linear,
        });
    }

    /// Drop every event at or after `from`
    pub fn cancel(&mut self, from: Time) {
        self.events.retain(|ev| ev.time < from);
    }

    /// Number of events not yet passed
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Value at time `t`
    ///
    /// Calls must use non-decreasing `t`; passed events are consumed.
    pub fn value_at(&mut self, t: Time) -> f32 {
        while let Some(ev) = self.events.front().copied() {
            if ev.time > t {
                break;
            }
            self.value = ev.value;
            self.anchor = (ev.time, ev.value);
            self.events.pop_front();
        }

        match self.events.front() {
            Some(ev) if ev.shape == Shape::Linear => {
                let (t0, v0) = self.anchor;
                let span = ev.time - t0;
                if span <= 0.0 {
                    return ev.value;
                }
                let progress = ((t - t0) / span).clamp(0.0, 1.0) as f32;
                v0 + (ev.value - v0) * progress
            }
            _ => self.value,
        }
    }

    fn insert(&mut self, event: AutomationEvent) {
        // Later calls win ties, like repeated setValueAtTime on the same time
        let index = self
            .events
            .iter()
            .position(|ev| ev.time > event.time)
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
    }
}
