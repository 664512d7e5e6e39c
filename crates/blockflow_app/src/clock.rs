// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fixed-timestep simulation clock.
//!
//! Wall-clock (or scripted) frame deltas go in, a whole number of fixed
//! simulation steps comes out.

/// Most fixed steps run for one frame
pub const MAX_STEPS_PER_FRAME: u32 = 8;

/// Clock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    /// Not started, or reset
    #[default]
    Stopped,
    /// Advancing
    Running,
    /// Holding time
    Paused,
}

impl ClockState {
    /// Check if running or paused
    pub fn is_active(&self) -> bool {
        matches!(self, ClockState::Running | ClockState::Paused)
    }
}

/// Fixed-timestep accumulator
#[derive(Debug, Clone)]
pub struct SimulationClock {
    /// Current state
    state: ClockState,
    /// Time scale (1.0 = normal speed)
    time_scale: f32,
    /// Seconds per fixed step
    fixed_timestep: f64,
    /// Accumulated delta time for fixed timestep
    accumulated_time: f64,
    /// Frames since start
    pub frame_count: u64,
    /// Fixed steps since start
    pub step_count: u64,
    /// Scaled time since start
    pub elapsed_time: f64,
}

#[allow(dead_code)]
impl SimulationClock {
    /// Create a stopped clock
    pub fn new(fixed_timestep: f64) -> Self {
        Self {
            state: ClockState::Stopped,
            time_scale: 1.0,
            fixed_timestep: fixed_timestep.max(f64::EPSILON),
            accumulated_time: 0.0,
            frame_count: 0,
            step_count: 0,
            elapsed_time: 0.0,
        }
    }

    /// Start or resume. Returns true if the state changed.
    pub fn play(&mut self) -> bool {
        match self.state {
            ClockState::Stopped => {
                self.reset_counters();
                self.state = ClockState::Running;
                tracing::debug!("clock started");
                true
            }
            ClockState::Paused => {
                self.state = ClockState::Running;
                tracing::debug!("clock resumed");
                true
            }
            ClockState::Running => false,
        }
    }

    /// Pause. Returns true if the state changed.
    pub fn pause(&mut self) -> bool {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
            tracing::debug!("clock paused");
            true
        } else {
            false
        }
    }

    /// Stop and reset the counters
    pub fn stop(&mut self) {
        if self.state.is_active() {
            self.state = ClockState::Stopped;
            self.reset_counters();
            tracing::debug!("clock stopped");
        }
    }

    fn reset_counters(&mut self) {
        self.frame_count = 0;
        self.step_count = 0;
        self.elapsed_time = 0.0;
        self.accumulated_time = 0.0;
    }

    /// Feed one frame's delta time. Returns the number of fixed steps to run.
    pub fn update(&mut self, delta_time: f64) -> u32 {
        if self.state != ClockState::Running {
            return 0;
        }

        let scaled_delta = delta_time * f64::from(self.time_scale);
        self.elapsed_time += scaled_delta;
        self.accumulated_time += scaled_delta;
        self.frame_count += 1;

        let mut steps = 0;
        while self.accumulated_time >= self.fixed_timestep {
            self.accumulated_time -= self.fixed_timestep;
            steps += 1;

            // Drop the backlog instead of spiralling
            if steps >= MAX_STEPS_PER_FRAME {
                tracing::warn!(backlog = self.accumulated_time, "simulation falling behind");
                self.accumulated_time = 0.0;
                break;
            }
        }

        self.step_count += u64::from(steps);
        steps
    }

    /// Run exactly one step while paused
    pub fn step_frame(&mut self) -> bool {
        if self.state == ClockState::Paused {
            self.elapsed_time += self.fixed_timestep;
            self.frame_count += 1;
            self.step_count += 1;
            true
        } else {
            false
        }
    }

    /// Current state
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Seconds per fixed step
    pub fn fixed_timestep(&self) -> f64 {
        self.fixed_timestep
    }

    /// Time scale
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Set time scale (clamped to reasonable range)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.clamp(0.0, 10.0);
    }
}
