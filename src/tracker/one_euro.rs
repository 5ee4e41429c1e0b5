//! One Euro filter over 3D positions, one state slot per tracked channel.

/// Number of filter slots. Body channels and hand-pipeline channels share this
/// id space, so ids must stay distinct across both.
pub const CHANNEL_COUNT: usize = 100;

/// Stable filter slot id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u8);

impl ChannelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub min_cutoff: f32,
    pub beta: f32,
    pub d_cutoff: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            min_cutoff: 1.0,
            beta: 0.007,
            d_cutoff: 1.0,
        }
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f32, cutoff: f32) -> f32 {
    let r = 2.0 * std::f32::consts::PI * cutoff * te;
    r / (r + 1.0)
}

/// Filter memory for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState {
    pub previous_position: [f32; 3],
    pub previous_derivative: [f32; 3],
    pub previous_timestamp: f64,
    pub initialized: bool,
}

impl ChannelState {
    /// Returns the smoothed position for `value` observed at time `t` (seconds).
    pub fn filter(&mut self, params: &FilterParams, t: f64, value: [f32; 3]) -> [f32; 3] {
        if !self.initialized {
            *self = ChannelState {
                previous_position: value,
                previous_derivative: [0.0; 3],
                previous_timestamp: t,
                initialized: true,
            };
            return value;
        }

        let dt = (t - self.previous_timestamp) as f32;
        if !(dt > 0.0) {
            return self.previous_position;
        }

        let a_d = smoothing_factor(dt, params.d_cutoff);
        let mut position = [0.0; 3];
        let mut derivative = [0.0; 3];
        for i in 0..3 {
            let prev = self.previous_position[i];
            let dx = (value[i] - prev) / dt;
            let edx = self.previous_derivative[i] + a_d * (dx - self.previous_derivative[i]);
            let cutoff = params.min_cutoff + params.beta * edx.abs();
            let a = smoothing_factor(dt, cutoff);
            derivative[i] = edx;
            position[i] = prev + a * (value[i] - prev);
        }

        self.previous_position = position;
        self.previous_derivative = derivative;
        self.previous_timestamp = t;
        position
    }

    pub fn reset(&mut self) {
        *self = ChannelState::default();
    }
}

/// Fixed arena of per-channel filter state
pub struct FilterBank {
    params: FilterParams,
    channels: [ChannelState; CHANNEL_COUNT],
}

impl FilterBank {
    pub fn new(params: FilterParams) -> Self {
        Self {
            params,
            channels: [ChannelState::default(); CHANNEL_COUNT],
        }
    }

    /// None when `channel` is outside the arena.
    pub fn filter(&mut self, channel: ChannelId, t: f64, value: [f32; 3]) -> Option<[f32; 3]> {
        let params = self.params;
        self.channels
            .get_mut(channel.index())
            .map(|state| state.filter(&params, t, value))
    }

    pub fn state(&self, channel: ChannelId) -> Option<&ChannelState> {
        self.channels.get(channel.index())
    }

    pub fn reset_channel(&mut self, channel: ChannelId) {
        if let Some(state) = self.channels.get_mut(channel.index()) {
            state.reset();
        }
    }

    /// Clears every channel so the next sample of each passes through unfiltered.
    pub fn reset(&mut self) {
        for state in &mut self.channels {
            state.reset();
        }
        tracing::debug!("All filters reset");
    }
}
