use tracing::warn;

use crate::frame_info::GameInput;
use crate::options::TimeSyncOptions;
use crate::Frame;

/// Fairness controller between two peers.
///
/// Tracks local and remote frame-advantage samples over a sliding window and
/// recommends how many frames the local simulation should artificially wait
/// so neither side predicts excessively. Both peers run the identical
/// algorithm independently; they converge because each observes the other's
/// self-reported advantage via quality reports.
///
/// This is a heuristic, not a hard guarantee.
#[derive(Debug)]
pub struct TimeSync<I>
where
    I: Copy + Clone + PartialEq + Default,
{
    local: Vec<i32>,
    remote: Vec<i32>,
    last_inputs: Vec<I>,
    options: TimeSyncOptions,
}

impl<I: Copy + Clone + PartialEq + Default> Default for TimeSync<I> {
    fn default() -> Self {
        Self::with_options(TimeSyncOptions::default())
    }
}

impl<I: Copy + Clone + PartialEq + Default> TimeSync<I> {
    /// Creates a controller with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a controller with the given options.
    #[must_use]
    pub fn with_options(options: TimeSyncOptions) -> Self {
        let window = options.frame_window_size.max(1);
        let input_window = options.min_unique_frames.max(1);
        Self {
            local: vec![0; window],
            remote: vec![0; window],
            last_inputs: vec![I::default(); input_window],
            options,
        }
    }

    /// Records one sample per simulated frame.
    ///
    /// Samples are indexed by `frame % window`, so older samples are
    /// naturally overwritten. Null or negative frames are skipped rather
    /// than wrapped into a bogus index.
    pub fn advance_frame(&mut self, input: &GameInput<I>, local_adv: i32, remote_adv: i32) {
        let frame = input.frame;
        if frame.is_null() || frame.as_i32() < 0 {
            warn!("time sync skipping sample for invalid frame {frame}");
            return;
        }
        let index = frame.as_i32() as usize;
        let input_len = self.last_inputs.len();
        self.last_inputs[index % input_len] = input.input;
        let local_len = self.local.len();
        self.local[index % local_len] = local_adv;
        let remote_len = self.remote.len();
        self.remote[index % remote_len] = remote_adv;
    }

    /// Recommends how many frames the local simulation should wait.
    ///
    /// Returns 0 when the local side is already behind or even, when the
    /// discrepancy is below `min_frame_advantage`, or — if
    /// `require_idle_input` is set — while the recent local inputs are still
    /// changing. The recommendation is clamped to `max_frame_advantage`.
    #[must_use]
    pub fn recommend_frame_wait_duration(&self) -> i32 {
        let local_avg = average(&self.local);
        let remote_avg = average(&self.remote);

        // The local side is behind or even; nothing to correct.
        if local_avg >= remote_avg {
            return 0;
        }

        // Meet the remote in the middle.
        let sleep_frames = ((remote_avg - local_avg) / 2.0).round() as i32;
        if sleep_frames < self.options.min_frame_advantage {
            return 0;
        }

        if self.options.require_idle_input && !self.recent_inputs_idle() {
            return 0;
        }

        sleep_frames.min(self.options.max_frame_advantage)
    }

    /// Whether the most recent input window is constant (no input changes).
    fn recent_inputs_idle(&self) -> bool {
        self.last_inputs
            .iter()
            .all(|input| *input == self.last_inputs[0])
    }
}

fn average(samples: &[i32]) -> f32 {
    let sum: i32 = samples.iter().sum();
    sum as f32 / samples.len() as f32
}

// #########
// # TESTS #
// #########
