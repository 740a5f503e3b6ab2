//! Per-tile progress events and the sinks that consume them.

use std::time::Duration;

/// Emitted after every tile of every case.
#[derive(Debug, Clone, PartialEq)]
pub struct TileProgress {
    /// 0-based position of the case in the batch being segmented.
    pub case_index: usize,
    pub n_cases: usize,
    /// Tiles finished so far for this case (1-based).
    pub tile_index: usize,
    pub n_tiles: usize,
    /// Time spent on this case.
    pub elapsed: Duration,
    /// Time spent since the batch started.
    pub total_elapsed: Duration,
    /// Linear estimate of the time left for this case.
    pub eta: Duration,
}

impl TileProgress {
    pub fn percent(&self) -> f32 {
        if self.n_tiles == 0 {
            return 100.0;
        }
        100.0 * self.tile_index as f32 / self.n_tiles as f32
    }

    pub fn is_case_complete(&self) -> bool {
        self.tile_index >= self.n_tiles
    }
}

/// `elapsed / done * (total - done)`; zero once nothing is left.
pub fn linear_eta(elapsed: Duration, done: usize, total: usize) -> Duration {
    if done == 0 || done >= total {
        return Duration::ZERO;
    }
    let per_tile = elapsed.as_secs_f64() / done as f64;
    Duration::from_secs_f64(per_tile * (total - done) as f64)
}

/// `HHh MMm SSs`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub trait ProgressSink {
    fn on_tile(&mut self, progress: &TileProgress);

    fn on_case_finished(&mut self, _case_index: usize, _elapsed: Duration) {}
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_tile(&mut self, p: &TileProgress) {
        log::info!(
            "case {}/{} tile {}/{} ({:.1}%) elapsed {} total {} eta {}",
            p.case_index + 1,
            p.n_cases,
            p.tile_index,
            p.n_tiles,
            p.percent(),
            format_duration(p.elapsed),
            format_duration(p.total_elapsed),
            format_duration(p.eta),
        );
    }

    fn on_case_finished(&mut self, case_index: usize, elapsed: Duration) {
        log::info!(
            "case {} segmented in {}",
            case_index + 1,
            format_duration(elapsed)
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_tile(&mut self, _progress: &TileProgress) {}
}

/// Keeps every event; used by callers that report progress themselves.
#[derive(Debug, Default, Clone)]
pub struct RecordingProgress {
    pub tiles: Vec<TileProgress>,
    pub finished: Vec<(usize, Duration)>,
}

impl ProgressSink for RecordingProgress {
    fn on_tile(&mut self, progress: &TileProgress) {
        self.tiles.push(progress.clone());
    }

    fn on_case_finished(&mut self, case_index: usize, elapsed: Duration) {
        self.finished.push((case_index, elapsed));
    }
}
