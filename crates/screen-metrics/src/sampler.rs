//! Frame-duration sampling.
//!
//! [`FrameHub`] holds the per-surface measurement state that the host's
//! renderer feeds; every [`FrameSampleAggregator`] it hands out is one
//! capture on one surface.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{TracerError, TracerResult};
use crate::types::{FrameDurationSample, FrameHistogram, SurfaceId};

/// A frame-duration capture bound to at most one surface at a time.
pub trait FrameSampler: Send {
    /// Begin a fresh, empty capture on `surface`.
    fn attach(&mut self, surface: SurfaceId) -> TracerResult<()>;

    /// Stop capturing and hand back everything collected since `attach`.
    ///
    /// Draining a sampler that is not attached returns an empty histogram.
    fn drain_and_reset(&mut self, surface: SurfaceId) -> TracerResult<FrameHistogram>;

    /// Stop capturing and throw the samples away.
    fn detach(&mut self, surface: SurfaceId) {
        let _ = self.drain_and_reset(surface);
    }
}

/// Creates one sampler per measurement window.
pub trait FrameSamplerFactory: Send + Sync {
    fn create_sampler(&self) -> Box<dyn FrameSampler>;
}

type CaptureId = u64;
type Buckets = BTreeMap<u64, u64>;

#[derive(Debug, Default)]
struct HubState {
    next_capture: CaptureId,
    captures: HashMap<SurfaceId, HashMap<CaptureId, Buckets>>,
    closed_surfaces: HashSet<SurfaceId>,
}

impl HubState {
    fn remove_capture(&mut self, surface: SurfaceId, capture: CaptureId) -> Option<Buckets> {
        let slots = self.captures.get_mut(&surface)?;
        let buckets = slots.remove(&capture);
        if slots.is_empty() {
            self.captures.remove(&surface);
        }
        buckets
    }
}

/// Shared frame-timing state for every surface the host renders.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct FrameHub {
    state: Arc<Mutex<HubState>>,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A new, detached capture.
    pub fn aggregator(&self) -> FrameSampleAggregator {
        let mut state = self.state();
        let capture = state.next_capture;
        state.next_capture += 1;

        FrameSampleAggregator {
            hub: self.clone(),
            capture,
            attached: None,
        }
    }

    /// Record one rendered frame on `surface`.
    pub fn record_frame(&self, surface: SurfaceId, duration: Duration) {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.record_frames(surface, duration_ms, 1);
    }

    /// Record `count` frames of `duration_ms` each on `surface`.
    pub fn record_frames(&self, surface: SurfaceId, duration_ms: u64, count: u64) {
        if count == 0 {
            return;
        }

        let mut state = self.state();
        if let Some(slots) = state.captures.get_mut(&surface) {
            for buckets in slots.values_mut() {
                let entry = buckets.entry(duration_ms).or_insert(0);
                *entry = entry.saturating_add(count);
            }
        }
    }

    /// The surface went away: pending captures on it are lost and new ones
    /// are refused until [`FrameHub::reopen_surface`].
    pub fn close_surface(&self, surface: SurfaceId) {
        let mut state = self.state();
        state.captures.remove(&surface);
        state.closed_surfaces.insert(surface);
        log::debug!("frame hub closed {}", surface);
    }

    pub fn reopen_surface(&self, surface: SurfaceId) {
        self.state().closed_surfaces.remove(&surface);
    }

    /// Number of live captures across all surfaces.
    pub fn active_captures(&self) -> usize {
        self.state().captures.values().map(HashMap::len).sum()
    }
}

impl FrameSamplerFactory for FrameHub {
    fn create_sampler(&self) -> Box<dyn FrameSampler> {
        Box::new(self.aggregator())
    }
}

/// One capture handed out by a [`FrameHub`].
///
/// Dropping an attached aggregator releases its slot on the hub.
#[derive(Debug)]
pub struct FrameSampleAggregator {
    hub: FrameHub,
    capture: CaptureId,
    attached: Option<SurfaceId>,
}

impl FrameSampleAggregator {
    pub fn attached_surface(&self) -> Option<SurfaceId> {
        self.attached
    }

    fn release(&mut self) {
        if let Some(surface) = self.attached.take() {
            self.hub.state().remove_capture(surface, self.capture);
        }
    }
}

impl FrameSampler for FrameSampleAggregator {
    fn attach(&mut self, surface: SurfaceId) -> TracerResult<()> {
        self.release();

        let mut state = self.hub.state();
        if state.closed_surfaces.contains(&surface) {
            return Err(TracerError::sampling(surface, "surface is closed"));
        }
        state
            .captures
            .entry(surface)
            .or_default()
            .insert(self.capture, Buckets::new());
        drop(state);

        self.attached = Some(surface);
        Ok(())
    }

    fn drain_and_reset(&mut self, surface: SurfaceId) -> TracerResult<FrameHistogram> {
        match self.attached {
            None => return Ok(FrameHistogram::empty()),
            Some(attached) if attached != surface => {
                return Err(TracerError::sampling(
                    surface,
                    format!("capture is attached to {}", attached),
                ));
            }
            Some(_) => {}
        }

        self.attached = None;
        let buckets = self
            .hub
            .state()
            .remove_capture(surface, self.capture)
            .ok_or_else(|| TracerError::sampling(surface, "surface closed while capturing"))?;

        Ok(buckets
            .into_iter()
            .map(|(duration_ms, count)| FrameDurationSample::new(duration_ms, count))
            .collect())
    }

    fn detach(&mut self, _surface: SurfaceId) {
        self.release();
    }
}

impl Drop for FrameSampleAggregator {
    fn drop(&mut self) {
        self.release();
    }
}
