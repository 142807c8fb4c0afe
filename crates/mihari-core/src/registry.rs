use std::sync::Mutex;

use image::RgbaImage;
use mihari_types::{Rect, RegionId};

/// Read-only view of one region for the interaction layer.
#[derive(Debug, Clone)]
pub struct RegionSnapshot {
    pub id: RegionId,
    pub rect: Rect,
    pub enabled: bool,
    pub in_flight: bool,
    pub text: String,
    pub translated: String,
}

struct RegionEntry {
    id: RegionId,
    rect: Rect,
    enabled: bool,
    in_flight: bool,
    pending_remove: bool,
    last_frame: Option<RgbaImage>,
    text: String,
    translated: String,
}

/// Canonical region set. The scheduler works over stable snapshots
/// taken at tick start; mutations from the interaction layer apply
/// starting the following tick. Insertion order is preserved.
#[derive(Default)]
pub struct RegionRegistry {
    inner: Mutex<Vec<RegionEntry>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions enter enabled by default.
    pub fn add(&self, rect: Rect) -> RegionId {
        let id = RegionId::new();
        let mut inner = self.inner.lock().unwrap();
        inner.push(RegionEntry {
            id,
            rect,
            enabled: true,
            in_flight: false,
            pending_remove: false,
            last_frame: None,
            text: String::new(),
            translated: String::new(),
        });
        tracing::info!(region = %id, ?rect, "region added");
        id
    }

    pub fn set_enabled(&self, id: RegionId, enabled: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.iter_mut().find(|e| e.id == id && !e.pending_remove) {
            Some(entry) => {
                entry.enabled = enabled;
                tracing::info!(region = %id, enabled, "region toggled");
                true
            }
            None => false,
        }
    }

    /// Remove a region. An in-flight region is marked for deferred
    /// deletion, completed when its run finishes; either way it is
    /// excluded from all future ticks immediately.
    pub fn remove(&self, id: RegionId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.iter_mut().position(|e| e.id == id && !e.pending_remove) {
            Some(idx) => {
                if inner[idx].in_flight {
                    inner[idx].pending_remove = true;
                    tracing::info!(region = %id, "region removal deferred until run completes");
                } else {
                    inner.remove(idx);
                    tracing::info!(region = %id, "region removed");
                }
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<RegionSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .filter(|e| !e.pending_remove)
            .map(|e| RegionSnapshot {
                id: e.id,
                rect: e.rect,
                enabled: e.enabled,
                in_flight: e.in_flight,
                text: e.text.clone(),
                translated: e.translated.clone(),
            })
            .collect()
    }

    pub fn rect_of(&self, id: RegionId) -> Option<Rect> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .find(|e| e.id == id && !e.pending_remove)
            .map(|e| e.rect)
    }

    /// Match a full or shortened identifier from the command surface.
    pub fn resolve(&self, prefix: &str) -> Option<RegionId> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .filter(|e| !e.pending_remove)
            .map(|e| e.id)
            .find(|id| id.matches(prefix))
    }

    /// Tick-start snapshot: every enabled region without a run already
    /// in flight, atomically marked in-flight. At-most-one run per
    /// region follows from taking the flag here.
    pub fn begin_runnable(&self) -> Vec<(RegionId, Rect)> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .iter_mut()
            .filter(|e| e.enabled && !e.in_flight && !e.pending_remove)
            .map(|e| {
                e.in_flight = true;
                (e.id, e.rect)
            })
            .collect()
    }

    pub fn last_frame(&self, id: RegionId) -> Option<RgbaImage> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.last_frame.clone())
    }

    /// Store the frame once change detection passes. A frame whose
    /// recognition later fails is not retried until the pixels change
    /// again.
    pub fn commit_frame(&self, id: RegionId, frame: RgbaImage) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.iter_mut().find(|e| e.id == id) {
            entry.last_frame = Some(frame);
        }
    }

    /// Complete a run. Returns whether the result was published;
    /// a region removed mid-run is deleted here and its result
    /// discarded.
    pub fn finish(&self, id: RegionId, result: Option<(String, String)>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(idx) = inner.iter().position(|e| e.id == id) else {
            return false;
        };
        inner[idx].in_flight = false;
        if inner[idx].pending_remove {
            inner.remove(idx);
            return false;
        }
        match result {
            Some((text, translated)) => {
                inner[idx].text = text;
                inner[idx].translated = translated;
                true
            }
            None => false,
        }
    }
}
