use image::RgbaImage;
use mihari_types::Rect;
use xcap::{Monitor, Window};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The window handle no longer resolves to a live window. Callers
    /// pause processing for this window's regions until reselection.
    #[error("window no longer exists")]
    InvalidWindow,

    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
}

/// Pixel source for a rectangle of a target window, in client
/// coordinates with a top-left origin. Implementations may block.
pub trait CaptureSource: Send + Sync {
    fn capture(&self, window_id: u32, rect: Rect) -> Result<RgbaImage, CaptureError>;
}

/// List visible candidate windows for target selection.
pub fn list_windows() -> Result<Vec<WindowInfo>, CaptureError> {
    let windows = Window::all().map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    Ok(windows
        .into_iter()
        .filter(|w| !w.title().is_empty() && !w.is_minimized())
        .map(|w| WindowInfo {
            id: w.id(),
            title: w.title().to_string(),
        })
        .collect())
}

/// Find a window by title: exact match first, then case-insensitive
/// substring.
pub fn find_window(title: &str) -> Result<Option<WindowInfo>, CaptureError> {
    let windows = list_windows()?;
    if let Some(w) = windows.iter().find(|w| w.title == title) {
        return Ok(Some(w.clone()));
    }
    let needle = title.to_lowercase();
    Ok(windows
        .into_iter()
        .find(|w| w.title.to_lowercase().contains(&needle)))
}

/// Focus-independent window capture with a desktop-composite fallback
/// for windows whose backing surface copies come back degraded
/// (common with hardware-accelerated composition).
pub struct WindowSource;

impl WindowSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for WindowSource {
    fn capture(&self, window_id: u32, rect: Rect) -> Result<RgbaImage, CaptureError> {
        let windows = Window::all().map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
        let window = windows
            .into_iter()
            .find(|w| w.id() == window_id)
            .ok_or(CaptureError::InvalidWindow)?;

        let rect = rect
            .clamp_to(window.width(), window.height())
            .ok_or_else(|| CaptureError::CaptureFailed("region outside window".into()))?;

        // Content copy from the window's backing surface first; works
        // without focus.
        if let Ok(full) = window.capture_image() {
            let cropped = crop(&convert(full), rect);
            if !is_degraded(&cropped) {
                return Ok(cropped);
            }
            tracing::debug!(window_id, "window content copy degraded, trying composite");
        }

        composite_fallback(&window, rect)
    }
}

/// Desktop-composited copy of the same screen rectangle.
fn composite_fallback(window: &Window, rect: Rect) -> Result<RgbaImage, CaptureError> {
    let monitors = Monitor::all().map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    let monitor = monitors
        .iter()
        .find(|m| {
            window.x() >= m.x()
                && window.y() >= m.y()
                && window.x() < m.x() + m.width() as i32
                && window.y() < m.y() + m.height() as i32
        })
        .or(monitors.first())
        .ok_or_else(|| CaptureError::CaptureFailed("no monitor found".into()))?;

    let screen = monitor
        .capture_image()
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

    let screen_rect = Rect {
        left: window.x() - monitor.x() + rect.left,
        top: window.y() - monitor.y() + rect.top,
        width: rect.width,
        height: rect.height,
    };
    let screen_rect = screen_rect
        .clamp_to(monitor.width(), monitor.height())
        .ok_or_else(|| CaptureError::CaptureFailed("region outside monitor".into()))?;

    Ok(crop(&convert(screen), screen_rect))
}

/// Rebuild with our `image` version; xcap re-exports its own.
fn convert(img: xcap::image::RgbaImage) -> RgbaImage {
    let (w, h) = (img.width(), img.height());
    RgbaImage::from_raw(w, h, img.into_raw()).unwrap_or_else(|| RgbaImage::new(0, 0))
}

fn crop(img: &RgbaImage, rect: Rect) -> RgbaImage {
    image::imageops::crop_imm(
        img,
        rect.left.max(0) as u32,
        rect.top.max(0) as u32,
        rect.width,
        rect.height,
    )
    .to_image()
}

/// An empty or visually uniform buffer means the content copy did not
/// reach the real surface.
fn is_degraded(img: &RgbaImage) -> bool {
    if img.width() == 0 || img.height() == 0 {
        return true;
    }
    let first = img.get_pixel(0, 0);
    img.pixels().all(|p| p == first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn uniform_buffer_is_degraded() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        assert!(is_degraded(&img));
        assert!(is_degraded(&RgbaImage::new(0, 0)));
    }

    #[test]
    fn varied_buffer_is_not_degraded() {
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        img.put_pixel(3, 3, Rgba([255, 255, 255, 255]));
        assert!(!is_degraded(&img));
    }

    #[test]
    fn crop_respects_rect() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        img.put_pixel(5, 5, Rgba([9, 9, 9, 255]));
        let out = crop(&img, Rect::new(4, 4, 3, 3));
        assert_eq!((out.width(), out.height()), (3, 3));
        assert_eq!(out.get_pixel(1, 1).0, [9, 9, 9, 255]);
    }
}
