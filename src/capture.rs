use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::color::Rgb;
use crate::led_map::LedMap;

/// Source of one raw color per LED for the current screen state.
///
/// Implementations must return exactly `map.led_count()` colors in wiring
/// order. Failures are per-cycle: the pipeline skips the cycle and retries.
pub trait FrameSource {
    fn sample(&mut self, map: &LedMap) -> Result<Vec<Rgb>>;
}

/// Samples the primary display.
pub struct ScreenSampler {
    monitor: xcap::Monitor,
}

impl ScreenSampler {
    pub fn primary() -> Result<Self> {
        let monitors = xcap::Monitor::all().context("failed to enumerate monitors")?;

        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary())
            .or_else(|| xcap::Monitor::all().ok()?.into_iter().next())
            .context("no monitors found")?;

        Ok(ScreenSampler { monitor })
    }
}

impl FrameSource for ScreenSampler {
    fn sample(&mut self, map: &LedMap) -> Result<Vec<Rgb>> {
        let image = self
            .monitor
            .capture_image()
            .context("screen capture failed")?;

        let grid = downsample(
            &DynamicImage::ImageRgba8(image),
            map.grid_width(),
            map.grid_height(),
        );
        Ok(grid_colors(&grid, map))
    }
}

/// Shrink the captured frame to the LED grid with a smooth filter, so each
/// grid pixel averages the screen region it covers.
fn downsample(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    image
        .resize_exact(width, height, FilterType::CatmullRom)
        .to_rgb8()
}

fn grid_colors(grid: &RgbImage, map: &LedMap) -> Vec<Rgb> {
    map.descriptors()
        .iter()
        .map(|led| {
            let pixel = grid.get_pixel(led.x, led.y);
            Rgb::new(pixel[0], pixel[1], pixel[2])
        })
        .collect()
}
