use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// One LED's mapped screen position, in downsampled-grid coordinates.
///
/// The table order is the physical wiring order of the strip and defines
/// array indexing everywhere downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LedDescriptor {
    /// Display the LED maps to. Sampling currently reads the primary
    /// display only; the index is carried so the table format does not
    /// change when a multi-monitor sampler is added.
    #[serde(default)]
    pub display: u32,
    pub x: u32,
    pub y: u32,
}

/// The fixed, validated LED geometry table.
#[derive(Debug, Clone)]
pub struct LedMap {
    leds: Vec<LedDescriptor>,
    grid_width: u32,
    grid_height: u32,
}

impl LedMap {
    /// Build the map from the configured table. Fails on an empty table.
    pub fn new(leds: Vec<LedDescriptor>) -> Result<Self> {
        if leds.is_empty() {
            bail!("LED table is empty; at least one LED is required");
        }

        let grid_width = leds.iter().map(|led| led.x).max().unwrap_or(0) + 1;
        let grid_height = leds.iter().map(|led| led.y).max().unwrap_or(0) + 1;

        Ok(LedMap {
            leds,
            grid_width,
            grid_height,
        })
    }

    pub fn led_count(&self) -> usize {
        self.leds.len()
    }

    /// Width of the downsampled sampling grid, max(x) + 1.
    pub fn grid_width(&self) -> u32 {
        self.grid_width
    }

    /// Height of the downsampled sampling grid, max(y) + 1.
    pub fn grid_height(&self) -> u32 {
        self.grid_height
    }

    /// Descriptors in wiring order.
    pub fn descriptors(&self) -> &[LedDescriptor] {
        &self.leds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn led(x: u32, y: u32) -> LedDescriptor {
        LedDescriptor { display: 0, x, y }
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(LedMap::new(Vec::new()).is_err());
    }

    #[test]
    fn test_derived_dimensions() {
        let map = LedMap::new(vec![led(0, 0), led(3, 1), led(1, 4)]).unwrap();
        assert_eq!(map.led_count(), 3);
        assert_eq!(map.grid_width(), 4);
        assert_eq!(map.grid_height(), 5);
    }

    #[test]
    fn test_single_led_grid() {
        let map = LedMap::new(vec![led(0, 0)]).unwrap();
        assert_eq!(map.led_count(), 1);
        assert_eq!(map.grid_width(), 1);
        assert_eq!(map.grid_height(), 1);
    }

    #[test]
    fn test_wiring_order_preserved() {
        let table = vec![led(2, 0), led(0, 0), led(1, 0)];
        let map = LedMap::new(table.clone()).unwrap();
        assert_eq!(map.descriptors(), table.as_slice());
    }
}
