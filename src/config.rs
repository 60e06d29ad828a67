use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::led_map::LedDescriptor;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub color: ColorConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    /// LED geometry table, in wiring order.
    pub leds: Vec<LedDescriptor>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// 3-character magic word used in the frame header and, followed by a
    /// newline, as the handshake string the controller must emit.
    pub magic_word: String,
    pub baud_rate: u32,
    /// How long to wait per port for the handshake.
    pub handshake_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            magic_word: "Ada".to_string(),
            baud_rate: 115_200,
            handshake_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Target color temperature in Kelvin. 6600 disables the correction.
    pub temperature_kelvin: u32,
    /// Fade divisor, clamped to 0-255. 0 disables the fade.
    pub fade_duration: u32,
    /// Minimum channel-sum brightness. 0 disables the floor.
    pub min_brightness: u16,
}

impl Default for ColorConfig {
    fn default() -> Self {
        ColorConfig {
            temperature_kelvin: 6600,
            fade_duration: 0,
            min_brightness: 0,
        }
    }
}

impl ColorConfig {
    /// Fade duration clamped into the supported 0-255 range.
    pub fn fade(&self) -> u8 {
        self.fade_duration.min(255) as u8
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    /// Edge length, in screen pixels, of one LED cell in the preview window.
    pub pixel_size: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        PreviewConfig {
            enabled: false,
            pixel_size: 20,
        }
    }
}

impl Config {
    /// Check the settings that must hold before anything is wired up and
    /// return the validated magic word bytes.
    pub fn validate(&self) -> Result<[u8; 3]> {
        if self.device.baud_rate == 0 {
            bail!("baud_rate must be greater than zero");
        }
        self.magic_bytes()
    }

    pub fn magic_bytes(&self) -> Result<[u8; 3]> {
        let word = &self.device.magic_word;
        if word.len() != 3 || !word.is_ascii() {
            bail!(
                "magic_word must be exactly 3 ASCII characters, got {:?}",
                word
            );
        }
        let bytes = word.as_bytes();
        Ok([bytes[0], bytes[1], bytes[2]])
    }
}
