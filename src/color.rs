use anyhow::{bail, Result};

/// Color temperature at which correction is a no-op.
pub const NEUTRAL_KELVIN: u32 = 6600;

/// Blend strength toward the temperature target: 50 on a 0-100 scale, over 200.
const TEMPERATURE_STRENGTH: f64 = 50.0 / 200.0;

/// One LED color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }
}

/// HSV color: hue 0-360, saturation and value 0-1.
///
/// Values outside those ranges are rejected at construction; the conversion
/// functions below only ever produce in-range components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    hue: f64,
    sat: f64,
    val: f64,
}

impl Hsv {
    #[allow(dead_code)]
    pub fn new(hue: f64, sat: f64, val: f64) -> Result<Self> {
        if !(0.0..=360.0).contains(&hue) {
            bail!("hue {} out of range 0-360", hue);
        }
        if !(0.0..=1.0).contains(&sat) {
            bail!("saturation {} out of range 0-1", sat);
        }
        if !(0.0..=1.0).contains(&val) {
            bail!("value {} out of range 0-1", val);
        }
        Ok(Hsv { hue, sat, val })
    }

    #[allow(dead_code)]
    pub fn hue(&self) -> f64 {
        self.hue
    }

    #[allow(dead_code)]
    pub fn sat(&self) -> f64 {
        self.sat
    }

    pub fn val(&self) -> f64 {
        self.val
    }
}

fn channel(x: f64) -> u8 {
    x.clamp(0.0, 255.0).round() as u8
}

/// Convert RGB to HSV.
pub fn rgb_to_hsv(rgb: Rgb) -> Hsv {
    let r = f64::from(rgb.r) / 255.0;
    let g = f64::from(rgb.g) / 255.0;
    let b = f64::from(rgb.b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let sat = if max == 0.0 { 0.0 } else { delta / max };

    Hsv {
        hue,
        sat,
        val: max,
    }
}

/// Convert HSV back to RGB using the six 60-degree hue sectors.
pub fn hsv_to_rgb(hsv: Hsv) -> Rgb {
    let h = hsv.hue / 60.0;
    let sector = (h.floor() as u32) % 6;
    let f = h - h.floor();

    let v = hsv.val;
    let p = v * (1.0 - hsv.sat);
    let q = v * (1.0 - hsv.sat * f);
    let t = v * (1.0 - hsv.sat * (1.0 - f));

    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgb {
        r: channel(r * 255.0),
        g: channel(g * 255.0),
        b: channel(b * 255.0),
    }
}

/// Approximate the RGB color of a blackbody radiator at the given temperature.
///
/// Supports 1000K-40000K; inputs outside that range are clamped.
pub fn blackbody_rgb(kelvin: u32) -> Rgb {
    let t = (f64::from(kelvin)).clamp(1000.0, 40000.0) / 100.0;

    let red = if t <= 66.0 {
        255.0
    } else {
        329.698727446 * (t - 60.0).powf(-0.1332047592)
    };

    let green = if t <= 66.0 {
        99.4708025861 * t.ln() - 161.1195681661
    } else {
        288.1221695283 * (t - 60.0).powf(-0.0755148492)
    };

    let blue = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.5177312231 * (t - 10.0).ln() - 305.0447927307
    };

    Rgb {
        r: channel(red),
        g: channel(green),
        b: channel(blue),
    }
}

/// Shift a color's hue/saturation toward the given color temperature while
/// keeping its perceived brightness.
///
/// 6600K is neutral and returns the input unchanged. Otherwise the color is
/// blended 25% toward the blackbody target, then its HSV value channel is
/// restored to the original's so the correction never darkens or brightens
/// the picture.
pub fn adjust_temperature(color: Rgb, kelvin: u32) -> Rgb {
    if kelvin == NEUTRAL_KELVIN {
        return color;
    }

    let target = blackbody_rgb(kelvin);
    let s = TEMPERATURE_STRENGTH;
    let blended = Rgb {
        r: channel(f64::from(color.r) * (1.0 - s) + f64::from(target.r) * s),
        g: channel(f64::from(color.g) * (1.0 - s) + f64::from(target.g) * s),
        b: channel(f64::from(color.b) * (1.0 - s) + f64::from(target.b) * s),
    };

    let original = rgb_to_hsv(color);
    let mut corrected = rgb_to_hsv(blended);
    corrected.val = original.val;
    hsv_to_rgb(corrected)
}

/// Lift colors whose channel sum falls below the floor.
///
/// Pure black becomes floor/3 per channel; anything else is scaled
/// proportionally until the sum reaches the floor. Floor 0 disables the
/// boost. The floor saturates at 765 (three full channels).
pub fn apply_brightness_floor(color: Rgb, floor: u16) -> Rgb {
    let floor = floor.min(765);
    let sum = u16::from(color.r) + u16::from(color.g) + u16::from(color.b);
    if floor == 0 || sum >= floor {
        return color;
    }

    if sum == 0 {
        let level = (floor / 3) as u8;
        return Rgb {
            r: level,
            g: level,
            b: level,
        };
    }

    let scale = f64::from(floor) / f64::from(sum);
    Rgb {
        r: channel(f64::from(color.r) * scale),
        g: channel(f64::from(color.g) * scale),
        b: channel(f64::from(color.b) * scale),
    }
}

/// Move `color` a 1/duration fraction of the way toward `prev`.
///
/// Duration 0 disables the fade and returns `color` unchanged. Division is
/// truncating, matching the controller-side integer math.
pub fn transition(color: Rgb, prev: Rgb, duration: u8) -> Rgb {
    if duration == 0 {
        return color;
    }

    let d = i32::from(duration);
    let step = |c: u8, p: u8| (i32::from(c) + (i32::from(p) - i32::from(c)) / d) as u8;

    Rgb {
        r: step(color.r, prev.r),
        g: step(color.g, prev.g),
        b: step(color.b, prev.b),
    }
}
