//! Palette lookup tables.
//!
//! Each palette is an analytic approximation (sixth-degree polynomial fits of
//! the matplotlib scientific maps, the Turbo polynomial, an HSL ramp, or a
//! linear ramp) sampled into a 256-entry RGB table. No palette data files.

use serde::{Deserialize, Serialize};

/// Number of entries in a [`ColorLut`].
pub const LUT_SIZE: usize = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Viridis,
    Magma,
    Inferno,
    Plasma,
    Turbo,
    Ice,
    Greyscale,
    Inverted,
}

impl Palette {
    pub const ALL: [Palette; 8] = [
        Palette::Viridis,
        Palette::Magma,
        Palette::Inferno,
        Palette::Plasma,
        Palette::Turbo,
        Palette::Ice,
        Palette::Greyscale,
        Palette::Inverted,
    ];

    /// Resolve a palette identifier. Unknown names fall back to the default palette.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "viridis" => Palette::Viridis,
            "magma" => Palette::Magma,
            "inferno" => Palette::Inferno,
            "plasma" => Palette::Plasma,
            "turbo" | "rainbow" => Palette::Turbo,
            "ice" | "icy" | "icy-blue" => Palette::Ice,
            "grey" | "gray" | "greyscale" | "grayscale" => Palette::Greyscale,
            "inverted" | "inverted-grey" | "inverted-gray" => Palette::Inverted,
            other => {
                log::debug!("unknown colormap {other:?}, using {:?}", Palette::default());
                Palette::default()
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Palette::Viridis => "viridis",
            Palette::Magma => "magma",
            Palette::Inferno => "inferno",
            Palette::Plasma => "plasma",
            Palette::Turbo => "turbo",
            Palette::Ice => "ice",
            Palette::Greyscale => "greyscale",
            Palette::Inverted => "inverted",
        }
    }

    /// Color for a normalized intensity in `[0, 1]`.
    pub fn rgb(self, t: f32) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        match self {
            Palette::Viridis => poly6(&VIRIDIS, t),
            Palette::Magma => poly6(&MAGMA, t),
            Palette::Inferno => poly6(&INFERNO, t),
            Palette::Plasma => poly6(&PLASMA, t),
            Palette::Turbo => turbo(t),
            Palette::Ice => ice(t),
            Palette::Greyscale => {
                let v = to_byte(t);
                [v, v, v]
            }
            Palette::Inverted => {
                let v = to_byte(1.0 - t);
                [v, v, v]
            }
        }
    }
}

/// 256-entry intensity → RGB table. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorLut {
    palette: Palette,
    entries: Vec<[u8; 3]>,
}

impl ColorLut {
    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }

    /// Color for a normalized intensity; out-of-range input is clamped.
    #[inline]
    pub fn apply(&self, norm: f32) -> [u8; 3] {
        let idx = (norm.clamp(0.0, 1.0) * (LUT_SIZE - 1) as f32).round() as usize;
        self.entries[idx]
    }
}

/// Build the lookup table for a named palette.
pub fn build_lut(name: &str) -> ColorLut {
    let palette = Palette::from_name(name);
    let entries = (0..LUT_SIZE)
        .map(|i| palette.rgb(i as f32 / (LUT_SIZE - 1) as f32))
        .collect();
    ColorLut { palette, entries }
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

type Poly6 = [[f32; 3]; 7];

// Least-squares fits, c0 + c1·t + … + c6·t⁶ per channel.
const VIRIDIS: Poly6 = [
    [0.277_727_33, 0.005_407_344_5, 0.334_099_8],
    [0.105_093_04, 1.404_613_5, 1.384_590_2],
    [-0.330_861_83, 0.214_847_56, 0.095_095_16],
    [-4.634_230_5, -5.799_101, -19.332_441],
    [6.228_27, 14.179_933, 56.690_55],
    [4.776_385, -13.745_145, -65.353_03],
    [-5.435_456, 4.645_852_6, 26.312_435],
];

const MAGMA: Poly6 = [
    [-0.002_136_485, -0.000_749_655_05, -0.005_386_128],
    [0.251_660_54, 0.677_523_24, 2.494_026_6],
    [8.353_717, -3.577_719_5, 0.314_467_9],
    [-27.668_733, 14.264_731, -13.649_213],
    [52.176_14, -27.943_607, 12.944_169],
    [-50.768_524, 29.046_583, 4.234_153],
    [18.655_705, -11.489_774, -5.601_961_5],
];

const INFERNO: Poly6 = [
    [0.000_218_940_37, 0.001_651_004_6, -0.019_480_899],
    [0.106_513_42, 0.563_956_4, 3.932_712_4],
    [11.602_493, -3.972_854, -15.942_394],
    [-41.703_995, 17.436_4, 44.354_145],
    [77.162_94, -33.402_36, -81.807_31],
    [-71.319_43, 32.626_064, 73.209_52],
    [25.131_126, -12.242_669, -23.070_325],
];

const PLASMA: Poly6 = [
    [0.058_732_344, 0.023_336_709, 0.543_340_2],
    [2.176_514_6, 0.238_383_42, 0.753_960_46],
    [-2.689_460_5, -7.455_851, 3.110_8],
    [6.130_348, 42.346_188, -28.518_855],
    [-11.107_436, -82.666_31, 60.139_847],
    [10.023_066, 71.413_62, -54.072_187],
    [-3.658_714, -22.931_535, 18.191_908],
];

fn poly6(c: &Poly6, t: f32) -> [u8; 3] {
    let mut out = [0u8; 3];
    for (ch, o) in out.iter_mut().enumerate() {
        let v = c.iter().rev().fold(0.0f32, |acc, coeff| acc * t + coeff[ch]);
        *o = to_byte(v);
    }
    out
}

/// Turbo rainbow, fifth-degree polynomial approximation.
fn turbo(t: f32) -> [u8; 3] {
    const R: [f32; 6] = [0.135_721_38, 4.615_392_6, -42.660_322, 132.131_08, -152.942_4, 59.286_38];
    const G: [f32; 6] = [0.091_402_61, 2.194_188_4, 4.842_966_6, -14.185_033, 4.277_298_6, 2.829_566];
    const B: [f32; 6] = [0.106_673_3, 12.641_946, -60.582_047, 110.362_77, -89.903_11, 27.348_25];
    let eval = |c: &[f32; 6]| c.iter().rev().fold(0.0f32, |acc, &k| acc * t + k);
    [to_byte(eval(&R)), to_byte(eval(&G)), to_byte(eval(&B))]
}

/// Icy blue: hue sweeps from blue toward cyan while lightness rises.
fn ice(t: f32) -> [u8; 3] {
    let h = t.mul_add(-128.0, 191.0).rem_euclid(256.0) * (360.0 / 255.0);
    let s = t.mul_add(128.0, 127.0).clamp(0.0, 255.0) / 255.0;
    let l = t;
    hsl_to_rgb(h, s, l)
}

#[allow(clippy::many_single_char_names)]
fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [u8; 3] {
    if s == 0.0 {
        let v = to_byte(l);
        return [v, v, v];
    }
    let chroma = (1.0 - 2.0f32.mul_add(l, -1.0).abs()) * s;
    let h_prime = h / 60.0;
    let x = chroma * (1.0 - (h_prime % 2.0 - 1.0).abs());
    let m = l - chroma / 2.0;
    let (r, g, b) = match h_prime as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    [to_byte(r + m), to_byte(g + m), to_byte(b + m)]
}
