//! Color schemes and interpolation engines.
//!
//! Jet and Hot are defined per channel (matplotlib segment data); the
//! remaining schemes are multi-stop gradients.

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Available color schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorScheme {
    /// Dark blue -> Cyan -> Yellow -> Dark red
    #[default]
    Jet,
    /// Black -> Red -> Yellow -> White
    Hot,
    /// Black -> White
    Grayscale,
    /// White -> Cyan -> Blue (water index)
    Water,
}

impl ColorScheme {
    pub const ALL: &[ColorScheme] = &[Self::Jet, Self::Hot, Self::Grayscale, Self::Water];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jet => "Jet",
            Self::Hot => "Hot",
            Self::Grayscale => "Grayscale",
            Self::Water => "Water",
        }
    }

    /// Lowercase identifier, as accepted on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Jet => "jet",
            Self::Hot => "hot",
            Self::Grayscale => "grayscale",
            Self::Water => "water",
        }
    }
}

impl std::str::FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorScheme::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown color scheme '{}' (jet, hot, grayscale, water)", s))
    }
}

// ─── Channel segments (matplotlib) ─────────────────────────────────────

const JET_RED: &[(f64, f64)] = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_GREEN: &[(f64, f64)] = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const JET_BLUE: &[(f64, f64)] = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

const HOT_RED: &[(f64, f64)] = &[(0.0, 0.0416), (0.365079, 1.0), (1.0, 1.0)];
const HOT_GREEN: &[(f64, f64)] = &[(0.0, 0.0), (0.365079, 0.0), (0.746032, 1.0), (1.0, 1.0)];
const HOT_BLUE: &[(f64, f64)] = &[(0.0, 0.0), (0.746032, 0.0), (1.0, 1.0)];

// ─── Color stop definitions ────────────────────────────────────────────

const WATER_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 240, 249, 255),
    ColorStop::new(0.25, 186, 228, 250),
    ColorStop::new(0.50, 80, 180, 230),
    ColorStop::new(0.75, 30, 120, 200),
    ColorStop::new(1.00, 8, 48, 107),
];

// ─── Interpolation engines ─────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    if t <= 0.0 {
        return stops[0].color;
    }
    if t >= 1.0 {
        return stops[stops.len() - 1].color;
    }
    for i in 1..stops.len() {
        if t <= stops[i].t {
            let ratio = (t - stops[i - 1].t) / (stops[i].t - stops[i - 1].t);
            return lerp_color(stops[i - 1].color, stops[i].color, ratio);
        }
    }
    stops[stops.len() - 1].color
}

/// Piecewise-linear intensity in [0, 1] for one channel
fn segment(points: &[(f64, f64)], t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    for w in points.windows(2) {
        let (t0, v0) = w[0];
        let (t1, v1) = w[1];
        if t <= t1 {
            return lerp(v0, v1, (t - t0) / (t1 - t0));
        }
    }
    points.last().map_or(0.0, |&(_, v)| v)
}

fn segmented(red: &[(f64, f64)], green: &[(f64, f64)], blue: &[(f64, f64)], t: f64) -> Rgb {
    let to_u8 = |v: f64| (v * 255.0).round() as u8;
    Rgb::new(
        to_u8(segment(red, t)),
        to_u8(segment(green, t)),
        to_u8(segment(blue, t)),
    )
}

/// Evaluate a color scheme at normalized position `t` ∈ [0, 1].
///
/// Values outside the interval are clamped to the end colors.
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::Jet => segmented(JET_RED, JET_GREEN, JET_BLUE, t),
        ColorScheme::Hot => segmented(HOT_RED, HOT_GREEN, HOT_BLUE, t),
        ColorScheme::Grayscale => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
        ColorScheme::Water => multi_stop(WATER_STOPS, t),
    }
}
