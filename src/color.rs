use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use photolab::report::{Series, SeriesStyle};

/// Measured data is always drawn in this colour.
pub const DATA_COLOR: Color32 = Color32::LIGHT_BLUE;

// ---------------------------------------------------------------------------
// Series colours
// ---------------------------------------------------------------------------

/// `n` visually distinct colours with evenly spaced hues, starting at orange
/// so the first fit stands out against the blue data.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    (0..n)
        .map(|i| {
            let hue = 30.0 + (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

/// One colour per series: measured series (bars, points) in [`DATA_COLOR`],
/// fitted curves from the palette in order.
pub fn series_colors(series: &[Series]) -> Vec<Color32> {
    let n_fits = series
        .iter()
        .filter(|s| s.style == SeriesStyle::Line)
        .count();
    let mut palette = generate_palette(n_fits).into_iter();
    series
        .iter()
        .map(|s| match s.style {
            SeriesStyle::Line => palette.next().unwrap_or(Color32::GRAY),
            SeriesStyle::Bars { .. } | SeriesStyle::Points => DATA_COLOR,
        })
        .collect()
}
