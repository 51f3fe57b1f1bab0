//! Raster bar-chart renderer producing PNG attachments.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use tracing::{debug, warn};
use voicetally_core::{ChartRenderer, ChartSpec, RenderedChart, Result, VoiceTallyError};

const MARGIN_LEFT: f32 = 70.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_TOP: f32 = 70.0;
const MARGIN_BOTTOM: f32 = 90.0;
const GRID_LINES: u32 = 5;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([224, 224, 224]);
const INK: Rgb<u8> = Rgb([51, 51, 51]);

/// Fonts tried in order when no font path is configured. CJK faces come
/// first so Japanese titles and labels render.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/noto/NotoSansJP-Regular.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
];

/// Renders a [`ChartSpec`] as a PNG bar chart.
///
/// Without a font only the plot (grid, axis and bars) is drawn. Identical
/// input and font produce byte-identical output.
#[derive(Clone, Default)]
pub struct PngBarChart {
    font: Option<Font<'static>>,
}

impl std::fmt::Debug for PngBarChart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PngBarChart")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl PngBarChart {
    /// Renderer without text.
    pub fn new() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: Font<'static>) -> Self {
        Self { font: Some(font) }
    }

    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            VoiceTallyError::Render(format!("cannot read font {}: {e}", path.display()))
        })?;
        let font = Font::try_from_vec(bytes).ok_or_else(|| {
            VoiceTallyError::Render(format!("{} is not a usable font", path.display()))
        })?;
        Ok(Self::with_font(font))
    }

    /// Load the configured font, else the first system font that parses.
    pub fn discover(configured: Option<&Path>) -> Self {
        if let Some(path) = configured {
            match Self::from_font_file(path) {
                Ok(chart) => return chart,
                Err(e) => warn!(error = %e, "Configured chart font unusable, searching system fonts"),
            }
        }
        for candidate in FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            if let Ok(chart) = Self::from_font_file(path) {
                debug!(font = %candidate, "Chart font loaded");
                return chart;
            }
        }
        warn!("No chart font found; charts will be rendered without text");
        Self::new()
    }

    fn draw(&self, spec: &ChartSpec) -> RgbImage {
        let mut img = RgbImage::from_pixel(spec.width, spec.height, WHITE);
        let width = spec.width as f32;
        let height = spec.height as f32;
        let plot_w = (width - MARGIN_LEFT - MARGIN_RIGHT).max(0.0);
        let plot_h = (height - MARGIN_TOP - MARGIN_BOTTOM).max(0.0);
        let bottom = MARGIN_TOP + plot_h;
        let axis_max = nice_ceiling(spec.bars.iter().map(|b| b.hours).fold(0.0, f64::max));
        let border = Rgb([spec.color.0, spec.color.1, spec.color.2]);
        let fill = blend_on_white(border, 0.5);

        self.text_centered(&mut img, &spec.title, width / 2.0, 14.0, 20.0, INK);

        // legend
        fill_rect(&mut img, width / 2.0 - 80.0, 42.0, 30.0, 10.0, fill, Some(border));
        self.text_left(&mut img, &spec.dataset_label, width / 2.0 - 44.0, 40.0, 13.0, INK);

        for i in 0..=GRID_LINES {
            let frac = i as f32 / GRID_LINES as f32;
            let y = bottom - plot_h * frac;
            draw_line_segment_mut(&mut img, (MARGIN_LEFT, y), (MARGIN_LEFT + plot_w, y), GRID);
            let value = axis_max * f64::from(i) / f64::from(GRID_LINES);
            self.text_right(&mut img, &format!("{value:.2}"), MARGIN_LEFT - 6.0, y - 6.0, 11.0, INK);
        }
        self.text_left(&mut img, &spec.y_axis_label, 4.0, MARGIN_TOP - 22.0, 12.0, INK);

        if !spec.bars.is_empty() && plot_w > 0.0 {
            let slot = plot_w / spec.bars.len() as f32;
            let bar_w = slot * 0.7;
            for (i, bar) in spec.bars.iter().enumerate() {
                let hours = bar.hours.max(0.0);
                let bar_h = if axis_max > 0.0 {
                    (f64::from(plot_h) * hours / axis_max) as f32
                } else {
                    0.0
                };
                let x = MARGIN_LEFT + slot * i as f32 + (slot - bar_w) / 2.0;
                let y = bottom - bar_h;
                let cx = x + bar_w / 2.0;
                fill_rect(&mut img, x, y, bar_w, bar_h, fill, Some(border));
                let value = format!("{hours:.2}{}", spec.value_suffix);
                self.text_centered(&mut img, &value, cx, y - 16.0, 11.0, INK);
                let label = self.fit(&bar.label, slot - 4.0, 12.0);
                self.text_centered(&mut img, &label, cx, bottom + 6.0, 12.0, INK);
            }
        }

        draw_line_segment_mut(&mut img, (MARGIN_LEFT, bottom), (MARGIN_LEFT + plot_w, bottom), INK);
        img
    }

    fn text_left(&self, img: &mut RgbImage, text: &str, x: f32, y: f32, px: f32, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            draw_text_mut(img, color, x as i32, y as i32, Scale::uniform(px), font, text);
        }
    }

    fn text_centered(&self, img: &mut RgbImage, text: &str, cx: f32, y: f32, px: f32, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            let (w, _) = text_size(Scale::uniform(px), font, text);
            let x = cx as i32 - w / 2;
            draw_text_mut(img, color, x, y as i32, Scale::uniform(px), font, text);
        }
    }

    fn text_right(&self, img: &mut RgbImage, text: &str, right: f32, y: f32, px: f32, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            let (w, _) = text_size(Scale::uniform(px), font, text);
            draw_text_mut(img, color, right as i32 - w, y as i32, Scale::uniform(px), font, text);
        }
    }

    /// Shorten `text` with a trailing ellipsis until it fits `max_w` pixels.
    fn fit(&self, text: &str, max_w: f32, px: f32) -> String {
        let Some(font) = &self.font else {
            return text.to_string();
        };
        let fits = |s: &str| text_size(Scale::uniform(px), font, s).0 as f32 <= max_w;
        if fits(text) {
            return text.to_string();
        }
        let mut chars: Vec<char> = text.chars().collect();
        while !chars.is_empty() {
            chars.pop();
            let candidate: String = chars.iter().chain(std::iter::once(&'…')).collect();
            if fits(&candidate) {
                return candidate;
            }
        }
        String::new()
    }
}

impl ChartRenderer for PngBarChart {
    fn render(&self, spec: &ChartSpec) -> Result<RenderedChart> {
        if spec.width == 0 || spec.height == 0 {
            return Err(VoiceTallyError::Render("chart has zero size".into()));
        }
        if spec.bars.iter().any(|b| !b.hours.is_finite()) {
            return Err(VoiceTallyError::Render("non-finite bar value".into()));
        }
        let img = self.draw(spec);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| VoiceTallyError::Render(format!("png encoding failed: {e}")))?;
        Ok(RenderedChart {
            bytes,
            file_name: format!("{}.png", spec.file_stem),
            content_type: "image/png".to_string(),
        })
    }
}

/// Filled rectangle with an optional outline; sub-pixel sizes are skipped.
fn fill_rect(img: &mut RgbImage, x: f32, y: f32, w: f32, h: f32, fill: Rgb<u8>, border: Option<Rgb<u8>>) {
    let (w, h) = (w.round() as u32, h.round() as u32);
    if w == 0 || h == 0 {
        return;
    }
    let rect = Rect::at(x.round() as i32, y.round() as i32).of_size(w, h);
    draw_filled_rect_mut(img, rect, fill);
    if let Some(border) = border {
        draw_hollow_rect_mut(img, rect, border);
    }
}

fn blend_on_white(color: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |c: u8| (f32::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
    Rgb([mix(color[0]), mix(color[1]), mix(color[2])])
}

/// Round up to 1, 2 or 5 times a power of ten so ticks land on readable values.
fn nice_ceiling(max: f64) -> f64 {
    if max <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(max.log10().floor());
    let normalized = max / magnitude;
    let step = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    step * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicetally_core::{ChartBar, Rgb as ChartRgb};

    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn spec(bars: Vec<ChartBar>) -> ChartSpec {
        ChartSpec {
            title: "ボイスチャンネル使用統計".into(),
            y_axis_label: "合計時間 (時間)".into(),
            dataset_label: "Total Time (hours)".into(),
            value_suffix: "時間".into(),
            color: ChartRgb(54, 162, 235),
            width: 800,
            height: 600,
            bars,
            file_stem: "channel_stats".into(),
        }
    }

    #[test]
    fn renders_png_attachment() {
        let chart = PngBarChart::new()
            .render(&spec(vec![
                ChartBar { label: "General".into(), hours: 1.5 },
                ChartBar { label: "Games".into(), hours: 0.25 },
            ]))
            .unwrap();
        assert!(chart.bytes.starts_with(PNG_SIGNATURE));
        assert_eq!(chart.file_name, "channel_stats.png");
        assert_eq!(chart.content_type, "image/png");

        let decoded = image::load_from_memory(&chart.bytes).unwrap();
        assert_eq!(decoded.width(), 800);
        assert_eq!(decoded.height(), 600);
    }

    #[test]
    fn bars_use_the_dataset_color() {
        // One bar of 3h on a 0..5h axis spans the middle of the plot.
        let chart = PngBarChart::new()
            .render(&spec(vec![ChartBar { label: "a".into(), hours: 3.0 }]))
            .unwrap();
        let img = image::load_from_memory(&chart.bytes).unwrap().to_rgb8();
        let expected = blend_on_white(Rgb([54, 162, 235]), 0.5);
        assert_eq!(*img.get_pixel(425, 400), expected);
        assert_eq!(*img.get_pixel(5, 590), WHITE);
    }

    #[test]
    fn output_is_reproducible() {
        let s = spec(vec![ChartBar { label: "a".into(), hours: 3.0 }]);
        let first = PngBarChart::new().render(&s).unwrap();
        let second = PngBarChart::new().render(&s).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tiny_canvas_still_encodes() {
        let mut s = spec(vec![ChartBar { label: "a".into(), hours: 1.0 }]);
        s.width = 40;
        s.height = 30;
        let chart = PngBarChart::new().render(&s).unwrap();
        assert!(chart.bytes.starts_with(PNG_SIGNATURE));
    }

    #[test]
    fn rejects_degenerate_input() {
        let mut s = spec(vec![ChartBar { label: "a".into(), hours: f64::NAN }]);
        assert!(matches!(PngBarChart::new().render(&s), Err(VoiceTallyError::Render(_))));
        s.bars.clear();
        s.width = 0;
        assert!(PngBarChart::new().render(&s).is_err());
    }

    #[test]
    fn unusable_font_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ttf");
        assert!(matches!(
            PngBarChart::from_font_file(&missing),
            Err(VoiceTallyError::Render(_))
        ));
        let garbage = dir.path().join("garbage.ttf");
        std::fs::write(&garbage, b"not a font").unwrap();
        assert!(PngBarChart::from_font_file(&garbage).is_err());
    }

    #[test]
    fn nice_axis_bounds() {
        assert_eq!(nice_ceiling(0.0), 1.0);
        assert_eq!(nice_ceiling(0.3), 0.5);
        assert_eq!(nice_ceiling(7.0), 10.0);
        assert_eq!(nice_ceiling(12.0), 20.0);
        assert_eq!(nice_ceiling(20.0), 20.0);
    }
}
