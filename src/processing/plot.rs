use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::processing::error::PipelineError;
use crate::processing::view::FigureLayout;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
    pub max_points_per_trace: usize,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 500,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
            max_points_per_trace: 4000,
        }
    }
}

/// Draw a stacked channel figure: one line per trace, a faint baseline at
/// each channel's offset, channel names as y labels.
///
/// Text needs a system sans-serif font. When none can be loaded the figure
/// is redrawn without caption, axis labels or channel names.
pub fn render_figure_png(layout: &FigureLayout, style: &PlotStyle) -> Result<Vec<u8>, PipelineError> {
    if style.width == 0 || style.height == 0 {
        return Err(PipelineError::Plot(format!(
            "figure size {}x{} is empty",
            style.width, style.height
        )));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    if let Err(e) = draw_figure(&mut buffer, layout, style, true) {
        log::warn!("`{}` drawn without text: {e}", layout.title);
        draw_figure(&mut buffer, layout, style, false)?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn draw_figure(
    buffer: &mut [u8],
    layout: &FigureLayout,
    style: &PlotStyle,
    with_text: bool,
) -> Result<(), PipelineError> {
    let (x0, mut x1) = layout.x_range;
    if x1 <= x0 {
        x1 = x0 + 1.0;
    }
    let (y0, y1) = layout.y_range;
    let stride = stride_for(layout.time.len(), style.max_points_per_trace);

    let root = BitMapBackend::with_buffer(buffer, (style.width, style.height)).into_drawing_area();
    root.fill(&style.background)?;
    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40);
    if with_text {
        builder.caption(&layout.title, ("sans-serif", 20).into_font().color(&WHITE));
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;
    if with_text {
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(0)
            .x_desc(layout.x_label.as_str())
            .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
            .label_style(("sans-serif", 12).into_font().color(&WHITE))
            .axis_style(WHITE.mix(0.4))
            .light_line_style(WHITE.mix(0.1))
            .draw()?;
    }
    for tick in &layout.y_ticks {
        chart.draw_series(LineSeries::new(
            [(x0, tick.position), (x1, tick.position)],
            WHITE.mix(0.15),
        ))?;
    }
    for (idx, trace) in layout.traces.iter().enumerate() {
        let color = style.palette[idx % style.palette.len()];
        let points = layout
            .time
            .iter()
            .zip(&trace.values)
            .step_by(stride)
            .filter(|(_, v)| v.is_finite())
            .map(|(t, v)| (*t, *v));
        chart.draw_series(LineSeries::new(points, &color))?;
    }
    if with_text {
        let label_style = ("sans-serif", 12)
            .into_font()
            .color(&WHITE)
            .pos(Pos::new(HPos::Right, VPos::Center));
        for tick in &layout.y_ticks {
            if tick.position < y0 || tick.position > y1 {
                continue;
            }
            let (px, py) = chart.backend_coord(&(x0, tick.position));
            root.draw(&Text::new(tick.label.clone(), (px - 6, py), label_style.clone()))?;
        }
    }
    root.present()?;
    Ok(())
}

fn stride_for(len: usize, max_points: usize) -> usize {
    if max_points == 0 || len <= max_points {
        1
    } else {
        len.div_ceil(max_points)
    }
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PipelineError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| PipelineError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
