use serde::{Deserialize, Serialize};

use crate::processing::error::PipelineError;
use crate::processing::matrix::{ChannelMetadata, SignalMatrix};
use crate::processing::plot::{render_figure_png, PlotStyle};
use crate::processing::selection::ChannelSelection;

pub const NOISY_TITLE: &str = "High-Pass Filtered EEG Signal";
pub const CORRECTED_TITLE: &str = "Corrected EEG Signal";
const X_LABEL: &str = "Time (sec)";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Vertical distance between stacked channels, in signal units.
    pub vertical_offset: f64,
    /// Produce PNG bytes; layouts are always built. Without a system
    /// sans-serif font the PNG carries traces only.
    pub rasterize: bool,
    pub width: u32,
    pub height: u32,
    /// Longer traces are strided down to this many points when drawn.
    pub max_points_per_trace: usize,
}
impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            vertical_offset: 200.0,
            rasterize: true,
            width: 1200,
            height: 500,
            max_points_per_trace: 4000,
        }
    }
}

/// One channel as drawn: samples already shifted by `offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    pub channel: String,
    pub row: usize,
    pub offset: f64,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct YTick {
    pub position: f64,
    pub label: String,
}

/// Everything needed to draw a stacked channel figure.
#[derive(Clone, Debug, PartialEq)]
pub struct FigureLayout {
    pub title: String,
    pub x_label: String,
    pub time: Vec<f64>,
    pub traces: Vec<Trace>,
    pub y_ticks: Vec<YTick>,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
}

#[derive(Clone, Debug)]
pub struct RenderedFigure {
    pub layout: FigureLayout,
    pub png: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelView {
    config: ViewConfig,
}
impl ChannelView {
    pub fn new(config: ViewConfig) -> Self {
        Self { config }
    }
    pub fn layout(
        &self,
        title: &str,
        matrix: &SignalMatrix,
        metadata: &ChannelMetadata,
        selection: &ChannelSelection,
    ) -> Result<FigureLayout, PipelineError> {
        let offset = self.config.vertical_offset;
        if !offset.is_finite() || offset < 0.0 {
            return Err(PipelineError::invalid(
                "vertical_offset",
                offset,
                "must be a non-negative finite number",
            ));
        }
        if matrix.n_channels() != metadata.len() {
            return Err(PipelineError::format(
                "channel_names",
                format!(
                    "{} names for a matrix with {} channels",
                    metadata.len(),
                    matrix.n_channels()
                ),
            ));
        }
        let rows = selection.resolve(metadata)?;
        if rows.is_empty() {
            log::warn!("no channels selected for `{title}`");
        }
        let rate = metadata.sampling_rate();
        let n = matrix.n_samples();
        let time: Vec<f64> = (0..n).map(|k| k as f64 / rate).collect();

        let mut traces = Vec::with_capacity(rows.len());
        let mut y_ticks = Vec::with_capacity(rows.len());
        for (plot_idx, &row) in rows.iter().enumerate() {
            let shift = plot_idx as f64 * offset;
            let name = metadata.names()[row].clone();
            traces.push(Trace {
                channel: name.clone(),
                row,
                offset: shift,
                values: matrix.row(row).iter().map(|v| v + shift).collect(),
            });
            y_ticks.push(YTick {
                position: shift,
                label: name,
            });
        }
        let x_range = (0.0, time.last().copied().unwrap_or(0.0));
        let y_range = value_range(&traces, offset);
        Ok(FigureLayout {
            title: title.to_string(),
            x_label: X_LABEL.to_string(),
            time,
            traces,
            y_ticks,
            x_range,
            y_range,
        })
    }
    pub fn render(
        &self,
        title: &str,
        matrix: &SignalMatrix,
        metadata: &ChannelMetadata,
        selection: &ChannelSelection,
    ) -> Result<RenderedFigure, PipelineError> {
        let layout = self.layout(title, matrix, metadata, selection)?;
        let png = if self.config.rasterize {
            let style = PlotStyle {
                width: self.config.width,
                height: self.config.height,
                max_points_per_trace: self.config.max_points_per_trace,
                ..PlotStyle::default()
            };
            Some(render_figure_png(&layout, &style)?)
        } else {
            None
        };
        Ok(RenderedFigure { layout, png })
    }
}

/// Finite extent of all traces with a 5% margin.
fn value_range(traces: &[Trace], offset: f64) -> (f64, f64) {
    let (lo, hi) = traces
        .iter()
        .flat_map(|t| t.values.iter().copied())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        let half = offset.max(1.0);
        return (-half, half);
    }
    let span = hi - lo;
    if span <= f64::EPSILON * hi.abs().max(1.0) {
        return (lo - 1.0, hi + 1.0);
    }
    (lo - 0.05 * span, hi + 0.05 * span)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (SignalMatrix, ChannelMetadata) {
        let rows = (0..3)
            .map(|c| (0..8).map(|s| (c * 10 + s) as f64).collect())
            .collect();
        let matrix = SignalMatrix::from_rows(rows).unwrap();
        let meta =
            ChannelMetadata::new(vec!["Fp1".into(), "Fp2".into(), "Cz".into()], 4.0).unwrap();
        (matrix, meta)
    }

    fn headless() -> ChannelView {
        ChannelView::new(ViewConfig {
            rasterize: false,
            ..ViewConfig::default()
        })
    }

    #[test]
    fn traces_are_offset_in_selection_order() {
        let (matrix, meta) = fixture();
        let sel = ChannelSelection::Named(vec!["Cz".into(), "Fp1".into()]);
        let fig = headless().render(NOISY_TITLE, &matrix, &meta, &sel).unwrap();
        assert!(fig.png.is_none());
        let layout = fig.layout;
        assert_eq!(layout.title, NOISY_TITLE);
        assert_eq!(layout.x_label, "Time (sec)");
        assert_eq!(layout.traces.len(), 2);
        assert_eq!(layout.traces[0].channel, "Cz");
        assert_eq!(layout.traces[0].values[0], 20.0);
        assert_eq!(layout.traces[1].channel, "Fp1");
        assert_eq!(layout.traces[1].offset, 200.0);
        assert_eq!(layout.traces[1].values[3], 203.0);
        let labels: Vec<_> = layout.y_ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["Cz", "Fp1"]);
        assert_eq!(layout.y_ticks[1].position, 200.0);
    }

    #[test]
    fn time_axis_uses_sampling_rate() {
        let (matrix, meta) = fixture();
        let layout = headless()
            .layout(CORRECTED_TITLE, &matrix, &meta, &ChannelSelection::All)
            .unwrap();
        assert_eq!(layout.time[1], 0.25);
        assert_eq!(layout.x_range, (0.0, 1.75));
        assert!(layout.y_range.0 < 0.0 && layout.y_range.1 > 417.0);
    }

    #[test]
    fn rendering_does_not_touch_the_matrix() {
        let (matrix, meta) = fixture();
        let before = matrix.clone();
        headless()
            .render(NOISY_TITLE, &matrix, &meta, &ChannelSelection::All)
            .unwrap();
        assert_eq!(matrix, before);
    }

    #[test]
    fn unknown_channel_fails_before_layout() {
        let (matrix, meta) = fixture();
        let sel = ChannelSelection::Named(vec!["Fp3".into()]);
        let err = headless().render(NOISY_TITLE, &matrix, &meta, &sel).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownChannel { .. }));
    }

    #[test]
    fn empty_selection_gives_empty_figure() {
        let (matrix, meta) = fixture();
        let layout = headless()
            .layout(NOISY_TITLE, &matrix, &meta, &ChannelSelection::Named(vec![]))
            .unwrap();
        assert!(layout.traces.is_empty());
        assert_eq!(layout.y_range, (-200.0, 200.0));
    }

    #[test]
    fn negative_offset_is_rejected() {
        let (matrix, meta) = fixture();
        let view = ChannelView::new(ViewConfig {
            vertical_offset: -1.0,
            rasterize: false,
            ..ViewConfig::default()
        });
        assert!(matches!(
            view.layout(NOISY_TITLE, &matrix, &meta, &ChannelSelection::All),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }
}
