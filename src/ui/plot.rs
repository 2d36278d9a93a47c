use eframe::egui::Ui;
use egui_plot::{Bar, BarChart, Line, Plot, PlotPoints, Points};

use photolab::report::SeriesStyle;

use crate::color::series_colors;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Analysis plot (central panel)
// ---------------------------------------------------------------------------

/// Render the current view's series in the central panel.
pub fn analysis_plot(ui: &mut Ui, state: &AppState) {
    let labels = match &state.labels {
        Some(l) => l,
        None => {
            ui.centered_and_justified(|ui: &mut Ui| {
                ui.heading("Open counts or a sweep to analyse  (File → Open…)");
            });
            return;
        }
    };

    ui.heading(&labels.title);
    let colors = series_colors(&state.series);

    Plot::new("analysis_plot")
        .legend(egui_plot::Legend::default())
        .x_axis_label(labels.x.as_str())
        .y_axis_label(labels.y.as_str())
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for (series, &color) in state.series.iter().zip(&colors) {
                match series.style {
                    SeriesStyle::Bars { width } => {
                        let bars = series
                            .points
                            .iter()
                            .map(|p| Bar::new(p[0], p[1]).width(width))
                            .collect();
                        plot_ui.bar_chart(BarChart::new(bars).name(&series.name).color(color));
                    }
                    SeriesStyle::Points => {
                        let points: PlotPoints = series.points.iter().copied().collect();
                        plot_ui.points(
                            Points::new(points)
                                .name(&series.name)
                                .color(color)
                                .radius(2.0),
                        );
                    }
                    SeriesStyle::Line => {
                        let points: PlotPoints = series.points.iter().copied().collect();
                        plot_ui.line(Line::new(points).name(&series.name).color(color).width(1.5));
                    }
                }
            }
        });
}
