use eframe::egui::{self, Color32, DragValue, RichText, ScrollArea, Ui};

use photolab::analysis::aggregate::count_directory;
use photolab::analysis::distribution::FittedModel;
use photolab::config::ChiSquareBasis;

use crate::state::{AppState, View};

// ---------------------------------------------------------------------------
// Left side panel – parameters and results
// ---------------------------------------------------------------------------

/// Render the left parameter panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            let mut changed = false;

            egui::CollapsingHeader::new(RichText::new("Counting").strong())
                .default_open(true)
                .show(ui, |ui: &mut Ui| {
                    let counting = &mut state.config.counting;
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Threshold (V)");
                        ui.add(DragValue::new(&mut counting.threshold).speed(1e-4));
                    });
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Upper bound");
                        changed |= ui
                            .add(DragValue::new(&mut counting.upper_bound).range(2..=1000))
                            .changed();
                    });
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Initial <n>");
                        changed |= ui
                            .add(DragValue::new(&mut counting.initial_lambda).speed(0.1))
                            .changed();
                    });
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Chi-square on");
                        egui::ComboBox::from_id_salt("chi_square_basis")
                            .selected_text(match counting.chi_square_basis {
                                ChiSquareBasis::Counts => "counts",
                                ChiSquareBasis::Frequencies => "frequencies",
                            })
                            .show_ui(ui, |ui: &mut Ui| {
                                changed |= ui
                                    .selectable_value(
                                        &mut counting.chi_square_basis,
                                        ChiSquareBasis::Counts,
                                        "counts",
                                    )
                                    .changed();
                                changed |= ui
                                    .selectable_value(
                                        &mut counting.chi_square_basis,
                                        ChiSquareBasis::Frequencies,
                                        "frequencies",
                                    )
                                    .changed();
                            });
                    });
                });

            egui::CollapsingHeader::new(RichText::new("Photocurrent").strong())
                .default_open(true)
                .show(ui, |ui: &mut Ui| {
                    let pc = &mut state.config.photocurrent;
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Trim head / tail");
                        changed |= ui.add(DragValue::new(&mut pc.trim_head)).changed();
                        changed |= ui.add(DragValue::new(&mut pc.trim_tail)).changed();
                    });
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Initial slope (A/V)");
                        changed |= ui
                            .add(DragValue::new(&mut pc.initial_guess[1]).speed(1e-11))
                            .changed();
                    });
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Initial phase (V)");
                        changed |= ui
                            .add(DragValue::new(&mut pc.initial_guess[2]).speed(0.01))
                            .changed();
                    });
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Dark samples (spectra)");
                        ui.add(DragValue::new(&mut pc.dark_samples));
                    });
                });

            if changed {
                state.refit();
            }

            ui.separator();
            results(ui, state);
        });
}

fn model_summary(ui: &mut Ui, model: &FittedModel) {
    ui.strong(model.kind.label());
    ui.label(format!("<n> = {:.4} ± {:.4}", model.lambda, model.std_error));
    ui.label(format!(
        "chi² = {:.3} ({} dof), p = {:.3e}",
        model.chi_square, model.degrees_of_freedom, model.p_value
    ));
}

fn results(ui: &mut Ui, state: &AppState) {
    ui.heading("Results");
    if let Some(fit) = &state.distribution {
        ui.label(format!(
            "{} windows in histogram, mean {:.3}",
            fit.histogram.samples,
            fit.histogram.mean()
        ));
        model_summary(ui, &fit.poisson);
        model_summary(ui, &fit.bose_einstein);
        ui.separator();
    }
    if let Some(fit) = &state.photocurrent {
        let err = fit.std_errors();
        ui.strong("Photocurrent");
        ui.label(format!("offset = {:.3e} ± {:.1e} A", fit.params.offset, err[0]));
        ui.label(format!("slope = {:.3e} ± {:.1e} A/V", fit.params.slope, err[1]));
        ui.label(format!("phase = {:.4} ± {:.1e} V", fit.params.phase, err[2]));
    }
    if state.distribution.is_none() && state.photocurrent.is_none() {
        ui.label("Nothing fitted yet.");
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open counts…").clicked() {
                open_counts_dialog(state);
                ui.close_menu();
            }
            if ui.button("Count directory…").clicked() {
                count_directory_dialog(state);
                ui.close_menu();
            }
            if ui.button("Open sweep + spectrum…").clicked() {
                open_sweep_dialog(state);
                ui.close_menu();
            }
            ui.separator();
            if ui.button("Overlay normalized sweeps…").clicked() {
                overlay_dialog(state, Overlay::Sweeps);
                ui.close_menu();
            }
            if ui.button("Overlay spectra…").clicked() {
                overlay_dialog(state, Overlay::Spectra);
                ui.close_menu();
            }
        });

        ui.separator();

        for (view, label) in [
            (View::Histogram, "Histogram"),
            (View::LogHistogram, "Log histogram"),
            (View::Photocurrent, "Photocurrent"),
            (View::Overlay, "Overlay"),
        ] {
            if ui.selectable_label(state.view == view, label).clicked() {
                state.set_view(view);
            }
        }

        ui.separator();

        if let Some((path, counts)) = &state.counts {
            ui.label(format!("{} windows from {}", counts.len(), path.display()));
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_counts_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open counts")
        .add_filter("Counts", &["csv", "txt"])
        .pick_file();

    if let Some(path) = file {
        if let Err(e) = state.load_counts(&path) {
            state.report_error(format!("{e:#}"));
        }
    }
}

pub fn count_directory_dialog(state: &mut AppState) {
    let Some(dir) = rfd::FileDialog::new()
        .set_title("Directory of stored windows")
        .pick_folder()
    else {
        return;
    };
    match count_directory(&dir, &state.config.counting) {
        Ok(counts) => state.set_counts(dir, counts),
        Err(e) => state.report_error(format!("{}: {e}", dir.display())),
    }
}

pub fn open_sweep_dialog(state: &mut AppState) {
    let Some(curve) = rfd::FileDialog::new()
        .set_title("Open photocurrent sweep")
        .pick_file()
    else {
        return;
    };
    let Some(spectrum) = rfd::FileDialog::new()
        .set_title("Open lamp spectrum")
        .pick_file()
    else {
        return;
    };
    if let Err(e) = state.load_sweep(&curve, &spectrum) {
        state.report_error(format!("{e:#}"));
    }
}

/// Directory overlays offered by the File menu.
pub enum Overlay {
    Sweeps,
    Spectra,
}

pub fn overlay_dialog(state: &mut AppState, overlay: Overlay) {
    let Some(dir) = rfd::FileDialog::new()
        .set_title("Directory to overlay")
        .pick_folder()
    else {
        return;
    };
    let result = match overlay {
        Overlay::Sweeps => state.load_sweep_overlay(&dir),
        Overlay::Spectra => state.load_spectra_overlay(&dir),
    };
    if let Err(e) = result {
        state.report_error(format!("{e:#}"));
    }
}
