mod app;
mod color;
mod state;
mod ui;

use std::path::PathBuf;

use app::PhotolabApp;
use eframe::egui;

fn main() -> eframe::Result {
    env_logger::init();

    // An optional counts file on the command line is opened at start-up.
    let mut app = PhotolabApp::default();
    if let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) {
        if let Err(e) = app.state.load_counts(&path) {
            app.state.report_error(format!("{e:#}"));
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Photolab – Photon Counting & Photocurrent",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
}
