use std::time::Instant;

use edgecam_core::{EdgecamConfig, RenderMode, Resolution};
use edgecam_pipeline::ConsumerPort;
use edgecam_renderer::Presenter;
use egui::{Align, Color32, FontFamily, FontId, Frame, Layout, Margin, RichText, ScrollArea, Stroke, Vec2};
use tokio::sync::mpsc;
use tracing::warn;

use crate::egui_backend::EguiBackend;
use crate::session::Command;
use crate::state::{lock, Phase, SharedState};

// ── Colours ───────────────────────────────────────────────────────────────────

const BG_PANEL:  Color32 = Color32::from_rgb(28,  30,  36);
const BG_INSET:  Color32 = Color32::from_rgb(20,  22,  28);
const BG_CARD:   Color32 = Color32::from_rgb(36,  38,  46);
const ACCENT:    Color32 = Color32::from_rgb(99, 144, 255);
const TEXT_DIM:  Color32 = Color32::from_rgb(130, 135, 148);
const TEXT_NORM: Color32 = Color32::from_rgb(210, 215, 230);

// ── App struct ────────────────────────────────────────────────────────────────

pub struct EdgecamApp {
    state:        SharedState,
    commands:     mpsc::UnboundedSender<Command>,
    presenter:    Presenter<EguiBackend>,
    render_mode:  RenderMode,
    viewport:     Resolution,
    fps:          u32,
    auto_scroll_logs: bool,
}

impl EdgecamApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: &EdgecamConfig,
        port: ConsumerPort,
        state: SharedState,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill      = BG_PANEL;
        visuals.panel_fill       = BG_PANEL;
        visuals.extreme_bg_color = BG_INSET;
        visuals.faint_bg_color   = BG_CARD;
        visuals.widgets.inactive.bg_fill = BG_CARD;
        cc.egui_ctx.set_visuals(visuals);

        let backend = EguiBackend::new(cc.egui_ctx.clone());
        Self {
            state,
            commands,
            presenter: Presenter::new(backend, port, config.count_policy, config.flip_vertical),
            render_mode: config.render_mode,
            viewport: Resolution::new(0, 0),
            fps: 0,
            auto_scroll_logs: true,
        }
    }

    /// One presenter tick, painted into `ui`'s full rect.
    fn render_video(&mut self, ui: &mut egui::Ui) {
        let rect = ui.max_rect();
        let ppp = ui.ctx().pixels_per_point();
        let viewport = Resolution::new((rect.width() * ppp) as u32, (rect.height() * ppp) as u32);
        if viewport != self.viewport {
            self.viewport = viewport;
            self.presenter.on_surface_changed(viewport);
        }

        self.presenter.backend_mut().begin_frame(ui.painter().clone(), rect);
        match self.presenter.on_draw_tick(Instant::now()) {
            Ok(outcome) => {
                if let Some(fps) = outcome.reported_fps {
                    self.fps = fps;
                }
            }
            Err(e) => {
                warn!("Draw tick failed: {}", e);
                self.presenter.surface_lost();
            }
        }
    }
}

// ── eframe::App implementation ────────────────────────────────────────────────

impl eframe::App for EdgecamApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Snapshot state to avoid holding the lock across rendering
        let snap = {
            let s = lock(&self.state);
            StateSnapshot {
                phase:    s.phase.clone(),
                ingest:   s.ingest,
                sessions: s.sessions,
                logs:     s.logs.iter().cloned().collect(),
            }
        };

        egui::SidePanel::left("controls")
            .resizable(false)
            .exact_width(320.0)
            .frame(Frame::none().fill(BG_PANEL).inner_margin(Margin::same(10.0)))
            .show(ctx, |ui| {
                render_header(ui, self.render_mode);
                ui.add_space(10.0);
                render_status_card(ui, &snap.phase);
                ui.add_space(10.0);
                let stats = self.presenter.stats();
                render_stats_card(ui, &snap, self.fps, stats.uploads, self.presenter.texture_extent());
                ui.add_space(10.0);
                self.render_controls(ui, &snap.phase);
                ui.add_space(10.0);
                render_log_panel(ui, &snap.logs, &mut self.auto_scroll_logs);
            });

        egui::CentralPanel::default()
            .frame(Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| self.render_video(ui));

        if self.render_mode == RenderMode::Continuous {
            ctx.request_repaint();
        }
    }
}

impl EdgecamApp {
    fn render_controls(&mut self, ui: &mut egui::Ui, phase: &Phase) {
        ui.horizontal(|ui| {
            let active = phase.is_active();
            let start = egui::Button::new(RichText::new("Start").color(TEXT_NORM))
                .fill(BG_CARD)
                .stroke(Stroke::new(1.0, ACCENT));
            if ui.add_enabled(!active, start).clicked() {
                let _ = self.commands.send(Command::Start);
            }
            let stop = egui::Button::new(RichText::new("Stop").color(Color32::from_rgb(220, 80, 70)))
                .fill(BG_CARD)
                .stroke(Stroke::new(1.0, Color32::from_rgb(180, 60, 55)));
            if ui.add_enabled(active, stop).clicked() {
                let _ = self.commands.send(Command::Stop);
            }
        });
    }
}

// ── Rendering helpers ─────────────────────────────────────────────────────────

fn render_header(ui: &mut egui::Ui, mode: RenderMode) {
    ui.horizontal(|ui| {
        ui.label(
            RichText::new("edgecam")
                .font(FontId::new(24.0, FontFamily::Proportional))
                .strong()
                .color(Color32::WHITE),
        );
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            let badge = match mode {
                RenderMode::Continuous => "continuous",
                RenderMode::OnDemand => "on demand",
            };
            ui.label(RichText::new(badge).font(FontId::new(11.5, FontFamily::Proportional)).color(TEXT_DIM));
        });
    });
}

fn render_status_card(ui: &mut egui::Ui, phase: &Phase) {
    card(ui, |ui| {
        ui.horizontal(|ui| {
            let (rect, _) = ui.allocate_exact_size(Vec2::splat(12.0), egui::Sense::hover());
            ui.painter().circle_filled(rect.center(), 5.0, phase.color());
            ui.label(RichText::new(phase.label()).strong().color(TEXT_NORM));
        });
        let detail = match phase {
            Phase::Streaming { device, resolution } => Some((format!("{device} · {resolution}"), TEXT_DIM)),
            Phase::Stopped { reason } => Some((reason.clone(), TEXT_DIM)),
            Phase::Error(msg) => Some((msg.clone(), Color32::from_rgb(220, 100, 100))),
            Phase::Idle | Phase::Opening => None,
        };
        if let Some((text, color)) = detail {
            ui.label(RichText::new(text).color(color).font(FontId::new(12.0, FontFamily::Proportional)));
        }
    });
}

fn render_stats_card(ui: &mut egui::Ui, snap: &StateSnapshot, fps: u32, uploads: u64, texture: Option<Resolution>) {
    card(ui, |ui| {
        ui.label(RichText::new("Pipeline").color(TEXT_DIM).font(FontId::new(12.0, FontFamily::Proportional)));
        ui.add_space(6.0);
        ui.horizontal_wrapped(|ui| {
            stat_chip(ui, "FPS",       &fps.to_string());
            stat_chip(ui, "Processed", &snap.ingest.processed.to_string());
            stat_chip(ui, "Dropped",   &snap.ingest.dropped.to_string());
            stat_chip(ui, "Failed",    &snap.ingest.failed.to_string());
            stat_chip(ui, "Uploads",   &uploads.to_string());
            stat_chip(ui, "Session",   &snap.sessions.to_string());
        });
        if let Some(extent) = texture {
            ui.label(RichText::new(format!("Texture {extent}")).color(TEXT_DIM).font(FontId::new(11.5, FontFamily::Monospace)));
        }
    });
}

fn render_log_panel(ui: &mut egui::Ui, logs: &[String], auto_scroll: &mut bool) {
    ui.horizontal(|ui| {
        ui.label(RichText::new("Log").color(TEXT_DIM).font(FontId::new(12.0, FontFamily::Proportional)));
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            ui.checkbox(auto_scroll, RichText::new("auto-scroll").color(TEXT_DIM).font(FontId::new(11.5, FontFamily::Proportional)));
        });
    });
    ui.add_space(3.0);

    Frame::none()
        .fill(BG_INSET)
        .inner_margin(Margin::symmetric(8.0, 6.0))
        .stroke(Stroke::new(1.0, Color32::from_rgb(45, 48, 60)))
        .rounding(egui::Rounding::same(6.0))
        .show(ui, |ui| {
            ScrollArea::vertical()
                .id_salt("log_scroll")
                .auto_shrink([false, false])
                .stick_to_bottom(*auto_scroll)
                .show(ui, |ui| {
                    ui.set_min_width(ui.available_width());
                    for line in logs {
                        let color = if line.starts_with("[ERROR]") {
                            Color32::from_rgb(220, 80, 70)
                        } else if line.starts_with("[WARN]") {
                            Color32::from_rgb(220, 165, 50)
                        } else {
                            Color32::from_rgb(160, 170, 185)
                        };
                        ui.label(RichText::new(line).font(FontId::new(11.5, FontFamily::Monospace)).color(color));
                    }
                });
        });
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn card(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    Frame::none()
        .fill(BG_CARD)
        .inner_margin(Margin::symmetric(12.0, 10.0))
        .rounding(egui::Rounding::same(8.0))
        .stroke(Stroke::new(1.0, Color32::from_rgb(50, 53, 68)))
        .show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            add_contents(ui);
        });
}

fn stat_chip(ui: &mut egui::Ui, label: &str, value: &str) {
    Frame::none()
        .fill(BG_INSET)
        .inner_margin(Margin::symmetric(10.0, 6.0))
        .rounding(egui::Rounding::same(6.0))
        .stroke(Stroke::new(1.0, Color32::from_rgb(50, 53, 68)))
        .show(ui, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(RichText::new(value).font(FontId::new(18.0, FontFamily::Monospace)).strong().color(Color32::WHITE));
                ui.label(RichText::new(label).font(FontId::new(11.0, FontFamily::Proportional)).color(TEXT_DIM));
            });
        });
}

// ── Snapshot (to avoid holding lock during paint) ─────────────────────────────

struct StateSnapshot {
    phase:    Phase,
    ingest:   edgecam_pipeline::IngestSnapshot,
    sessions: u32,
    logs:     Vec<String>,
}
