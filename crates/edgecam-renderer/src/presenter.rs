use std::time::Instant;

use edgecam_core::{CountPolicy, FrameBuffer, Resolution};
use edgecam_pipeline::{ConsumerPort, RateMonitor};
use tracing::{debug, info, warn};

use crate::{GpuTexture, RenderBackend, RendererError, TexturedQuad};

// ── Tick results ──────────────────────────────────────────────────────────────

/// How a fresh frame reached the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// First upload: texture allocated.
    Created,
    /// Dimensions changed (or a new session started): full re-specification.
    Respecified,
    /// Same dimensions: full-extent partial update.
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub upload: Option<UploadKind>,
    /// Generation of the frame uploaded this tick.
    pub generation: Option<u64>,
    /// `false` when there was nothing to draw and the surface was cleared.
    pub drew_texture: bool,
    /// Frames counted over the last second, when a report was due.
    pub reported_fps: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenterStats {
    pub ticks: u64,
    pub uploads: u64,
    pub full_uploads: u64,
    pub partial_uploads: u64,
    pub last_generation: u64,
    pub last_fps: u32,
}

// ── Presenter ─────────────────────────────────────────────────────────────────

/// Render-thread consumer: uploads the newest frame and draws it every tick.
pub struct Presenter<B: RenderBackend> {
    backend: B,
    port: ConsumerPort,
    texture: Option<GpuTexture<B::Texture>>,
    /// Set by a session change; the next upload re-specifies regardless of
    /// the recorded extents.
    revalidate: bool,
    quad: TexturedQuad,
    policy: CountPolicy,
    rate: RateMonitor,
    stats: PresenterStats,
}

impl<B: RenderBackend> Presenter<B> {
    pub fn new(backend: B, port: ConsumerPort, policy: CountPolicy, flip_vertical: bool) -> Self {
        Self {
            backend,
            port,
            texture: None,
            revalidate: false,
            quad: TexturedQuad::full_viewport(flip_vertical),
            policy,
            rate: RateMonitor::new(Instant::now()),
            stats: PresenterStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn stats(&self) -> PresenterStats {
        self.stats
    }

    /// Extents of the current texture, if one exists.
    pub fn texture_extent(&self) -> Option<Resolution> {
        self.texture.as_ref().map(|t| t.allocated)
    }

    pub fn has_consumer(&self) -> bool {
        self.port.is_attached()
    }

    /// One refresh cycle: pick up session changes, upload the newest frame
    /// if there is one, draw, and count.
    ///
    /// An upload error drops the texture and is returned; the caller must
    /// re-create the surface.
    pub fn on_draw_tick(&mut self, now: Instant) -> Result<TickOutcome, RendererError> {
        let mut outcome = TickOutcome::default();

        if self.port.poll_updates() {
            self.revalidate = true;
            self.rate.reset(now);
            debug!("Presenter: consumer changed (attached={})", self.port.is_attached());
        }

        if let Some(published) = self.port.consumer_mut().and_then(|c| c.try_consume()) {
            let result = upload(&mut self.backend, &mut self.texture, self.revalidate, published.frame);
            match result {
                Ok(kind) => {
                    self.revalidate = false;
                    self.stats.uploads += 1;
                    match kind {
                        UploadKind::Updated => self.stats.partial_uploads += 1,
                        UploadKind::Created | UploadKind::Respecified => self.stats.full_uploads += 1,
                    }
                    self.stats.last_generation = published.generation;
                    outcome.upload = Some(kind);
                    outcome.generation = Some(published.generation);
                }
                Err(e) => {
                    warn!("Presenter: texture upload failed, dropping texture: {}", e);
                    self.texture = None;
                    return Err(e);
                }
            }
        }

        match &self.texture {
            Some(texture) => {
                self.backend.draw(&texture.handle, &self.quad)?;
                outcome.drew_texture = true;
            }
            None => self.backend.clear()?,
        }

        self.stats.ticks += 1;
        match self.policy {
            CountPolicy::Ticks => self.rate.tick(),
            CountPolicy::Uploads if outcome.upload.is_some() => self.rate.tick(),
            CountPolicy::Uploads => {}
        }
        if let Some(fps) = self.rate.maybe_report(now) {
            info!("Presenter: {} fps ({:?})", fps, self.policy);
            self.stats.last_fps = fps;
            outcome.reported_fps = Some(fps);
        }
        Ok(outcome)
    }

    /// The drawable was resized.
    pub fn on_surface_changed(&mut self, viewport: Resolution) {
        debug!("Presenter: viewport {}", viewport);
        self.backend.set_viewport(viewport);
    }

    /// The drawable (and every texture on it) is gone. The next frame is
    /// uploaded into a newly created texture.
    pub fn surface_lost(&mut self) {
        if self.texture.take().is_some() {
            info!("Presenter: surface lost, texture released");
        }
    }
}

fn upload<B: RenderBackend>(
    backend: &mut B,
    texture: &mut Option<GpuTexture<B::Texture>>,
    revalidate: bool,
    frame: &FrameBuffer,
) -> Result<UploadKind, RendererError> {
    let resolution = frame.resolution();
    match texture {
        None => {
            let handle = backend.create_texture(resolution, frame.pixels())?;
            info!("Presenter: texture created at {}", resolution);
            *texture = Some(GpuTexture { allocated: resolution, handle });
            Ok(UploadKind::Created)
        }
        Some(texture) if revalidate || texture.allocated != resolution => {
            backend.respecify_texture(&mut texture.handle, resolution, frame.pixels())?;
            if texture.allocated != resolution {
                info!("Presenter: texture {} → {}", texture.allocated, resolution);
            }
            texture.allocated = resolution;
            Ok(UploadKind::Respecified)
        }
        Some(texture) => {
            backend.update_texture(&mut texture.handle, resolution, frame.pixels())?;
            Ok(UploadKind::Updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use edgecam_core::Resolution;
    use edgecam_pipeline::{consumer_channel, handoff, ConsumerUpdate, FramePublisher};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create(Resolution),
        Respecify(Resolution),
        Update(Resolution),
        Draw(u32),
        Clear,
        Viewport(Resolution),
    }

    /// Records every backend call; textures are plain ids.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<Call>,
        next_id: u32,
        fail_uploads: bool,
    }

    impl RecordingBackend {
        fn take(&mut self) -> Vec<Call> {
            std::mem::take(&mut self.calls)
        }

        fn check(&self) -> Result<(), RendererError> {
            if self.fail_uploads {
                return Err(RendererError::UploadFailed("injected".into()));
            }
            Ok(())
        }
    }

    impl RenderBackend for RecordingBackend {
        type Texture = u32;

        fn create_texture(&mut self, resolution: Resolution, _pixels: &[u8]) -> Result<u32, RendererError> {
            self.check()?;
            self.calls.push(Call::Create(resolution));
            self.next_id += 1;
            Ok(self.next_id)
        }

        fn respecify_texture(&mut self, _: &mut u32, resolution: Resolution, _: &[u8]) -> Result<(), RendererError> {
            self.check()?;
            self.calls.push(Call::Respecify(resolution));
            Ok(())
        }

        fn update_texture(&mut self, _: &mut u32, resolution: Resolution, _: &[u8]) -> Result<(), RendererError> {
            self.check()?;
            self.calls.push(Call::Update(resolution));
            Ok(())
        }

        fn draw(&mut self, texture: &u32, _quad: &TexturedQuad) -> Result<(), RendererError> {
            self.calls.push(Call::Draw(*texture));
            Ok(())
        }

        fn clear(&mut self) -> Result<(), RendererError> {
            self.calls.push(Call::Clear);
            Ok(())
        }

        fn set_viewport(&mut self, viewport: Resolution) {
            self.calls.push(Call::Viewport(viewport));
        }
    }

    fn publish(publisher: &mut FramePublisher, resolution: Resolution) -> u64 {
        let buffer = publisher.back_buffer();
        buffer.ensure_resolution(resolution);
        buffer.fill([9, 9, 9, 255]);
        publisher.publish()
    }

    struct Rig {
        presenter: Presenter<RecordingBackend>,
        tx: tokio::sync::mpsc::UnboundedSender<ConsumerUpdate>,
        t0: Instant,
    }

    fn rig(policy: CountPolicy) -> (Rig, FramePublisher) {
        let (tx, port) = consumer_channel();
        let (publisher, consumer) = handoff();
        tx.send(ConsumerUpdate::Attach(consumer)).unwrap();
        let presenter = Presenter::new(RecordingBackend::default(), port, policy, false);
        (Rig { presenter, tx, t0: Instant::now() }, publisher)
    }

    #[test]
    fn clears_until_first_frame_then_creates_texture() {
        let (mut rig, mut publisher) = rig(CountPolicy::Ticks);

        let idle = rig.presenter.on_draw_tick(rig.t0).unwrap();
        assert!(!idle.drew_texture);
        assert_eq!(rig.presenter.backend_mut().take(), vec![Call::Clear]);

        publish(&mut publisher, Resolution::HD);
        let first = rig.presenter.on_draw_tick(rig.t0).unwrap();
        // A new session forces re-specification, but there is no texture yet.
        assert_eq!(first.upload, Some(UploadKind::Created));
        assert_eq!(first.generation, Some(1));
        assert_eq!(rig.presenter.backend_mut().take(), vec![Call::Create(Resolution::HD), Call::Draw(1)]);
        assert_eq!(rig.presenter.texture_extent(), Some(Resolution::HD));
    }

    #[test]
    fn tick_without_new_frame_redraws_without_upload() {
        let (mut rig, mut publisher) = rig(CountPolicy::Ticks);
        publish(&mut publisher, Resolution::VGA);
        rig.presenter.on_draw_tick(rig.t0).unwrap();
        rig.presenter.backend_mut().take();

        let again = rig.presenter.on_draw_tick(rig.t0).unwrap();
        assert_eq!(again.upload, None);
        assert!(again.drew_texture);
        assert_eq!(rig.presenter.backend_mut().take(), vec![Call::Draw(1)]);
    }

    #[test]
    fn same_size_updates_and_new_size_respecifies() {
        let (mut rig, mut publisher) = rig(CountPolicy::Ticks);
        publish(&mut publisher, Resolution::HD);
        rig.presenter.on_draw_tick(rig.t0).unwrap();

        publish(&mut publisher, Resolution::HD);
        assert_eq!(rig.presenter.on_draw_tick(rig.t0).unwrap().upload, Some(UploadKind::Updated));

        publish(&mut publisher, Resolution::VGA);
        assert_eq!(rig.presenter.on_draw_tick(rig.t0).unwrap().upload, Some(UploadKind::Respecified));
        assert_eq!(rig.presenter.texture_extent(), Some(Resolution::VGA));

        let calls: Vec<_> = rig
            .presenter
            .backend_mut()
            .take()
            .into_iter()
            .filter(|c| !matches!(c, Call::Draw(_)))
            .collect();
        assert_eq!(
            calls,
            vec![Call::Create(Resolution::HD), Call::Update(Resolution::HD), Call::Respecify(Resolution::VGA)]
        );
        let stats = rig.presenter.stats();
        assert_eq!((stats.uploads, stats.full_uploads, stats.partial_uploads), (3, 2, 1));
        assert_eq!(stats.last_generation, 3);
    }

    #[test]
    fn new_session_revalidates_texture_and_restarts_generations() {
        let (mut rig, mut publisher) = rig(CountPolicy::Ticks);
        for _ in 0..3 {
            publish(&mut publisher, Resolution::VGA);
        }
        rig.presenter.on_draw_tick(rig.t0).unwrap();
        assert_eq!(rig.presenter.stats().last_generation, 3);

        rig.tx.send(ConsumerUpdate::Detach).unwrap();
        let detached = rig.presenter.on_draw_tick(rig.t0).unwrap();
        assert!(!rig.presenter.has_consumer());
        // The last image stays on screen.
        assert!(detached.drew_texture);

        let (mut next, consumer) = handoff();
        rig.tx.send(ConsumerUpdate::Attach(consumer)).unwrap();
        publish(&mut next, Resolution::VGA);
        let outcome = rig.presenter.on_draw_tick(rig.t0).unwrap();
        assert_eq!(outcome.generation, Some(1));
        assert_eq!(outcome.upload, Some(UploadKind::Respecified));
    }

    #[test]
    fn upload_failure_drops_texture_and_surfaces_error() {
        let (mut rig, mut publisher) = rig(CountPolicy::Ticks);
        publish(&mut publisher, Resolution::VGA);
        rig.presenter.on_draw_tick(rig.t0).unwrap();

        rig.presenter.backend_mut().fail_uploads = true;
        publish(&mut publisher, Resolution::VGA);
        let err = rig.presenter.on_draw_tick(rig.t0).unwrap_err();
        assert!(matches!(err, RendererError::UploadFailed(_)));
        assert_eq!(rig.presenter.texture_extent(), None);

        rig.presenter.backend_mut().fail_uploads = false;
        rig.presenter.backend_mut().take();
        publish(&mut publisher, Resolution::VGA);
        assert_eq!(rig.presenter.on_draw_tick(rig.t0).unwrap().upload, Some(UploadKind::Created));
    }

    #[test]
    fn surface_loss_and_resize() {
        let (mut rig, mut publisher) = rig(CountPolicy::Ticks);
        publish(&mut publisher, Resolution::VGA);
        rig.presenter.on_draw_tick(rig.t0).unwrap();

        rig.presenter.surface_lost();
        rig.presenter.on_surface_changed(Resolution::new(800, 600));
        let outcome = rig.presenter.on_draw_tick(rig.t0).unwrap();
        assert!(!outcome.drew_texture);
        let calls = rig.presenter.backend_mut().take();
        assert_eq!(&calls[calls.len() - 2..], &[Call::Viewport(Resolution::new(800, 600)), Call::Clear]);
    }

    #[test]
    fn tick_policy_counts_every_draw() {
        let (mut rig, mut publisher) = rig(CountPolicy::Ticks);
        publish(&mut publisher, Resolution::new(4, 4));
        for _ in 0..10 {
            assert_eq!(rig.presenter.on_draw_tick(rig.t0).unwrap().reported_fps, None);
        }
        let report = rig.presenter.on_draw_tick(rig.t0 + Duration::from_millis(1100)).unwrap();
        assert_eq!(report.reported_fps, Some(11));
        assert_eq!(rig.presenter.stats().last_fps, 11);
    }

    #[test]
    fn upload_policy_counts_only_new_frames() {
        let (mut rig, mut publisher) = rig(CountPolicy::Uploads);
        for _ in 0..3 {
            publish(&mut publisher, Resolution::new(4, 4));
            rig.presenter.on_draw_tick(rig.t0).unwrap();
            rig.presenter.on_draw_tick(rig.t0).unwrap();
        }
        let report = rig.presenter.on_draw_tick(rig.t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(report.reported_fps, Some(3));
    }
}
