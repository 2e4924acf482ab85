use std::{future::Future, pin::Pin, time::Duration};

use futures::{
    future::{FutureExt, LocalBoxFuture},
    stream::FuturesUnordered,
    StreamExt,
};
use log::{info, warn};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{interval_at, sleep, Instant, MissedTickBehavior, Sleep},
};

use super::{
    controller::{Effect, SlideshowController, SlideshowState, Update},
    doctor_source::{fetch_snapshot, DoctorSource, FetchedDay},
    errors::FetchError,
    events::PushEvent,
    helpers::format_date_header,
    models::{Bootstrap, Config},
    render::{render_placeholder, render_slide, PosterSizes, RenderContext, RenderedPage, Viewport},
    surface::DisplaySurface,
};

type Timer = Option<Pin<Box<Sleep>>>;

async fn expire(timer: &mut Timer) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Renders slides and drives the surface through the fade transition.
struct SlidePresenter {
    viewport: Viewport,
    transition_exit: Duration,
    posters: PosterSizes,
    exit_timer: Timer,
    pending_page: Option<RenderedPage>,
}

impl SlidePresenter {
    fn new(config: &Config) -> Self {
        Self {
            viewport: Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
            transition_exit: Duration::from_millis(config.transition_exit_ms),
            posters: PosterSizes::new(),
            exit_timer: None,
            pending_page: None,
        }
    }

    /* fetches sizes of posters on this slide that were not measured yet */
    async fn measure_posters<DS: DoctorSource>(
        &mut self,
        source: &DS,
        controller: &SlideshowController,
        index: usize,
    ) {
        let Some(slide) = controller.slides().get(index) else {
            return;
        };
        for block in slide.blocks.iter().filter(|block| block.profile) {
            for doctor in block.doctors.iter() {
                let Some(version) = doctor.promo_version.as_deref() else {
                    continue;
                };
                let key = (doctor.id.clone(), version.to_owned());
                if self.posters.contains_key(&key) {
                    continue;
                }
                let size = match source.get_poster_size(&doctor.id, version).await {
                    Ok(size) => Some(size),
                    Err(e) => {
                        warn!("Dropping poster of doctor {}: {}", doctor.id, e);
                        None
                    }
                };
                self.posters.insert(key, size);
            }
        }
    }

    async fn render<DS: DoctorSource>(
        &mut self,
        source: &DS,
        controller: &SlideshowController,
        index: Option<usize>,
    ) -> RenderedPage {
        if let Some(index) = index {
            self.measure_posters(source, controller, index).await;
        }
        let settings = controller.settings();
        let viewport = settings
            .display_resolution
            .as_deref()
            .and_then(Viewport::parse)
            .unwrap_or(self.viewport);
        let date_header = format_date_header(controller.today());
        let ctx = RenderContext {
            settings,
            date_header: &date_header,
            viewport,
            highlighted: controller.changed(),
            posters: &self.posters,
        };
        match index.and_then(|index| controller.slides().get(index).map(|slide| (index, slide))) {
            Some((index, slide)) => render_slide(slide, index, controller.slides().len(), &ctx),
            None => render_placeholder(&ctx),
        }
    }

    fn present<S: DisplaySurface>(&mut self, surface: &mut S, page: RenderedPage) {
        if self.exit_timer.is_some() {
            /* a transition is already running, the newest page wins */
            self.pending_page = Some(page);
            return;
        }
        if surface.is_mounted() {
            if let Err(e) = surface.fade_out() {
                warn!("Failed to fade out current slide: {}", e);
            }
            self.pending_page = Some(page);
            self.exit_timer = Some(Box::pin(sleep(self.transition_exit)));
            return;
        }
        Self::mount(surface, &page);
    }

    fn finish_transition<S: DisplaySurface>(&mut self, surface: &mut S) {
        self.exit_timer = None;
        if let Some(page) = self.pending_page.take() {
            if let Err(e) = surface.detach() {
                warn!("Failed to detach old slide: {}", e);
            }
            Self::mount(surface, &page);
        }
    }

    fn mount<S: DisplaySurface>(surface: &mut S, page: &RenderedPage) {
        if let Err(e) = surface.mount(page) {
            warn!("Failed to mount slide: {}", e);
            return;
        }
        if let Err(e) = surface.fade_in() {
            warn!("Failed to fade in slide: {}", e);
        }
    }
}

/// Runs the display until `shutdown` resolves, then hands the surface back.
///
/// Everything happens on this one task: fetches are polled in place and
/// every input goes through the controller before any effect is executed.
pub async fn run<DS: DoctorSource, S: DisplaySurface>(
    source: DS,
    mut surface: S,
    mut push_events: UnboundedReceiver<PushEvent>,
    bootstrap: Bootstrap,
    config: &Config,
    shutdown: impl Future<Output = ()>,
) -> S {
    let mut controller = SlideshowController::new(&bootstrap, config);
    let mut presenter = SlidePresenter::new(config);
    let source = &source;
    let mut fetches: FuturesUnordered<LocalBoxFuture<'_, (u64, Result<FetchedDay, FetchError>)>> =
        FuturesUnordered::new();
    let mut rotation: Timer = None;
    let mut debounce: Timer = None;
    let mut push_open = true;

    let refresh_period = Duration::from_secs(config.refresh_interval_secs.max(1));
    let mut refresh = interval_at(Instant::now() + refresh_period, refresh_period);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(
        "Starting patient display with {} bootstrap doctors",
        bootstrap.doctors.len()
    );
    let mut effects = controller.apply(Update::Start);

    loop {
        for effect in effects.drain(..) {
            match effect {
                Effect::Show(index) => {
                    let page = presenter.render(source, &controller, Some(index)).await;
                    presenter.present(&mut surface, page);
                }
                Effect::ShowPlaceholder => {
                    let page = presenter.render(source, &controller, None).await;
                    presenter.present(&mut surface, page);
                }
                Effect::ArmRotation(interval) => rotation = Some(Box::pin(sleep(interval))),
                Effect::DisarmRotation => rotation = None,
                Effect::Fetch { generation } => {
                    let bootstrap = controller.bootstrap().clone();
                    let fallback_today = controller.bootstrap_today().map(str::to_owned);
                    fetches.push(
                        async move {
                            let outcome =
                                fetch_snapshot(source, &bootstrap, fallback_today.as_deref()).await;
                            (generation, outcome)
                        }
                        .boxed_local(),
                    );
                }
                Effect::ScheduleRefresh(delay) => debounce = Some(Box::pin(sleep(delay))),
            }
        }

        if controller.state() == SlideshowState::Disposed {
            break;
        }

        let update = tokio::select! {
            _ = &mut shutdown => Some(Update::Dispose),
            Some((generation, outcome)) = fetches.next(), if !fetches.is_empty() => {
                Some(Update::Fetched { generation, outcome })
            }
            _ = refresh.tick() => Some(Update::RefreshRequested),
            _ = expire(&mut rotation) => {
                rotation = None;
                Some(Update::RotationTick)
            }
            _ = expire(&mut debounce) => {
                debounce = None;
                Some(Update::RefreshRequested)
            }
            _ = expire(&mut presenter.exit_timer) => {
                presenter.finish_transition(&mut surface);
                None
            }
            event = push_events.recv(), if push_open => match event {
                Some(event) => Some(Update::Push(event)),
                None => {
                    warn!("Push channel closed, relying on polling");
                    push_open = false;
                    None
                }
            },
        };

        if let Some(update) = update {
            effects = controller.apply(update);
        }
    }

    info!("Patient display stopped");
    surface
}
