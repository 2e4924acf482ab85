use std::{collections::BTreeSet, time::Duration};

use chrono::NaiveDate;
use log::{debug, info, warn};

use super::{
    doctor_source::FetchedDay,
    errors::FetchError,
    events::PushEvent,
    helpers::{effective_today, find_changed_doctors, log_snapshot_diff},
    models::{
        doctor_model::Snapshot,
        settings_model::{DisplaySettings, SettingsPatch},
        Bootstrap, Config,
    },
    planner::{plan_slides, Slide, StatusFilter},
};

/// Everything that can happen to the display. Polling, push events and timers
/// all go through [`SlideshowController::apply`].
#[derive(Debug)]
pub enum Update {
    Start,
    RefreshRequested,
    Fetched {
        generation: u64,
        outcome: Result<FetchedDay, FetchError>,
    },
    Push(PushEvent),
    RotationTick,
    Dispose,
}

/// What the runtime has to do after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Show(usize),
    ShowPlaceholder,
    /// (Re)arm the rotation timer, replacing a running one.
    ArmRotation(Duration),
    DisarmRotation,
    Fetch { generation: u64 },
    /// Fetch after a delay, a newer request restarts the delay.
    ScheduleRefresh(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowState {
    Idle,
    Showing(usize),
    Disposed,
}

pub struct SlideshowController {
    bootstrap: Snapshot,
    bootstrap_today: Option<String>,
    snapshot: Snapshot,
    settings: DisplaySettings,
    filter: StatusFilter,
    slides: Vec<Slide>,
    state: SlideshowState,
    rotation_armed: bool,
    issued_generation: u64,
    applied_generation: u64,
    discard_stale_fetches: bool,
    push_debounce: Duration,
    today: NaiveDate,
    changed: BTreeSet<String>,
}

impl SlideshowController {
    pub fn new(bootstrap: &Bootstrap, config: &Config) -> Self {
        Self {
            bootstrap: bootstrap.snapshot(),
            bootstrap_today: bootstrap.today_iso.clone(),
            snapshot: Snapshot::default(),
            settings: DisplaySettings::from_patch(&bootstrap.patient_display),
            filter: StatusFilter::new(&config.visible_statuses),
            slides: Vec::new(),
            state: SlideshowState::Idle,
            rotation_armed: false,
            issued_generation: 0,
            applied_generation: 0,
            discard_stale_fetches: config.discard_stale_fetches,
            push_debounce: Duration::from_millis(config.push_debounce_ms),
            today: effective_today(None, bootstrap.today_iso.as_deref()),
            changed: BTreeSet::new(),
        }
    }

    pub fn apply(&mut self, update: Update) -> Vec<Effect> {
        if self.state == SlideshowState::Disposed {
            debug!("Display disposed, ignoring {:?}", update);
            return Vec::new();
        }
        match update {
            Update::Start => self.start(),
            Update::RefreshRequested => vec![self.request_fetch()],
            Update::Fetched {
                generation,
                outcome,
            } => self.on_fetched(generation, outcome),
            Update::Push(event) => self.on_push(event),
            Update::RotationTick => self.advance(),
            Update::Dispose => self.dispose(),
        }
    }

    /// First paint from the bootstrap, then ask for live data.
    pub fn start(&mut self) -> Vec<Effect> {
        let mut effects = self.load_snapshot(self.bootstrap.clone());
        effects.push(self.request_fetch());
        effects
    }

    /// Replaces the data on screen and restarts the rotation from the first page.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) -> Vec<Effect> {
        let snapshot = snapshot.sorted_by_name();
        self.changed = find_changed_doctors(&self.snapshot, &snapshot);
        if log_snapshot_diff(&self.snapshot, &snapshot) && !self.changed.is_empty() {
            info!("{} doctor(s) changed since last update", self.changed.len());
        }
        self.snapshot = snapshot;
        self.replan();
        if self.slides.is_empty() {
            self.state = SlideshowState::Idle;
            self.rotation_armed = false;
            return vec![Effect::ShowPlaceholder, Effect::DisarmRotation];
        }

        self.state = SlideshowState::Showing(0);
        let mut effects = vec![Effect::Show(0)];
        if self.slides.len() > 1 {
            self.rotation_armed = true;
            effects.push(Effect::ArmRotation(self.rotate_interval()));
        } else {
            self.rotation_armed = false;
            effects.push(Effect::DisarmRotation);
        }
        effects
    }

    /// Merges pushed settings and restarts the cycle at the first page of the last
    /// snapshot without fetching. A running rotation timer keeps its interval,
    /// a new `rotate_ms` is used from the next arm.
    pub fn set_settings(&mut self, patch: &SettingsPatch) -> Vec<Effect> {
        if self.settings.apply(patch) {
            info!(
                "Slide interval changed to {} ms, applies from the next slide",
                self.settings.rotate_ms
            );
        }
        self.changed.clear();
        self.replan();

        if self.slides.is_empty() {
            self.state = SlideshowState::Idle;
            self.rotation_armed = false;
            return vec![Effect::ShowPlaceholder, Effect::DisarmRotation];
        }

        self.state = SlideshowState::Showing(0);
        let mut effects = vec![Effect::Show(0)];
        if self.slides.len() <= 1 {
            self.rotation_armed = false;
            effects.push(Effect::DisarmRotation);
        } else if !self.rotation_armed {
            self.rotation_armed = true;
            effects.push(Effect::ArmRotation(self.rotate_interval()));
        }
        effects
    }

    /// Moves to the next page, called when the rotation timer fires.
    pub fn advance(&mut self) -> Vec<Effect> {
        self.rotation_armed = false;
        self.changed.clear();
        if self.slides.len() <= 1 {
            return vec![Effect::DisarmRotation];
        }
        let next = match self.state {
            SlideshowState::Showing(index) => (index + 1) % self.slides.len(),
            _ => 0,
        };
        self.state = SlideshowState::Showing(next);
        self.rotation_armed = true;
        vec![Effect::Show(next), Effect::ArmRotation(self.rotate_interval())]
    }

    pub fn dispose(&mut self) -> Vec<Effect> {
        info!("Stopping the slideshow");
        self.state = SlideshowState::Disposed;
        self.rotation_armed = false;
        vec![Effect::DisarmRotation]
    }

    fn request_fetch(&mut self) -> Effect {
        self.issued_generation += 1;
        Effect::Fetch {
            generation: self.issued_generation,
        }
    }

    fn on_fetched(&mut self, generation: u64, outcome: Result<FetchedDay, FetchError>) -> Vec<Effect> {
        if self.discard_stale_fetches && generation <= self.applied_generation {
            debug!(
                "Discarding fetch #{}, #{} is already applied",
                generation, self.applied_generation
            );
            return Vec::new();
        }
        match outcome {
            Ok(fetched) => {
                self.applied_generation = self.applied_generation.max(generation);
                self.today = fetched.date;
                self.load_snapshot(fetched.snapshot)
            }
            Err(e) => {
                warn!("Keeping last known doctors, fetch #{} failed: {}", generation, e);
                Vec::new()
            }
        }
    }

    fn on_push(&mut self, event: PushEvent) -> Vec<Effect> {
        match event {
            PushEvent::DoctorUpdate => vec![Effect::ScheduleRefresh(self.push_debounce)],
            PushEvent::SpecialtyOrderUpdated | PushEvent::ClosureUpdate => {
                vec![self.request_fetch()]
            }
            PushEvent::DisplaySettings(patch) => self.set_settings(&patch),
        }
    }

    fn replan(&mut self) {
        self.slides = plan_slides(&self.snapshot, self.settings.mode, &self.filter);
        debug!(
            "Planned {} slide(s) in {:?} mode",
            self.slides.len(),
            self.settings.mode
        );
    }

    fn rotate_interval(&self) -> Duration {
        Duration::from_millis(self.settings.rotate_ms)
    }

    pub fn state(&self) -> SlideshowState {
        self.state
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Doctors whose schedule changed with the last loaded snapshot.
    pub fn changed(&self) -> &BTreeSet<String> {
        &self.changed
    }

    pub fn bootstrap(&self) -> &Snapshot {
        &self.bootstrap
    }

    pub fn bootstrap_today(&self) -> Option<&str> {
        self.bootstrap_today.as_deref()
    }

    pub fn is_rotation_armed(&self) -> bool {
        self.rotation_armed
    }
}
