use std::cell::{Cell, RefCell};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::NaiveDate;
use lib::kiosk::doctor_source::DoctorSource;
use lib::kiosk::errors::FetchError;
use lib::kiosk::events::PushEvent;
use lib::kiosk::models::doctor_model::{DayOverrides, DoctorRecord, DoctorsResponse};
use lib::kiosk::models::settings_model::{FillMode, SettingsPatch};
use lib::kiosk::models::{Bootstrap, Config};
use lib::kiosk::render::RenderedPage;
use lib::kiosk::run_tool::run;
use lib::kiosk::surface::{DisplaySurface, HtmlFileSurface};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

pub struct TestSource {
    pub doctors: Vec<DoctorRecord>,
    pub fail: bool,
    pub poster_size: (u32, u32),
    pub doctor_requests: Rc<Cell<usize>>,
}

impl TestSource {
    fn new(doctors: Vec<DoctorRecord>) -> Self {
        Self {
            doctors,
            fail: false,
            poster_size: (600, 1000),
            doctor_requests: Rc::new(Cell::new(0)),
        }
    }
}

impl DoctorSource for TestSource {
    async fn get_doctors(&self) -> Result<DoctorsResponse, FetchError> {
        self.doctor_requests.set(self.doctor_requests.get() + 1);
        if self.fail {
            return Err(FetchError::StreamEnded("test://api/doctors".to_owned()));
        }
        Ok(DoctorsResponse {
            specialty_order: vec!["Cardiology".to_owned()],
            doctors: self.doctors.clone(),
            today: Some("2026-10-19".to_owned()),
        })
    }

    async fn get_day(&self, date: NaiveDate) -> Result<DayOverrides, FetchError> {
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        Ok(DayOverrides {
            specialty_order: Vec::new(),
            doctors: self.doctors.clone(),
            date: Some("2026-10-19".to_owned()),
        })
    }

    async fn get_poster_size(&self, _id: &str, _version: &str) -> Result<(u32, u32), FetchError> {
        Ok(self.poster_size)
    }
}

// Every surface call in order, mounts also keep the time and the page
#[derive(Default)]
pub struct Recorded {
    pub calls: Vec<&'static str>,
    pub mounts: Vec<(Duration, RenderedPage)>,
}

pub struct TestSurface {
    pub started: Instant,
    pub mounted: bool,
    pub recorded: Rc<RefCell<Recorded>>,
}

impl TestSurface {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            mounted: false,
            recorded: Rc::new(RefCell::new(Recorded::default())),
        }
    }
}

impl DisplaySurface for TestSurface {
    fn fade_out(&mut self) -> io::Result<()> {
        self.recorded.borrow_mut().calls.push("fade_out");
        Ok(())
    }

    fn detach(&mut self) -> io::Result<()> {
        self.mounted = false;
        self.recorded.borrow_mut().calls.push("detach");
        Ok(())
    }

    fn mount(&mut self, page: &RenderedPage) -> io::Result<()> {
        self.mounted = true;
        let mut recorded = self.recorded.borrow_mut();
        recorded.calls.push("mount");
        recorded.mounts.push((self.started.elapsed(), page.clone()));
        Ok(())
    }

    fn fade_in(&mut self) -> io::Result<()> {
        self.recorded.borrow_mut().calls.push("fade_in");
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }
}

fn doctors(count: usize) -> Vec<DoctorRecord> {
    (0..count)
        .map(|i| DoctorRecord {
            id: format!("{}", i),
            name: Some(format!("Dr. Test {:02}", i)),
            specialty: Some("Cardiology".to_owned()),
            status: Some("AVAILABLE".to_owned()),
            start_time: Some("09:00".to_owned()),
            ..Default::default()
        })
        .collect()
}

fn bootstrap(doctors: Vec<DoctorRecord>) -> Bootstrap {
    Bootstrap {
        specialty_order: vec!["Cardiology".to_owned()],
        doctors,
        today_iso: Some("2026-10-19".to_owned()),
        ..Default::default()
    }
}

fn config() -> Config {
    Config::with_defaults("http://portal.test", PathBuf::from("patient.html"))
}

fn assert_near(actual: Duration, expected_ms: u64) {
    let actual_ms = actual.as_millis() as i128;
    assert!(
        (actual_ms - expected_ms as i128).abs() <= 5,
        "expected about {} ms, got {} ms",
        expected_ms,
        actual_ms
    );
}

#[tokio::test(start_paused = true)]
async fn settings_push_restarts_cycle_and_changes_interval_from_next_slide() {
    let source = TestSource::new(doctors(40));
    let surface = TestSurface::new();
    let recorded = surface.recorded.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    let config = config();

    /* lands while the second page is on screen */
    let script = async move {
        sleep(Duration::from_secs(13)).await;
        let patch: SettingsPatch = serde_json::from_value(json!({"rotate_ms": 5000})).unwrap();
        tx.send(PushEvent::DisplaySettings(patch)).unwrap();
    };
    let (surface, _) = tokio::join!(
        run(
            source,
            surface,
            rx,
            bootstrap(doctors(40)),
            &config,
            sleep(Duration::from_secs(30)),
        ),
        script
    );

    let recorded = recorded.borrow();
    let mounts = recorded
        .mounts
        .iter()
        .map(|(at, page)| (*at, page.index))
        .collect::<Vec<_>>();
    let indexes = mounts.iter().map(|(_, index)| *index).collect::<Vec<_>>();
    assert_eq!(
        indexes,
        vec![Some(0), Some(0), Some(1), Some(0), Some(1), Some(2)]
    );
    assert_near(mounts[0].0, 0);
    assert_near(mounts[1].0, 650);
    assert_near(mounts[2].0, 12650);
    assert_near(mounts[3].0, 13650);
    /* the timer armed at 12 s still runs its 12 s, then 5 s per slide */
    assert_near(mounts[4].0, 24650);
    assert_near(mounts[5].0, 29650);
    assert!(surface.is_mounted());
}

#[tokio::test(start_paused = true)]
async fn transition_fades_out_before_mounting() {
    let source = TestSource::new(doctors(3));
    let surface = TestSurface::new();
    let recorded = surface.recorded.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    let config = config();

    run(
        source,
        surface,
        rx,
        bootstrap(doctors(3)),
        &config,
        sleep(Duration::from_secs(2)),
    )
    .await;

    assert_eq!(
        recorded.borrow().calls,
        vec!["mount", "fade_in", "fade_out", "detach", "mount", "fade_in"]
    );
}

#[tokio::test(start_paused = true)]
async fn empty_display_shows_placeholder() {
    let source = TestSource::new(Vec::new());
    let surface = TestSurface::new();
    let recorded = surface.recorded.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    let config = config();

    run(
        source,
        surface,
        rx,
        bootstrap(Vec::new()),
        &config,
        sleep(Duration::from_secs(20)),
    )
    .await;

    let recorded = recorded.borrow();
    assert!(!recorded.mounts.is_empty());
    assert!(recorded.mounts.iter().all(|(_, page)| page.index.is_none()));
    assert!(recorded.mounts[0].1.html.contains("No doctors available"));
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_keeps_bootstrap_on_screen() {
    let mut source = TestSource::new(Vec::new());
    source.fail = true;
    let requests = source.doctor_requests.clone();
    let surface = TestSurface::new();
    let recorded = surface.recorded.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    let config = config();

    run(
        source,
        surface,
        rx,
        bootstrap(doctors(2)),
        &config,
        sleep(Duration::from_secs(250)),
    )
    .await;

    /* start, then one poll every 120 s */
    assert_eq!(requests.get(), 3);
    let recorded = recorded.borrow();
    assert_eq!(recorded.mounts.len(), 1);
    assert_eq!(recorded.mounts[0].1.index, Some(0));
}

#[tokio::test(start_paused = true)]
async fn doctor_updates_are_debounced() {
    let source = TestSource::new(doctors(2));
    let requests = source.doctor_requests.clone();
    let surface = TestSurface::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let config = config();

    let script = async move {
        sleep(Duration::from_secs(1)).await;
        for _ in 0..3 {
            tx.send(PushEvent::DoctorUpdate).unwrap();
            sleep(Duration::from_millis(50)).await;
        }
        tx.send(PushEvent::ClosureUpdate).unwrap();
        sleep(Duration::from_secs(1)).await;
        drop(tx);
    };
    tokio::join!(
        run(
            source,
            surface,
            rx,
            bootstrap(doctors(2)),
            &config,
            sleep(Duration::from_secs(5)),
        ),
        script
    );

    /* start, closure_update right away, then one debounced refresh */
    assert_eq!(requests.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn profile_slides_measure_posters() {
    let mut promoted = doctors(1);
    promoted[0].promo_version = Some("3".to_owned());
    let source = TestSource::new(promoted.clone());
    let surface = TestSurface::new();
    let recorded = surface.recorded.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    let config = config();

    let mut bootstrap = bootstrap(promoted);
    bootstrap.patient_display = serde_json::from_value(json!({"mode": "profile"})).unwrap();
    run(source, surface, rx, bootstrap, &config, sleep(Duration::from_secs(1))).await;

    let recorded = recorded.borrow();
    let page = &recorded.mounts[0].1;
    assert_eq!(page.body_classes, vec!["fit-contain"]);
    assert_eq!(page.fill_mode, FillMode::Auto);
    assert!(page.html.contains("/doctor-promo/0?v=3"));
}

#[test]
fn html_surface_writes_whole_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patient.html");
    let mut surface = HtmlFileSurface::new(&path);
    let page = RenderedPage {
        index: Some(1),
        html: "<div class=\"doctor-list\"></div>".to_owned(),
        body_classes: vec!["fit-contain".to_owned()],
        fill_mode: FillMode::Contain,
        display_resolution: Some("1920x1080".to_owned()),
    };

    assert!(!surface.is_mounted());
    surface.mount(&page).unwrap();
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("<div class=\"fade-enter\"><div class=\"doctor-list\"></div></div>"));
    assert!(written.contains("class=\"fit-contain\" data-pd-fill=\"contain\" data-pd-res=\"1920x1080\""));
    assert!(written.contains("<div id=\"patientList\">"));

    surface.fade_in().unwrap();
    assert!(fs::read_to_string(&path)
        .unwrap()
        .contains("fade-enter fade-enter-active"));
    surface.fade_out().unwrap();
    assert!(fs::read_to_string(&path)
        .unwrap()
        .contains("fade-exit fade-exit-active"));

    surface.detach().unwrap();
    assert!(!surface.is_mounted());
    assert!(!path.with_extension("partial").exists());
}
