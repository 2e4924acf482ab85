//! Splits a snapshot into the pages the kiosk rotates through.
//! Pure functions only, rendering lives in `render`.
use super::models::{
    doctor_model::{DoctorRecord, Snapshot},
    settings_model::DisplayMode,
};

pub const GRID_ROWS: usize = 4;
pub const GRID_COLS: usize = 4;
pub const PAGE_CAPACITY: usize = GRID_ROWS * GRID_COLS;
/// Specialties up to this size share pages in exclusive-multirow mode.
pub const SMALL_SPECIALTY_MAX: usize = 4;
pub const FALLBACK_SPECIALTY: &str = "General";

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub title: Option<String>,
    pub doctors: Vec<DoctorRecord>,
    pub profile: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Slide {
    pub blocks: Vec<Block>,
}

impl Slide {
    pub fn doctor_count(&self) -> usize {
        self.blocks.iter().map(|block| block.doctors.len()).sum()
    }

    pub fn doctors(&self) -> impl Iterator<Item = &DoctorRecord> {
        self.blocks.iter().flat_map(|block| block.doctors.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub doctors: Vec<DoctorRecord>,
}

/// Which statuses are allowed on screen. Empty means everyone.
#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    allowed: Vec<String>,
}

impl StatusFilter {
    pub fn new(allowed: &[String]) -> Self {
        Self {
            allowed: allowed.iter().map(|s| s.trim().to_uppercase()).collect(),
        }
    }

    pub fn admits(&self, doctor: &DoctorRecord) -> bool {
        self.allowed.is_empty()
            || self
                .allowed
                .iter()
                .any(|status| *status == doctor.effective_status().to_uppercase())
    }
}

/// Groups doctors by specialty: listed specialties first, in `specialty_order`,
/// then the unlisted ones in order of first appearance. Empty groups are dropped.
pub fn build_sections(snapshot: &Snapshot, filter: &StatusFilter) -> Vec<Section> {
    let mut sections = snapshot
        .specialty_order
        .iter()
        .map(|title| Section {
            title: title.clone(),
            doctors: Vec::new(),
        })
        .collect::<Vec<_>>();

    for doctor in snapshot.doctors.iter().filter(|d| filter.admits(d)) {
        let specialty = doctor
            .specialty
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(FALLBACK_SPECIALTY);
        match sections.iter_mut().find(|section| section.title == specialty) {
            Some(section) => section.doctors.push(doctor.clone()),
            None => sections.push(Section {
                title: specialty.to_owned(),
                doctors: vec![doctor.clone()],
            }),
        }
    }

    sections.retain(|section| !section.doctors.is_empty());
    sections
}

fn titled_pages(section: &Section) -> Vec<Slide> {
    section
        .doctors
        .chunks(PAGE_CAPACITY)
        .map(|chunk| Slide {
            blocks: vec![Block {
                title: Some(section.title.clone()),
                doctors: chunk.to_vec(),
                profile: false,
            }],
        })
        .collect()
}

/* fills shared pages up to capacity, splitting a section over a page break when needed */
fn packed_pages<'a>(sections: impl Iterator<Item = &'a Section>) -> Vec<Slide> {
    let mut slides = Vec::new();
    let mut current = Slide::default();
    let mut used = 0;

    for section in sections {
        let mut remaining = section.doctors.as_slice();
        while !remaining.is_empty() {
            if used == PAGE_CAPACITY {
                slides.push(std::mem::take(&mut current));
                used = 0;
            }
            let take = remaining.len().min(PAGE_CAPACITY - used);
            current.blocks.push(Block {
                title: Some(section.title.clone()),
                doctors: remaining[..take].to_vec(),
                profile: false,
            });
            used += take;
            remaining = &remaining[take..];
        }
    }

    if used > 0 {
        slides.push(current);
    }
    slides
}

pub fn plan_slides(snapshot: &Snapshot, mode: DisplayMode, filter: &StatusFilter) -> Vec<Slide> {
    let sections = build_sections(snapshot, filter);

    match mode {
        DisplayMode::Profile => sections
            .iter()
            .flat_map(|section| section.doctors.iter())
            .map(|doctor| Slide {
                blocks: vec![Block {
                    title: None,
                    doctors: vec![doctor.clone()],
                    profile: true,
                }],
            })
            .collect(),
        DisplayMode::Flat => sections
            .iter()
            .flat_map(|section| section.doctors.iter().cloned())
            .collect::<Vec<_>>()
            .chunks(PAGE_CAPACITY)
            .map(|chunk| Slide {
                blocks: vec![Block {
                    title: None,
                    doctors: chunk.to_vec(),
                    profile: false,
                }],
            })
            .collect(),
        DisplayMode::PerSpecialty => sections.iter().flat_map(titled_pages).collect(),
        DisplayMode::ExclusiveMultirow => {
            let mut slides = sections
                .iter()
                .filter(|section| section.doctors.len() > SMALL_SPECIALTY_MAX)
                .flat_map(titled_pages)
                .collect::<Vec<_>>();
            slides.extend(packed_pages(
                sections
                    .iter()
                    .filter(|section| section.doctors.len() <= SMALL_SPECIALTY_MAX),
            ));
            slides
        }
        DisplayMode::Grouped => packed_pages(sections.iter()),
    }
}
