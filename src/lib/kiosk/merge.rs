use std::collections::{BTreeSet, HashMap};

use log::debug;

use super::models::doctor_model::{DayOverrides, DoctorRecord, DoctorsResponse, Snapshot};

/* Keeps insertion order while allowing lookups by id */
struct DoctorIndex {
    doctors: Vec<DoctorRecord>,
    positions: HashMap<String, usize>,
}

impl DoctorIndex {
    fn new() -> Self {
        Self {
            doctors: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn entry(&mut self, id: &str) -> &mut DoctorRecord {
        let position = match self.positions.get(id) {
            Some(&position) => position,
            None => {
                self.doctors.push(DoctorRecord {
                    id: id.to_owned(),
                    ..Default::default()
                });
                self.positions.insert(id.to_owned(), self.doctors.len() - 1);
                self.doctors.len() - 1
            }
        };
        &mut self.doctors[position]
    }
}

fn overlay<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if let Some(value) = source {
        *target = Some(value.clone());
    }
}

/* base records are complete, every field they carry wins */
fn overlay_base(target: &mut DoctorRecord, base: &DoctorRecord) {
    overlay(&mut target.name, &base.name);
    overlay(&mut target.specialty, &base.specialty);
    overlay(&mut target.designation, &base.designation);
    overlay(&mut target.room, &base.room);
    overlay(&mut target.start_time, &base.start_time);
    overlay(&mut target.breaks, &base.breaks);
    overlay(&mut target.status, &base.status);
    overlay(&mut target.status_reason, &base.status_reason);
    overlay(&mut target.image_version, &base.image_version);
    overlay(&mut target.promo_version, &base.promo_version);
}

/* only the per-date allow-list is taken from an override */
fn overlay_today(target: &mut DoctorRecord, today: &DoctorRecord) {
    overlay(&mut target.designation, &today.designation);
    overlay(&mut target.start_time, &today.start_time);
    overlay(&mut target.room, &today.room);
    overlay(&mut target.breaks, &today.breaks);
    overlay(&mut target.status, &today.status);
    overlay(&mut target.image_version, &today.image_version);
    overlay(&mut target.promo_version, &today.promo_version);
    overlay(&mut target.specialty, &today.specialty);
    overlay(&mut target.name, &today.name);
}

/// Builds the snapshot shown on screen out of the bootstrap, the base doctor list
/// and today's overrides.
///
/// Doctors without an override for today lose `start_time`, `room` and `breaks`,
/// so yesterday's values never reach the screen. Doctors known only from the
/// bootstrap are dropped, the bootstrap just fills fields the server left out.
pub fn reconcile(bootstrap: &Snapshot, base: &DoctorsResponse, today: &DayOverrides) -> Snapshot {
    let mut index = DoctorIndex::new();
    for doctor in bootstrap.doctors.iter() {
        *index.entry(&doctor.id) = doctor.clone();
    }

    let mut live_ids = BTreeSet::new();
    for doctor in base.doctors.iter() {
        overlay_base(index.entry(&doctor.id), doctor);
        live_ids.insert(doctor.id.clone());
    }

    let mut scheduled_ids = BTreeSet::new();
    for doctor in today.doctors.iter() {
        let target = index.entry(&doctor.id);
        overlay_today(target, doctor);
        target.has_schedule_today = true;
        scheduled_ids.insert(doctor.id.clone());
        live_ids.insert(doctor.id.clone());
    }

    let doctors = index
        .doctors
        .into_iter()
        .filter(|doctor| live_ids.contains(&doctor.id))
        .map(|mut doctor| {
            if !scheduled_ids.contains(&doctor.id) {
                doctor.has_schedule_today = false;
                doctor.start_time = None;
                doctor.breaks = None;
                doctor.room = None;
            }
            doctor
        })
        .collect::<Vec<_>>();

    let specialty_order = if !today.specialty_order.is_empty() {
        today.specialty_order.clone()
    } else if !base.specialty_order.is_empty() {
        base.specialty_order.clone()
    } else {
        bootstrap.specialty_order.clone()
    };

    debug!(
        "Reconciled {} doctors, {} scheduled today",
        doctors.len(),
        scheduled_ids.len()
    );

    Snapshot {
        specialty_order,
        doctors,
    }
}
