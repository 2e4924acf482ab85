use std::{
    collections::{BTreeMap, BTreeSet},
    error::Error,
    fs::File,
    io::BufReader,
};

use chrono::{Local, NaiveDate};
use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use log::{debug, info, warn};
use similar::TextDiff;

use super::models::{
    doctor_model::{Breaks, DoctorRecord, Snapshot},
    Args, Bootstrap, Config,
};

pub fn log_all_doctors(doctors: &[DoctorRecord]) -> () {
    for doctor in doctors.iter() {
        debug!(
            "Showing {} ({}), status {}, scheduled today: {}",
            doctor.display_name(),
            doctor.specialty.as_deref().unwrap_or("-"),
            doctor.effective_status(),
            doctor.has_schedule_today
        );
    }
}

pub fn get_bootstrap(args: &Args) -> Result<Bootstrap, Box<dyn Error>> {
    info!(
        "Reading bootstrap.json from {}",
        std::path::absolute(&args.bootstrap_json_path)?.display()
    );
    let bootstrap_file = BufReader::new(File::open(&args.bootstrap_json_path)?);
    let bootstrap: Bootstrap = serde_json::from_reader(bootstrap_file)?;
    log_all_doctors(&bootstrap.doctors);
    Ok(bootstrap)
}

pub fn get_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let config: Config = Figment::new()
        .merge(Json::file(&args.config_json_path))
        .merge(Env::prefixed("PD_"))
        .extract()?;
    info!(
        "Read config.json from {}",
        std::path::absolute(&args.config_json_path)?.display()
    );
    Ok(config)
}

/// Date used for the per-date fetch: the server's notion of today wins,
/// the kiosk's local date is only a fallback.
pub fn effective_today(server_today: Option<&str>, bootstrap_today: Option<&str>) -> NaiveDate {
    for candidate in [server_today, bootstrap_today].into_iter().flatten() {
        match NaiveDate::parse_from_str(candidate.trim(), "%Y-%m-%d") {
            Ok(date) => return date,
            Err(e) => warn!("Ignoring unparsable date {:?}: {}", candidate, e),
        }
    }
    Local::now().date_naive()
}

/// Friendly date for the slide header, like `Mon, Oct 19, 2026`.
pub fn format_date_header(date: NaiveDate) -> String {
    date.format("%a, %b %-d, %Y").to_string()
}

fn parse_hh_mm(s: &str) -> Option<(u32, &str)> {
    let (hours, minutes) = s.split_once(':')?;
    if hours.is_empty()
        || hours.len() > 2
        || minutes.len() != 2
        || !hours.chars().all(|c| c.is_ascii_digit())
        || !minutes.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    Some((hours.parse().ok()?, minutes))
}

/// `13:05` → `1:05 PM`. Anything that is not a plain `H:MM`/`HH:MM` is returned untouched.
pub fn to_am_pm(hh_mm: &str) -> String {
    let Some((hours, minutes)) = parse_hh_mm(hh_mm) else {
        return hh_mm.to_owned();
    };
    let suffix = if hours < 12 { "AM" } else { "PM" };
    let hours = match hours {
        0 => 12,
        h if h > 12 => h - 12,
        h => h,
    };
    format!("{}:{} {}", hours, minutes, suffix)
}

/* normalizes the first dash of a range, like the portal admin does */
fn normalize_first_dash(entry: &str) -> String {
    let normalized = match entry.find(['-', '–', '—']) {
        Some(position) => {
            let dash_len = entry[position..].chars().next().map_or(1, char::len_utf8);
            format!(
                "{}-{}",
                entry[..position].trim_end(),
                entry[position + dash_len..].trim_start()
            )
        }
        None => entry.to_owned(),
    };
    normalized.trim().to_owned()
}

/// `11:00-12:00` → `11:00 AM–12:00 PM`, comma separated lists are formatted piecewise.
pub fn format_break_entry(entry: &str) -> String {
    let normalized = normalize_first_dash(entry);
    let parts = normalized.split('-').collect::<Vec<_>>();
    if parts.len() == 2 {
        let (left, right) = (parts[0].trim(), parts[1].trim());
        return format!("{}–{}", to_am_pm(left), to_am_pm(right));
    }
    if normalized.contains(',') {
        return normalized
            .split(',')
            .map(|segment| format_break_entry(segment.trim()))
            .collect::<Vec<_>>()
            .join(", ");
    }
    normalized
}

pub fn format_breaks(breaks: Option<&Breaks>) -> String {
    match breaks {
        Some(Breaks::One(entry)) => format_break_entry(entry),
        Some(Breaks::Many(entries)) => entries
            .iter()
            .map(|entry| format_break_entry(entry))
            .filter(|entry| !entry.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        None => String::new(),
    }
}

/// Long names lose their `Dr.` prefix, very long ones get middle names as initials.
pub fn shorten_name(name: &str) -> String {
    let mut display_name = name.trim().to_owned();
    if display_name.chars().count() > 34 {
        let lower = display_name.to_ascii_lowercase();
        if lower.starts_with("dr.") || lower.starts_with("dr ") {
            display_name = display_name[2..]
                .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
                .to_owned();
        }
    }
    if display_name.chars().count() > 48 {
        let parts = display_name.split_whitespace().collect::<Vec<_>>();
        if parts.len() > 3 {
            let middle = parts[1..parts.len() - 1]
                .iter()
                .filter_map(|part| part.chars().next())
                .map(|initial| format!("{}.", initial.to_uppercase()))
                .collect::<Vec<_>>()
                .join(" ");
            let compressed = format!("{} {} {}", parts[0], middle, parts[parts.len() - 1]);
            if compressed.chars().count() + 3 < display_name.chars().count() {
                display_name = compressed;
            }
        }
    }
    display_name
}

pub fn name_length_class(name: &str) -> Option<&'static str> {
    match name.trim().chars().count() {
        len if len > 48 => Some("ultra-name"),
        len if len > 38 => Some("extreme-name"),
        len if len > 28 => Some("very-long-name"),
        len if len > 18 => Some("long-name"),
        _ => None,
    }
}

/// Badge text and css class for statuses that deserve one.
pub fn status_badge(doctor: &DoctorRecord) -> Option<(&'static str, &'static str)> {
    let status = doctor.effective_status().to_uppercase();
    let reason = doctor
        .status_reason
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();
    match status.as_str() {
        "PENDING" => Some(("PENDING: AWAITING SCHEDULE", "pending")),
        "SICK" | "SICK LEAVE" => Some(("SICK LEAVE", "sick")),
        "LEAVE" | "ANNUAL LEAVE" => Some(("ON LEAVE", "leave")),
        "OPD CANCELLED" | "CANCELLED" | "CANCELED" => Some(("OPD CANCELLED", "cancel")),
        "OFF_DUTY" if reason.contains("cancelled") || reason.contains("canceled") => {
            Some(("OPD CANCELLED", "cancel"))
        }
        "ON_CALL" => Some(("ON CALL", "oncall")),
        _ => None,
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/* fields whose change gets a doctor's card highlighted */
fn change_key(doctor: &DoctorRecord) -> String {
    serde_json::json!({
        "s": doctor.status,
        "st": doctor.start_time,
        "rm": doctor.room,
        "br": doctor.breaks,
        "rv": doctor.image_version,
        "rs": doctor.status_reason,
    })
    .to_string()
}

/// Ids of doctors present in both snapshots whose visible schedule data changed.
pub fn find_changed_doctors(old: &Snapshot, new: &Snapshot) -> BTreeSet<String> {
    let old_keys = old
        .doctors
        .iter()
        .map(|doctor| (doctor.id.as_str(), change_key(doctor)))
        .collect::<BTreeMap<_, _>>();

    new.doctors
        .iter()
        .filter(|doctor| {
            old_keys
                .get(doctor.id.as_str())
                .is_some_and(|old_key| *old_key != change_key(doctor))
        })
        .map(|doctor| doctor.id.clone())
        .collect()
}

/// Logs a unified diff between two snapshots, returns false when nothing changed.
pub fn log_snapshot_diff(old: &Snapshot, new: &Snapshot) -> bool {
    let (Ok(old_json), Ok(new_json)) = (
        serde_json::to_string_pretty(old),
        serde_json::to_string_pretty(new),
    ) else {
        return true;
    };
    let diff = TextDiff::from_lines(&old_json, &new_json);
    if diff.ratio() == 1.0 {
        return false;
    }
    debug!("Snapshot changed:\n{}", diff.unified_diff());
    true
}

#[cfg(test)]
#[path = "tests/tests.rs"]
mod tests;
