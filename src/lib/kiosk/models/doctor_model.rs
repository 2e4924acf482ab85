//! Module with doctor models compatible with the portal's REST API
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Breaks come either as one free-form string or as a list of ranges.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Breaks {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq, Default)]
pub struct DoctorRecord {
    #[serde(deserialize_with = "de_scalar_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaks: Option<Breaks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_version: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_scalar_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub promo_version: Option<String>,
    #[serde(default, rename = "_has_today", deserialize_with = "de_null_as_default")]
    pub has_schedule_today: bool,
}

impl DoctorRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Status as shown to filters, a missing status means the doctor still awaits a schedule.
    pub fn effective_status(&self) -> &str {
        match self.status.as_deref() {
            Some(status) if !status.trim().is_empty() => status,
            _ => "PENDING",
        }
    }
}

/// Specialty ordering plus the doctors to show.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub specialty_order: Vec<String>,
    #[serde(default)]
    pub doctors: Vec<DoctorRecord>,
}

impl Snapshot {
    /// Same snapshot with doctors ordered by name ignoring case, ties keep their position.
    pub fn sorted_by_name(&self) -> Snapshot {
        let mut doctors = self.doctors.clone();
        doctors.sort_by_cached_key(|doctor| doctor.display_name().to_lowercase());
        Snapshot {
            specialty_order: self.specialty_order.clone(),
            doctors,
        }
    }
}

/// Response of `GET /api/doctors`
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Default)]
pub struct DoctorsResponse {
    #[serde(default)]
    pub specialty_order: Vec<String>,
    #[serde(default)]
    pub doctors: Vec<DoctorRecord>,
    #[serde(default)]
    pub today: Option<String>,
}

/// Response of `GET /api/day?date=YYYY-MM-DD`, only doctors with an explicit entry for that date.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Default)]
pub struct DayOverrides {
    #[serde(default, deserialize_with = "de_null_as_default")]
    pub specialty_order: Vec<String>,
    #[serde(default)]
    pub doctors: Vec<DoctorRecord>,
    #[serde(default)]
    pub date: Option<String>,
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn de_scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(value).ok_or_else(|| serde::de::Error::custom("expected a string or a number"))
}

fn de_opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(scalar_to_string))
}

fn de_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
