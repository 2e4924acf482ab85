use std::{io::Cursor, time::Duration};

use chrono::NaiveDate;
use image::ImageReader;
use log::info;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::{
    errors::FetchError,
    merge::reconcile,
    models::doctor_model::{DayOverrides, DoctorsResponse, Snapshot},
};

/// A trait, necessary for every entity that will be used for getting doctors from the portal.
#[allow(async_fn_in_trait)]
pub trait DoctorSource {
    async fn get_doctors(&self) -> Result<DoctorsResponse, FetchError>;
    async fn get_day(&self, date: NaiveDate) -> Result<DayOverrides, FetchError>;
    /// Width and height of a doctor's promo poster.
    async fn get_poster_size(&self, id: &str, version: &str) -> Result<(u32, u32), FetchError>;
}

/// Talks to the portal server over HTTP.
#[derive(Clone)]
pub struct PortalClient {
    http_client: Client,
    base_url: String,
}

impl PortalClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(FetchError::ClientInit)?;
        Ok(Self::with_client(http_client, base_url))
    }

    pub fn with_client(http_client: Client, base_url: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, request_url: String) -> Result<reqwest::Response, FetchError> {
        let response = self
            .http_client
            .get(&request_url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| FetchError::RequestFailed(request_url.clone(), e))?;
        if !response.status().is_success() {
            return Err(FetchError::InvalidStatusCode(
                request_url,
                response.status(),
            ));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, request_url: String) -> Result<T, FetchError> {
        let response = self.get(request_url.clone()).await?;
        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(request_url, e))
    }
}

impl DoctorSource for PortalClient {
    async fn get_doctors(&self) -> Result<DoctorsResponse, FetchError> {
        info!("Getting doctors list");
        self.get_json(self.url("/api/doctors")).await
    }

    async fn get_day(&self, date: NaiveDate) -> Result<DayOverrides, FetchError> {
        info!("Getting schedule overrides for {}", date);
        self.get_json(self.url(&format!("/api/day?date={}", date.format("%Y-%m-%d"))))
            .await
    }

    async fn get_poster_size(&self, id: &str, version: &str) -> Result<(u32, u32), FetchError> {
        let request_url = self.url(&poster_path(id, version));
        let bytes = self
            .get(request_url.clone())
            .await?
            .bytes()
            .await
            .map_err(|e| FetchError::Decode(request_url.clone(), e))?;
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| FetchError::Image(request_url.clone(), e.into()))?
            .into_dimensions()
            .map_err(|e| FetchError::Image(request_url, e))
    }
}

pub fn photo_path(id: &str, image_version: Option<&str>) -> String {
    format!("/doctor-photo/{}?v={}", id, image_version.unwrap_or("1"))
}

pub fn poster_path(id: &str, promo_version: &str) -> String {
    format!("/doctor-promo/{}?v={}", id, promo_version)
}

/// Result of one fetch cycle: the merged snapshot and the date it was merged for.
#[derive(Debug, Clone)]
pub struct FetchedDay {
    pub date: NaiveDate,
    pub snapshot: Snapshot,
}

/// Fetches the base list and the overrides for the server's today, then merges them
/// on top of the bootstrap. Either request failing fails the whole cycle.
pub async fn fetch_snapshot<DS: DoctorSource>(
    source: &DS,
    bootstrap: &Snapshot,
    fallback_today: Option<&str>,
) -> Result<FetchedDay, FetchError> {
    let base = source.get_doctors().await?;
    let date = super::helpers::effective_today(base.today.as_deref(), fallback_today);
    let today = source.get_day(date).await?;
    info!(
        "Collected {} doctors, {} with a schedule for {}",
        base.doctors.len(),
        today.doctors.len(),
        date
    );
    Ok(FetchedDay {
        date,
        snapshot: reconcile(bootstrap, &base, &today),
    })
}
