//! HTML for one slide of the patient display.
use std::collections::{BTreeSet, HashMap};

use super::{
    doctor_source::{photo_path, poster_path},
    helpers::{
        escape_html, format_breaks, name_length_class, shorten_name, status_badge, to_am_pm,
    },
    models::{
        doctor_model::DoctorRecord,
        settings_model::{DisplaySettings, FillMode},
    },
    planner::{Block, Slide},
};

pub const DEFAULT_PHOTO: &str = "/static/img/default-doctor.png";
pub const NO_DATA_MESSAGE: &str = "No doctors available";
/// Gap between a narrow poster and the schedule overlay next to it.
const OVERLAY_GAP_PX: f64 = 28.0;
/// The overlay is only moved when at least this much room is left on its right.
const OVERLAY_MIN_ROOM_PX: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Parses a resolution hint such as `1920x1080`.
    pub fn parse(hint: &str) -> Option<Viewport> {
        let (width, height) = hint.trim().split_once(['x', 'X', '×'])?;
        let width = width.trim().parse().ok()?;
        let height = height.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Viewport { width, height })
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosterFit {
    Cover,
    Contain,
}

impl PosterFit {
    pub fn css_class(&self) -> &'static str {
        match self {
            PosterFit::Cover => "fit-cover-centered",
            PosterFit::Contain => "fit-contain",
        }
    }
}

/// An explicit fill mode always wins. In auto mode a very tall poster on a wide
/// screen is contained, everything else covers the screen.
pub fn choose_fit(fill_mode: FillMode, poster: (u32, u32), viewport: Viewport) -> PosterFit {
    match fill_mode {
        FillMode::Cover => PosterFit::Cover,
        FillMode::Contain => PosterFit::Contain,
        FillMode::Auto => {
            let poster_aspect = poster.0 as f64 / poster.1.max(1) as f64;
            if poster_aspect < 0.75 && viewport.aspect() >= 1.6 {
                PosterFit::Contain
            } else {
                PosterFit::Cover
            }
        }
    }
}

/// Left offset in pixels for the schedule overlay when it should sit next to the poster.
/// Only landscape screens with a poster narrower than 90% of the width qualify.
pub fn overlay_anchor(fit: PosterFit, poster: (u32, u32), viewport: Viewport) -> Option<u32> {
    let (vw, vh) = (viewport.width as f64, viewport.height as f64);
    let (pw, ph) = (poster.0.max(1) as f64, poster.1.max(1) as f64);
    let scale = match fit {
        PosterFit::Contain => (vw / pw).min(vh / ph),
        PosterFit::Cover => (vw / pw).max(vh / ph),
    };
    let width = pw * scale;
    if !viewport.is_landscape() || width >= vw * 0.9 {
        return None;
    }
    let left = (vw - width) / 2.0;
    let left_edge = left + width + OVERLAY_GAP_PX;
    (left_edge < vw - OVERLAY_MIN_ROOM_PX).then(|| left_edge.round() as u32)
}

/// Poster sizes known to the renderer: `None` marks a poster that failed to load.
pub type PosterSizes = HashMap<(String, String), Option<(u32, u32)>>;

pub struct RenderContext<'a> {
    pub settings: &'a DisplaySettings,
    pub date_header: &'a str,
    pub viewport: Viewport,
    pub highlighted: &'a BTreeSet<String>,
    pub posters: &'a PosterSizes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// Slide index, `None` for the placeholder.
    pub index: Option<usize>,
    pub html: String,
    pub body_classes: Vec<String>,
    pub fill_mode: FillMode,
    pub display_resolution: Option<String>,
}

fn info_row(label: &str, value: &str) -> String {
    format!(
        "<div class=\"info-row\"><span class=\"lbl\">{}</span><span class=\"val\">{}</span></div>",
        label,
        escape_html(value)
    )
}

fn photo_img(doctor: &DoctorRecord, class: &str) -> String {
    format!(
        "<img class=\"{}\" src=\"{}\" onerror=\"this.onerror=null;this.src='{}'\" alt=\"{}\" />",
        class,
        escape_html(&photo_path(&doctor.id, doctor.image_version.as_deref())),
        DEFAULT_PHOTO,
        escape_html(doctor.display_name())
    )
}

fn card_html(doctor: &DoctorRecord, ctx: &RenderContext) -> String {
    let settings = ctx.settings;
    let subtitle = doctor
        .designation
        .as_deref()
        .or(doctor.specialty.as_deref())
        .unwrap_or("");
    let name = shorten_name(doctor.display_name());
    let mut name_classes = vec!["nm"];
    name_classes.extend(name_length_class(&name));

    let start = match (&doctor.start_time, settings.show_start_time) {
        (Some(start_time), true) => format!(
            "<div class=\"time-pill\"><small>STARTING TIME:</small><span class=\"time\">{}</span></div>",
            escape_html(&to_am_pm(start_time))
        ),
        _ => String::new(),
    };
    let room = match (&doctor.room, settings.show_room) {
        (Some(room), true) if !room.is_empty() => format!(
            "<span class=\"chip\">Room: {}</span>",
            escape_html(&room.to_uppercase())
        ),
        _ => String::new(),
    };
    let breaks = format_breaks(doctor.breaks.as_ref());
    let breaks = if settings.show_breaks && !breaks.is_empty() {
        format!("<span class=\"chip\">Breaks: {}</span>", escape_html(&breaks))
    } else {
        String::new()
    };
    let badge = status_badge(doctor)
        .map(|(text, class)| format!("<div class=\"status-cover {}\">{}</div>", class, text))
        .unwrap_or_default();

    let mut card_classes = vec!["card".to_owned(), doctor.effective_status().to_lowercase()];
    if ctx.highlighted.contains(&doctor.id) {
        card_classes.push("status-changed".to_owned());
    }

    format!(
        "<div class=\"{}\" data-id=\"{}\"><div class=\"doc-card\">{}<div><div class=\"{}\" title=\"{}\">{}</div><div class=\"muted\">{}</div>{}<div class=\"chips\">{}{}</div></div></div>{}</div>",
        escape_html(&card_classes.join(" ")),
        escape_html(&doctor.id),
        photo_img(doctor, "avatar"),
        name_classes.join(" "),
        escape_html(doctor.display_name()),
        escape_html(&name),
        escape_html(subtitle),
        start,
        room,
        breaks,
        badge
    )
}

fn schedule_overlay(doctor: &DoctorRecord, ctx: &RenderContext, anchor: Option<u32>) -> String {
    let (position_class, position_style) = match anchor {
        Some(left) => (
            " dynamic-pos",
            format!(
                " style=\"left:{}px;right:auto;transform:translateY(-50%)\"",
                left
            ),
        ),
        None => ("", String::new()),
    };

    if !doctor.has_schedule_today {
        return format!(
            "<div class=\"schedule-overlay empty{}\"{}><div class=\"placeholder\">NO OPD SCHEDULE TODAY</div></div>",
            position_class, position_style
        );
    }

    let settings = ctx.settings;
    let mut rows = vec![
        format!(
            "<div class=\"date-header\">{}</div>",
            escape_html(ctx.date_header)
        ),
        info_row("DOCTOR", doctor.display_name()),
    ];
    if let Some(specialty) = &doctor.specialty {
        rows.push(info_row("SPECIALTY", specialty));
    }
    if let (Some(start_time), true) = (&doctor.start_time, settings.show_start_time) {
        rows.push(info_row("OPD START TIME", &to_am_pm(start_time)));
    }
    let breaks = format_breaks(doctor.breaks.as_ref());
    if settings.show_breaks && !breaks.is_empty() {
        rows.push(info_row("BREAK TIME", &breaks));
    }
    if let (Some(room), true) = (&doctor.room, settings.show_room) {
        rows.push(info_row("ROOM NO", &room.to_uppercase()));
    }
    format!(
        "<div class=\"schedule-overlay{}\"{}>{}</div>",
        position_class,
        position_style,
        rows.concat()
    )
}

/* returns the markup and the fit chosen for the poster, if one is shown */
fn profile_html(doctor: &DoctorRecord, ctx: &RenderContext) -> (String, Option<PosterFit>) {
    let poster = doctor.promo_version.as_deref().and_then(|version| {
        ctx.posters
            .get(&(doctor.id.clone(), version.to_owned()))
            .copied()
            .flatten()
            .map(|size| (version, size))
    });

    match poster {
        Some((version, size)) => {
            let fit = choose_fit(ctx.settings.fill_mode, size, ctx.viewport);
            let anchor = overlay_anchor(fit, size, ctx.viewport);
            let html = format!(
                "<div class=\"promo-slide active\"><img class=\"promo-bg\" src=\"{}\" alt=\"{}\" />{}</div>",
                escape_html(&poster_path(&doctor.id, version)),
                escape_html(doctor.display_name()),
                schedule_overlay(doctor, ctx, anchor)
            );
            (html, Some(fit))
        }
        None => {
            let designation = doctor
                .designation
                .as_deref()
                .or(doctor.specialty.as_deref())
                .unwrap_or("")
                .to_uppercase();
            let html = format!(
                "<div class=\"promo-slide active no-promo\"><div class=\"profile-slide\">{}<div class=\"profile-right\"><div class=\"profile-desig\">{}</div><div class=\"profile-name\">{}</div></div></div>{}</div>",
                photo_img(doctor, "profile-photo"),
                escape_html(&designation),
                escape_html(doctor.display_name()),
                schedule_overlay(doctor, ctx, None)
            );
            (html, None)
        }
    }
}

fn grid_html(block: &Block, ctx: &RenderContext) -> String {
    let heading = block
        .title
        .as_deref()
        .map(|title| format!("<div class=\"spec-heading\">{}</div>", escape_html(title)))
        .unwrap_or_default();
    let cards = block
        .doctors
        .iter()
        .map(|doctor| card_html(doctor, ctx))
        .collect::<String>();
    format!(
        "{}<div class=\"doctor-list four-col-grid\">{}</div>",
        heading, cards
    )
}

pub fn render_slide(slide: &Slide, index: usize, count: usize, ctx: &RenderContext) -> RenderedPage {
    let mut body = String::new();
    let mut body_classes = Vec::new();

    for block in slide.blocks.iter().filter(|block| !block.doctors.is_empty()) {
        if block.profile {
            let (html, fit) = profile_html(&block.doctors[0], ctx);
            body.push_str(&html);
            body_classes.extend(fit.map(|fit| fit.css_class().to_owned()));
        } else {
            body.push_str(&grid_html(block, ctx));
        }
    }

    let html = format!(
        "<div class=\"date-pill\">{}</div>{}<div class=\"slide-meta\">Slide {} / {}</div>",
        escape_html(ctx.date_header),
        body,
        index + 1,
        count
    );

    RenderedPage {
        index: Some(index),
        html,
        body_classes,
        fill_mode: ctx.settings.fill_mode,
        display_resolution: ctx.settings.display_resolution.clone(),
    }
}

pub fn render_placeholder(ctx: &RenderContext) -> RenderedPage {
    RenderedPage {
        index: None,
        html: format!("<div class=\"no-data\">{}</div>", NO_DATA_MESSAGE),
        body_classes: Vec::new(),
        fill_mode: ctx.settings.fill_mode,
        display_resolution: ctx.settings.display_resolution.clone(),
    }
}
