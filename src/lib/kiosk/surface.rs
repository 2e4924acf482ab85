use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use log::{debug, info};

use super::{helpers::escape_html, render::RenderedPage};

/// A trait, necessary for every entity that will show slides to patients.
/// A transition calls `fade_out`, then after the exit delay `detach` and `mount`,
/// and `fade_in` on the following render pass.
pub trait DisplaySurface {
    fn fade_out(&mut self) -> io::Result<()>;
    fn detach(&mut self) -> io::Result<()>;
    fn mount(&mut self, page: &RenderedPage) -> io::Result<()>;
    fn fade_in(&mut self) -> io::Result<()>;
    /// Whether a page is currently on screen.
    fn is_mounted(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Entering,
    Shown,
    Exiting,
}

impl Stage {
    fn classes(&self) -> &'static str {
        match self {
            Stage::Entering => "fade-enter",
            Stage::Shown => "fade-enter fade-enter-active",
            Stage::Exiting => "fade-exit fade-exit-active",
        }
    }
}

/// Writes the current slide as a standalone HTML document that the kiosk browser keeps reloading.
pub struct HtmlFileSurface {
    path: PathBuf,
    reload_secs: u32,
    mounted: Option<(RenderedPage, Stage)>,
}

impl HtmlFileSurface {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            reload_secs: 1,
            mounted: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document(&self) -> String {
        let (body_attrs, wrapper) = match &self.mounted {
            Some((page, stage)) => {
                let resolution = page
                    .display_resolution
                    .as_deref()
                    .map(|res| format!(" data-pd-res=\"{}\"", escape_html(res)))
                    .unwrap_or_default();
                (
                    format!(
                        " class=\"{}\" data-pd-fill=\"{}\"{}",
                        escape_html(&page.body_classes.join(" ")),
                        page.fill_mode,
                        resolution
                    ),
                    format!("<div class=\"{}\">{}</div>", stage.classes(), page.html),
                )
            }
            None => (String::new(), String::new()),
        };
        format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><meta http-equiv=\"refresh\" content=\"{}\"><link rel=\"stylesheet\" href=\"/static/css/patient.css\"><title>Patient display</title></head><body{}><div id=\"patientList\">{}</div></body></html>\n",
            self.reload_secs, body_attrs, wrapper
        )
    }

    /* write then rename, so the browser never loads a half written page */
    fn flush(&self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("partial");
        fs::write(&tmp_path, self.document())?;
        fs::rename(&tmp_path, &self.path)?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }

    fn set_stage(&mut self, stage: Stage) -> io::Result<()> {
        if let Some((_, current)) = self.mounted.as_mut() {
            *current = stage;
            self.flush()?;
        }
        Ok(())
    }
}

impl DisplaySurface for HtmlFileSurface {
    fn fade_out(&mut self) -> io::Result<()> {
        self.set_stage(Stage::Exiting)
    }

    fn detach(&mut self) -> io::Result<()> {
        self.mounted = None;
        Ok(())
    }

    fn mount(&mut self, page: &RenderedPage) -> io::Result<()> {
        match page.index {
            Some(index) => info!("Showing slide {}", index + 1),
            None => info!("Nothing to show, placeholder mounted"),
        }
        self.mounted = Some((page.clone(), Stage::Entering));
        self.flush()
    }

    fn fade_in(&mut self) -> io::Result<()> {
        self.set_stage(Stage::Shown)
    }

    fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }
}
