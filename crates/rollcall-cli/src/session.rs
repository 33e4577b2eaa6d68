//! One attendance session: capture, encode, match, record.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use rollcall_core::{EuclideanMatcher, FaceEncoder, Gallery, MatchOutcome, Matcher};
use rollcall_hw::Camera;
use rollcall_ledger::{Ledger, MarkOutcome, Recorder};
use std::collections::HashSet;

fn load_encoder(config: &Config) -> Result<FaceEncoder> {
    FaceEncoder::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )
    .context("loading face models")
}

/// Run one attendance session against the live camera.
///
/// Every face detected in the captured frames is matched independently;
/// the recorder enforces the once-per-day rule, and a session-local set
/// keeps repeats across frames from being re-announced.
pub fn run_mark(config: &Config) -> Result<()> {
    let mut encoder = load_encoder(config)?;
    let gallery = Gallery::load(&config.known_faces_dir, &mut encoder)
        .context("loading reference photos")?;

    let mut recorder = Recorder::new(
        Ledger::open(&config.attendance_file).context("opening attendance ledger")?,
    );

    let camera = Camera::open(&config.camera_device).context("opening camera")?;
    for _ in 0..config.warmup_frames {
        let _ = camera.capture_frame();
    }

    let (frames, dark_skipped) = camera
        .capture_frames(config.frames_per_session)
        .context("capturing frames")?;
    tracing::debug!(captured = frames.len(), dark_skipped, "session frames");
    if frames.is_empty() {
        bail!("no usable frames captured ({dark_skipped} dark frames discarded) — check lighting and lens");
    }

    let matcher = EuclideanMatcher;
    let mut announced: HashSet<String> = HashSet::new();
    let mut any_face = false;

    for frame in &frames {
        let faces = encoder
            .encode(&frame.data, frame.width, frame.height)
            .context("encoding captured frame")?;
        any_face |= !faces.is_empty();

        for face in &faces {
            match matcher.best_match(&face.embedding, &gallery, config.distance_threshold) {
                MatchOutcome::Match { identity, distance } => {
                    if !announced.insert(identity.roll_no.clone()) {
                        continue;
                    }
                    tracing::info!(
                        name = %identity.name,
                        roll_no = %identity.roll_no,
                        distance,
                        "face recognized"
                    );
                    let now = Local::now().naive_local();
                    match recorder.mark(&identity.name, &identity.roll_no, now)? {
                        MarkOutcome::Recorded(record) => println!(
                            "Recorded: {} (roll no {}) at {} on {}",
                            record.name, record.roll_no, record.time, record.date
                        ),
                        MarkOutcome::AlreadyMarked => println!(
                            "{} (roll no {}) is already marked present today",
                            identity.name, identity.roll_no
                        ),
                    }
                }
                MatchOutcome::NoMatch { best_distance } => {
                    tracing::debug!(?best_distance, "probe matched nobody");
                }
            }
        }
    }

    if !any_face {
        println!("No face detected in any captured frame.");
    } else if announced.is_empty() {
        println!("Face detected but not recognized — nobody was marked.");
    }

    Ok(())
}

/// Load the reference photos and list who is enrolled.
pub fn run_gallery(config: &Config) -> Result<()> {
    let mut encoder = load_encoder(config)?;
    let gallery = Gallery::load(&config.known_faces_dir, &mut encoder)
        .context("loading reference photos")?;

    println!("{} enrolled:", gallery.len());
    for identity in gallery.identities() {
        println!("  {}  {}", identity.roll_no, identity.name);
    }
    Ok(())
}

/// Print attendance rows, optionally restricted to one calendar date.
pub fn run_history(config: &Config, date: Option<NaiveDate>) -> Result<()> {
    if !config.attendance_file.exists() {
        println!(
            "No attendance recorded yet ({} does not exist).",
            config.attendance_file.display()
        );
        return Ok(());
    }

    let records = Ledger::read_records(&config.attendance_file)
        .context("reading attendance ledger")?;
    let mut shown = 0usize;
    for record in records
        .iter()
        .filter(|r| date.map_or(true, |d| r.date == d))
    {
        println!(
            "{}  {}  {}  {}",
            record.date, record.time, record.roll_no, record.name
        );
        shown += 1;
    }

    if shown == 0 {
        match date {
            Some(d) => println!("No rows for {d}."),
            None => println!("Ledger is empty."),
        }
    }
    Ok(())
}

/// List available capture devices.
pub fn run_devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
        return Ok(());
    }
    for device in devices {
        println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
    }
    Ok(())
}
