// src/events/processor.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};

use crate::core::{ExtractResult, LogContext};
use crate::extract::{ClipOutcome, ExtractionRequest, Extractor};

use super::detections::{ClipNotes, DetectionClient};
use super::event::Event;
use super::scheduler::{EventScheduler, ScheduledEvent};

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub pre_secs: u32,
    pub post_secs: u32,
    pub poll_interval: Duration,
    /// `camera_type` → Name des Aufnahmeverzeichnisses.
    pub camera_map: HashMap<String, String>,
}

/// Consumer side of the scheduler: turns ready events into clips.
pub struct EventProcessor {
    scheduler: Arc<EventScheduler>,
    extractor: Extractor,
    detections: Option<DetectionClient>,
    settings: ProcessorSettings,
}

pub struct ProcessorHandles {
    pub dispatcher: JoinHandle<()>,
    pub worker: JoinHandle<()>,
}

impl ProcessorHandles {
    pub fn join(self) {
        if self.dispatcher.join().is_err() {
            error!("[processor] dispatcher panicked");
        }
        if self.worker.join().is_err() {
            error!("[processor] worker panicked");
        }
    }
}

impl EventProcessor {
    pub fn new(
        scheduler: Arc<EventScheduler>,
        extractor: Extractor,
        detections: Option<DetectionClient>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            scheduler,
            extractor,
            detections,
            settings,
        }
    }

    /// Directory name the event's camera records into.
    pub fn recording_camera(&self, event: &Event) -> String {
        recording_camera(&self.settings.camera_map, event)
    }

    /// Extracts the clip for one ready event and writes its notes.
    pub fn process(&self, scheduled: &ScheduledEvent) -> ExtractResult<ClipOutcome> {
        let event = &scheduled.event;
        let camera = self.recording_camera(event);
        let ctx = LogContext::new("processor", &camera).with_event(scheduled.seq);

        info!(
            "{}",
            ctx.format(&format!("processing {} (class {:?})", event.kind, event.event_class))
        );

        let request = ExtractionRequest::new(
            &camera,
            event.timestamp,
            self.settings.pre_secs,
            self.settings.post_secs,
        )
        .with_event_seq(scheduled.seq);

        let outcome = self.extractor.extract(&request)?;

        let frames = match &self.detections {
            Some(client) => {
                let (start, end) = request.window();
                client.query(&camera, start, end).unwrap_or_else(|e| {
                    warn!("{}", ctx.format(&format!("detection query failed: {}", e)));
                    Vec::new()
                })
            }
            None => Vec::new(),
        };

        let notes = ClipNotes::build(event, &outcome, &frames);
        let notes_path = ClipNotes::path_for(&outcome.output_path);
        match notes.save(&notes_path) {
            Ok(()) => debug!(
                "{}",
                ctx.format(&format!(
                    "notes {} ({} detections)",
                    notes_path.display(),
                    notes.total_detections
                ))
            ),
            Err(e) => warn!("{}", ctx.format(&format!("notes not written: {:#}", e))),
        }

        info!(
            "{}",
            ctx.format(&format!("done: {}", outcome.output_path.display()))
        );
        Ok(outcome)
    }

    fn handle(&self, scheduled: ScheduledEvent) {
        let ctx = LogContext::new("processor", &scheduled.event.camera).with_event(scheduled.seq);
        match self.process(&scheduled) {
            Ok(_) => {}
            Err(e) if e.is_no_data() => warn!("{}", ctx.format(&e.to_string())),
            Err(e) => error!("{}", ctx.format(&format!("extraction failed: {}", e))),
        }
    }

    /// Starts the dispatcher (polls the scheduler) and the extraction worker.
    ///
    /// After `running` goes false the dispatcher stops polling; the worker
    /// finishes whatever was already handed to it and exits.
    pub fn spawn(self, running: Arc<AtomicBool>) -> ProcessorHandles {
        let (tx, rx) = unbounded::<ScheduledEvent>();

        let scheduler = self.scheduler.clone();
        let poll = self.settings.poll_interval;
        let dispatcher = thread::spawn(move || dispatch_loop(&scheduler, &tx, poll, &running));

        let worker = thread::spawn(move || self.work_loop(rx));

        ProcessorHandles { dispatcher, worker }
    }

    fn work_loop(self, rx: Receiver<ScheduledEvent>) {
        info!("[processor] worker started");
        for scheduled in rx.iter() {
            self.handle(scheduled);
        }
        info!("[processor] worker stopped");
    }
}

/// Sender ohne `camera_type` meinen die Hauptkamera (Typ "0").
pub const DEFAULT_CAMERA_TYPE: &str = "0";

/// Maps `camera_type` (absent = [`DEFAULT_CAMERA_TYPE`]) through `camera_map`.
/// Types missing from the map fall back to the event's own `camera`.
pub fn recording_camera(camera_map: &HashMap<String, String>, event: &Event) -> String {
    let camera_type = event.camera_type.as_deref().unwrap_or(DEFAULT_CAMERA_TYPE);
    match camera_map.get(camera_type) {
        Some(dir) => dir.clone(),
        None => {
            warn!(
                "[processor] camera_type {} not in [cameras], using '{}'",
                camera_type, event.camera
            );
            event.camera.clone()
        }
    }
}

fn dispatch_loop(
    scheduler: &EventScheduler,
    tx: &Sender<ScheduledEvent>,
    poll: Duration,
    running: &AtomicBool,
) {
    info!(
        "[processor] dispatcher started (delay {}s)",
        scheduler.process_delay().num_seconds()
    );

    while running.load(Ordering::Relaxed) {
        for scheduled in scheduler.get_ready_events() {
            if tx.send(scheduled).is_err() {
                error!("[processor] worker gone, dispatcher exits");
                return;
            }
        }

        let pending = scheduler.pending_count();
        if pending > 0 {
            debug!("[processor] {} event(s) pending", pending);
        }
        thread::sleep(poll);
    }

    info!("[processor] dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn default_map() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("0".to_string(), "RGB_Camera".to_string());
        map.insert("1".to_string(), "Thermal_Camera".to_string());
        map
    }

    fn event(camera_type: Option<&str>) -> Event {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut ev = Event::new("motion", "front_door", ts);
        ev.camera_type = camera_type.map(str::to_string);
        ev
    }

    #[test]
    fn missing_camera_type_means_main_camera() {
        assert_eq!(recording_camera(&default_map(), &event(None)), "RGB_Camera");
        assert_eq!(recording_camera(&default_map(), &event(Some("0"))), "RGB_Camera");
        assert_eq!(recording_camera(&default_map(), &event(Some("1"))), "Thermal_Camera");
    }

    #[test]
    fn unmapped_camera_type_uses_event_camera() {
        assert_eq!(recording_camera(&default_map(), &event(Some("7"))), "front_door");
        assert_eq!(recording_camera(&HashMap::new(), &event(None)), "front_door");
    }
}
