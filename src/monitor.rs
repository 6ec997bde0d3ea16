//! Periodic scanning on a background thread.
//!
//! Scans run one at a time on a single worker thread. Completed scans are
//! delivered over a channel; a scan that finishes after [`MonitorHandle::stop`]
//! is dropped instead of reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::AcquisitionError;
use crate::scan::{ScanReport, Scanner};

/// How often the worker checks for a stop request while waiting.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub enum ScanEvent {
    Completed(ScanReport),
    Failed(AcquisitionError),
}

pub struct Monitor {
    scanner: Scanner,
    interval: Duration,
}

pub struct MonitorHandle {
    events: Receiver<ScanEvent>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn new(scanner: Scanner, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    pub fn spawn(self) -> std::io::Result<MonitorHandle> {
        let (tx, rx) = channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let worker = {
            let running = running.clone();
            thread::Builder::new().name("arp-monitor".to_string()).spawn(move || self.run(tx, running))?
        };
        Ok(MonitorHandle { events: rx, running, worker: Some(worker) })
    }

    fn run(self, tx: Sender<ScanEvent>, running: Arc<AtomicBool>) {
        log::info!("Scanning {} every {}", self.scanner.source_name(), humantime::format_duration(self.interval));
        let ticker = channel::tick(STOP_POLL_INTERVAL);
        while running.load(Ordering::SeqCst) {
            let event = match self.scanner.scan() {
                Ok(report) => ScanEvent::Completed(report),
                Err(err) => {
                    log::error!("ARP scan failed: {}", err);
                    ScanEvent::Failed(err)
                }
            };
            if !running.load(Ordering::SeqCst) {
                log::debug!("Dropping scan finished after stop request");
                break;
            }
            if tx.send(event).is_err() {
                log::debug!("Scan consumer went away, stopping");
                break;
            }

            let next = Instant::now() + self.interval;
            while running.load(Ordering::SeqCst) && Instant::now() < next {
                let _ = ticker.recv();
            }
        }
        log::info!("Monitor stopped");
    }
}

impl MonitorHandle {
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Shared stop flag, e.g. for a signal handler.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stops the worker and waits for it to exit.
    pub fn join(mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
