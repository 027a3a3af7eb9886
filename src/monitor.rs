//! Background polling of the supply status.
//!
//! A [`Monitor`] owns one thread that reads the status at a fixed cadence and keeps the
//! last good [`StatusSnapshot`]. Readers such as a display timer call [`Monitor::latest`],
//! which never touches the serial link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fugit::MillisDurationU32;
use log::{debug, info, warn};

use crate::{
    config::to_std,
    error::Error,
    psu::{Bk1788b, StatusSnapshot},
    transport::Transport,
};

/// Pause after an unexpected error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct Monitor {
    latest: Arc<Mutex<Option<StatusSnapshot>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// About 10 readings per second.
    pub const DEFAULT_INTERVAL: MillisDurationU32 = MillisDurationU32::millis(100);

    /// Start polling `psu` every `interval`.
    ///
    /// Polling ends when [`Monitor::stop`] is called, the monitor is dropped, or the
    /// handle is closed.
    pub fn spawn<T>(psu: Arc<Bk1788b<T>>, interval: MillisDurationU32) -> Self
    where
        T: Transport + Send + 'static,
    {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let interval = to_std(interval);

        let handle = {
            let latest = Arc::clone(&latest);
            let running = Arc::clone(&running);
            thread::spawn(move || poll(&psu, &latest, &running, interval))
        };

        Self {
            latest,
            running,
            handle: Some(handle),
        }
    }

    /// The most recent successful reading, if any.
    pub fn latest(&self) -> Option<StatusSnapshot> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the polling thread is still going.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop polling and wait for the thread to exit.
    ///
    /// An exchange in progress is finished first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Status polling thread panicked");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll<T: Transport>(
    psu: &Bk1788b<T>,
    latest: &Mutex<Option<StatusSnapshot>>,
    running: &AtomicBool,
    interval: Duration,
) {
    debug!("Status polling started, every {interval:?}");
    while running.load(Ordering::Acquire) {
        let pause = match psu.read_status() {
            Ok(Some(status)) => {
                *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
                interval
            }
            // Already logged by the driver; try again next tick.
            Ok(None) => interval,
            Err(Error::NotConnected) => {
                info!("Link closed, status polling stopped");
                running.store(false, Ordering::Release);
                break;
            }
            // Serial port failures, e.g. an unplugged adapter.
            Err(err) => {
                warn!("Status polling error: {err}");
                ERROR_BACKOFF
            }
        };
        // Woken early by `shutdown`.
        thread::park_timeout(pause);
    }
    debug!("Status polling finished");
}
