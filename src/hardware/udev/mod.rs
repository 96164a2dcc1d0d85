//! Udev Block Device Monitor
//!
//! Follows `udevadm monitor` for kernel block events and turns relevant
//! add/remove events into rescan signals. Signals carry no payload and
//! bursts inside one event period collapse into a single signal.

use crate::error::{Error, Result};
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

// =============================================================================
// Constants
// =============================================================================

/// Events that trigger a rescan
pub const DEFAULT_MATCH_PATTERNS: &[&str] = &["(?i)add", "(?i)remove"];

/// Device-mapper nodes churn on every multipath change and are ignored
pub const DEFAULT_EXCLUSION_PATTERNS: &[&str] = &["(?i)dm-[0-9]+"];

/// Window over which matching events are collapsed
pub const DEFAULT_EVENT_PERIOD: Duration = Duration::from_secs(5);

// =============================================================================
// Event Matching
// =============================================================================

/// True when `text` matches at least one pattern in `matches` and none in
/// `exclusions`. Patterns are compiled on every call.
pub fn match_udev_event<S: AsRef<str>>(
    text: &str,
    matches: &[S],
    exclusions: &[S],
) -> Result<bool> {
    UdevFilter::new(matches, exclusions).map(|filter| filter.matches(text))
}

/// Precompiled inclusion and exclusion patterns
#[derive(Debug, Clone)]
pub struct UdevFilter {
    matches: Vec<Regex>,
    exclusions: Vec<Regex>,
}

impl UdevFilter {
    /// Compile the patterns; an invalid pattern is a configuration error
    pub fn new<S: AsRef<str>>(matches: &[S], exclusions: &[S]) -> Result<Self> {
        let compile = |patterns: &[S]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| Regex::new(p.as_ref()).map_err(Error::from))
                .collect()
        };
        Ok(Self {
            matches: compile(matches)?,
            exclusions: compile(exclusions)?,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matches.iter().any(|re| re.is_match(text))
            && !self.exclusions.iter().any(|re| re.is_match(text))
    }
}

impl Default for UdevFilter {
    fn default() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
        };
        Self {
            matches: compile(DEFAULT_MATCH_PATTERNS),
            exclusions: compile(DEFAULT_EXCLUSION_PATTERNS),
        }
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Watches a udev event stream and signals a channel on relevant events
#[derive(Debug, Clone)]
pub struct UdevMonitor {
    filter: UdevFilter,
    event_period: Duration,
}

impl UdevMonitor {
    pub fn new(filter: UdevFilter, event_period: Duration) -> Self {
        Self {
            filter,
            event_period,
        }
    }

    /// Start `udevadm monitor -k -s block` and return the signal channel.
    ///
    /// The channel closes when the monitor stops for any reason, including
    /// failing to start.
    pub fn spawn(self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);

        let child = Command::new("udevadm")
            .args(["monitor", "-k", "-s", "block"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to start udevadm monitor: {}", e);
                return rx;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            warn!("udevadm monitor has no stdout");
            return rx;
        };

        tokio::spawn(async move {
            info!("udev block device monitor started");
            if let Err(e) = self.watch(BufReader::new(stdout), tx).await {
                warn!("udev monitor stopped: {}", e);
            }
            if let Err(e) = child.kill().await {
                debug!("udevadm already exited: {}", e);
            }
        });

        rx
    }

    /// Read event lines until EOF, signalling at most once per event
    /// period. A pending signal is flushed before returning.
    pub async fn watch<R>(&self, reader: R, tx: mpsc::Sender<()>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut ticker = tokio::time::interval(self.event_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        let mut pending = false;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            if pending {
                                signal(&tx);
                            }
                            return Err(Error::UdevMonitor(e.to_string()));
                        }
                    };
                    match line {
                        Some(text) => {
                            if self.filter.matches(&text) {
                                debug!("udev event matched: {}", text.trim());
                                pending = true;
                            }
                        }
                        None => {
                            if pending {
                                signal(&tx);
                            }
                            return Ok(());
                        }
                    }
                }
                _ = ticker.tick() => {
                    if pending {
                        pending = false;
                        if !signal(&tx) {
                            return Err(Error::UdevMonitor("signal receiver dropped".into()));
                        }
                    }
                }
            }
        }
    }
}

impl Default for UdevMonitor {
    fn default() -> Self {
        Self::new(UdevFilter::default(), DEFAULT_EVENT_PERIOD)
    }
}

/// Send a signal unless one is already waiting. False once the receiver is gone.
fn signal(tx: &mpsc::Sender<()>) -> bool {
    match tx.try_send(()) {
        Ok(()) | Err(TrySendError::Full(())) => true,
        Err(TrySendError::Closed(())) => false,
    }
}
