use chrono::Utc;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::command::{self, AutoInit, StartObservation};
use super::error::SessionError;
use super::types::{ConnectionState, Notification, Pose, SessionStatus};
use crate::sky::HorizontalTransform;
use crate::transport::{Command, CommandTransport, Link, Outcome, Report, Reporter, Target};

pub const DEFAULT_PORT: u16 = 8082;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    fn stop(self) {
        let _ = self.stop_tx.send(());
        self.join.abort();
    }
}

#[derive(Debug)]
struct Shared {
    state: ConnectionState,
    /// Bumped on every connect and disconnect; reports tagged with an older
    /// value are dropped.
    generation: u64,
    target: Option<Target>,
    token: Option<String>,
    label: String,
    last_error: Option<String>,
    pose: Pose,
    poller: Option<WorkerHandle>,
}

struct Inner {
    shared: StdMutex<Shared>,
    transport: Arc<dyn CommandTransport>,
    transform: Arc<dyn HorizontalTransform>,
    notifier: broadcast::Sender<Notification>,
    reports_tx: mpsc::UnboundedSender<Report>,
    poll_interval: Duration,
}

/// Client side of one logical connection to a telescope controller.
///
/// Every operation returns as soon as the request is handed to the
/// transport. Completion, controller errors and the periodic status tick
/// arrive as [`Notification`]s on [`TelescopeSession::subscribe`]. Must be
/// created and driven from within a tokio runtime.
pub struct TelescopeSession {
    inner: Arc<Inner>,
    driver: JoinHandle<()>,
}

impl TelescopeSession {
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        transform: Arc<dyn HorizontalTransform>,
        options: SessionOptions,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let poll_interval = if options.poll_interval.is_zero() {
            log::warn!(
                "Zero status poll interval, using {:?}",
                DEFAULT_POLL_INTERVAL
            );
            DEFAULT_POLL_INTERVAL
        } else {
            options.poll_interval
        };

        let inner = Arc::new(Inner {
            shared: StdMutex::new(Shared {
                state: ConnectionState::Disconnected,
                generation: 0,
                target: None,
                token: None,
                label: "Disconnected".to_string(),
                last_error: None,
                pose: Pose::default(),
                poller: None,
            }),
            transport,
            transform,
            notifier,
            reports_tx,
            poll_interval,
        });

        let driver = tokio::spawn(drive(Arc::downgrade(&inner), reports_rx));
        Self { inner, driver }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn pose(&self) -> Pose {
        self.inner.lock().pose.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let shared = self.inner.lock();
        SessionStatus {
            state: shared.state,
            label: shared.label.clone(),
            authenticated: shared.token.is_some(),
            host: shared.target.as_ref().map(|t| t.host.clone()),
            port: shared.target.as_ref().map(|t| t.port),
            last_error: shared.last_error.clone(),
            pose: shared.pose.clone(),
        }
    }

    /// Starts connecting. Returns once the session is `Connecting`; the
    /// outcome arrives as `Connected` or `ConnectionError`. A no-op while a
    /// connection is pending or established.
    pub fn connect(&self, host: &str, port: u32) -> Result<(), SessionError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(SessionError::InvalidArgument(
                "host must not be empty".into(),
            ));
        }
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                SessionError::InvalidArgument(format!("port {} outside [1, 65535]", port))
            })?;

        let mut shared = self.inner.lock();
        if shared.state != ConnectionState::Disconnected {
            log::debug!("Ignoring connect to {}:{}: already {}", host, port, shared.state);
            return Ok(());
        }

        shared.generation += 1;
        shared.state = ConnectionState::Connecting;
        shared.token = None;
        shared.last_error = None;
        shared.label = "Connecting".to_string();
        let target = Target {
            host: host.to_string(),
            port,
        };
        shared.target = Some(target.clone());

        log::info!(
            "Connecting to telescope at {}:{} (generation {})",
            host,
            port,
            shared.generation
        );
        self.inner.emit(Notification::StatusUpdated {
            label: shared.label.clone(),
        });

        self.inner.transport.open(Link {
            target,
            handshake: command::empty(command::TAKE_CONTROL),
            reporter: Reporter::new(shared.generation, self.inner.reports_tx.clone()),
        });
        Ok(())
    }

    /// Drops the connection immediately. Idempotent.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        if let Some(poller) = shared.poller.take() {
            poller.stop();
        }
        if shared.state == ConnectionState::Disconnected {
            return;
        }

        shared.generation += 1;
        shared.state = ConnectionState::Disconnected;
        shared.token = None;
        shared.label = "Disconnected".to_string();
        self.inner.transport.close();

        log::info!("Disconnected from telescope");
        self.inner.emit(Notification::Disconnected);
        self.inner.emit(Notification::StatusUpdated {
            label: shared.label.clone(),
        });
    }

    /// Re-acquires exclusive control of the controller.
    pub fn take_control(&self) -> Result<(), SessionError> {
        self.submit_fixed(command::TAKE_CONTROL)
    }

    /// Slews to an equatorial position. The pose is recorded as soon as the
    /// command is dispatched; arrival shows up later as status updates.
    pub fn goto_coordinates(&self, ra: f64, dec: f64, name: &str) -> Result<(), SessionError> {
        let mut shared = self.inner.lock();
        ensure_connected(&shared)?;
        command::validate_equatorial(ra, dec)?;

        let horizontal = self.inner.transform.to_horizontal(ra, dec);
        log::info!(
            "GOTO RA={} DEC={} ({}) -> ALT={} AZ={}",
            ra,
            dec,
            name,
            horizontal.altitude_deg,
            horizontal.azimuth_deg
        );
        self.inner.dispatch(&shared, command::go_absolute(horizontal)?)?;

        shared.pose = Pose {
            ra_deg: ra,
            dec_deg: dec,
            alt_deg: horizontal.altitude_deg,
            az_deg: horizontal.azimuth_deg,
            target_name: name.to_string(),
        };
        self.inner.emit(Notification::PoseUpdated(shared.pose.clone()));
        Ok(())
    }

    pub fn start_observation(
        &self,
        ra: f64,
        dec: f64,
        name: &str,
        exposure_s: f64,
        gain: f64,
    ) -> Result<(), SessionError> {
        let mut shared = self.inner.lock();
        ensure_connected(&shared)?;
        command::validate_equatorial(ra, dec)?;
        command::validate_exposure(exposure_s, gain)?;

        let payload = StartObservation::new(ra, dec, name, exposure_s, gain);
        log::info!(
            "Observing {} ({}) for {} us at gain {}",
            payload.object_name,
            payload.object_id,
            payload.exposure_micro_sec,
            payload.gain
        );
        let command = command::build(command::START_OBSERVATION, &payload)?;
        self.inner.dispatch(&shared, command)?;

        let horizontal = self.inner.transform.to_horizontal(ra, dec);
        shared.pose = Pose {
            ra_deg: ra,
            dec_deg: dec,
            alt_deg: horizontal.altitude_deg,
            az_deg: horizontal.azimuth_deg,
            target_name: name.to_string(),
        };
        self.inner.emit(Notification::PoseUpdated(shared.pose.clone()));
        Ok(())
    }

    pub fn stop_observation(&self) -> Result<(), SessionError> {
        self.submit_fixed(command::STOP_OBSERVATION)
    }

    pub fn park(&self) -> Result<(), SessionError> {
        self.submit_fixed(command::PARK)
    }

    pub fn focus(&self) -> Result<(), SessionError> {
        self.submit_fixed(command::FOCUS)
    }

    pub fn open_arm(&self) -> Result<(), SessionError> {
        self.submit_fixed(command::OPEN_ARM)
    }

    /// Starts auto-alignment for the given site, stamped with the current
    /// wall-clock time.
    pub fn auto_initialize(&self, latitude: f64, longitude: f64) -> Result<(), SessionError> {
        let shared = self.inner.lock();
        ensure_connected(&shared)?;
        command::validate_site(latitude, longitude)?;

        let payload = AutoInit {
            latitude,
            longitude,
            time: Utc::now().timestamp_millis(),
        };
        let command = command::build(command::START_AUTO_INIT, &payload)?;
        self.inner.dispatch(&shared, command)
    }

    fn submit_fixed(&self, endpoint: &str) -> Result<(), SessionError> {
        let shared = self.inner.lock();
        ensure_connected(&shared)?;
        self.inner.dispatch(&shared, command::empty(endpoint))
    }
}

impl Drop for TelescopeSession {
    fn drop(&mut self) {
        self.driver.abort();
        let mut shared = self.inner.lock();
        if let Some(poller) = shared.poller.take() {
            poller.stop();
        }
        shared.state = ConnectionState::Disconnected;
        shared.token = None;
        self.inner.transport.close();
    }
}

fn ensure_connected(shared: &Shared) -> Result<(), SessionError> {
    if shared.state == ConnectionState::Connected {
        Ok(())
    } else {
        Err(SessionError::NotConnected)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    /// Callers hold the `shared` lock so notifications keep causal order.
    fn emit(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.notifier.send(notification);
    }

    fn dispatch(&self, shared: &Shared, command: Command) -> Result<(), SessionError> {
        let endpoint = command.endpoint.clone();
        log::debug!(
            "Submitting {} ({}, issued {})",
            endpoint,
            command.id,
            command.issued_at
        );
        if self.transport.send(command, shared.token.as_deref()) {
            Ok(())
        } else {
            log::warn!("Transport refused {}", endpoint);
            Err(SessionError::CommandSubmissionFailed(endpoint))
        }
    }

    fn apply(self: &Arc<Self>, report: Report) {
        let mut shared = self.lock();
        if report.generation != shared.generation {
            log::debug!(
                "Discarding stale report from generation {} (current {}): {:?}",
                report.generation,
                shared.generation,
                report.outcome
            );
            return;
        }

        match report.outcome {
            Outcome::Opened { token } => {
                if shared.state != ConnectionState::Connecting {
                    return;
                }
                shared.state = ConnectionState::Connected;
                shared.token = Some(token);
                shared.label = "Ready".to_string();
                if let Some(target) = &shared.target {
                    log::info!("Connected to telescope at {}:{}", target.host, target.port);
                }
                self.emit(Notification::Connected);
                self.emit(Notification::StatusUpdated {
                    label: shared.label.clone(),
                });
                shared.poller = Some(spawn_poller(
                    Arc::downgrade(self),
                    shared.generation,
                    self.poll_interval,
                ));
            }
            Outcome::OpenFailed(error) => {
                if shared.state != ConnectionState::Connecting {
                    return;
                }
                let message = error.to_string();
                log::warn!("Connection to telescope failed: {}", message);
                shared.state = ConnectionState::Disconnected;
                shared.token = None;
                shared.label = "Disconnected".to_string();
                shared.last_error = Some(message.clone());
                self.transport.close();
                self.emit(Notification::ConnectionError { message });
                self.emit(Notification::StatusUpdated {
                    label: shared.label.clone(),
                });
            }
            Outcome::Delivered { endpoint } => {
                log::debug!("{} acknowledged", endpoint);
                if let Some(label) =
                    command::acknowledgement_label(&endpoint, &shared.pose.target_name)
                {
                    shared.label = label;
                    self.emit(Notification::StatusUpdated {
                        label: shared.label.clone(),
                    });
                }
                self.emit(Notification::CommandAcknowledged { endpoint });
            }
            Outcome::Failed { endpoint, error } => {
                let reason = error.to_string();
                log::warn!("{} failed: {}", endpoint, reason);
                shared.last_error = Some(format!("{}: {}", endpoint, reason));
                self.emit(Notification::CommandFailed { endpoint, reason });
            }
        }
    }

    /// Re-emits the current status and pose. Returns false once the
    /// connection `generation` is over.
    fn publish_status(&self, generation: u64) -> bool {
        let shared = self.lock();
        if shared.generation != generation || shared.state != ConnectionState::Connected {
            return false;
        }
        self.emit(Notification::StatusUpdated {
            label: shared.label.clone(),
        });
        self.emit(Notification::PoseUpdated(shared.pose.clone()));
        true
    }
}

async fn drive(inner: Weak<Inner>, mut reports: mpsc::UnboundedReceiver<Report>) {
    while let Some(report) = reports.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply(report);
    }
}

fn spawn_poller(inner: Weak<Inner>, generation: u64, period: Duration) -> WorkerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            let should_stop = tokio::select! {
                _ = ticker.tick() => false,
                _ = &mut stop_rx => true,
            };
            if should_stop {
                break;
            }

            let Some(inner) = inner.upgrade() else {
                break;
            };
            if !inner.publish_status(generation) {
                break;
            }
        }
        log::debug!("Status poll for generation {} stopped", generation);
    });

    WorkerHandle { stop_tx, join }
}
