use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ble::BleTransport;
use crate::cipher;
use crate::details::BikeDetails;
use crate::error::{BikeError, Result};
use crate::events::{self, BikeEvent, EventReceiver, EventSender, StateChange};
use crate::manager::{ConnectionManager, ConnectionState, Notification};
use crate::profiles::{BikeProfile, ReadRequest, WriteRequest};
use crate::scan::BikeScanner;
use crate::transport::Transport;
use crate::types::{
    Alarm, BatteryState, BikeState, ErrorCode, Lighting, Lock, ModuleState, MotorAssistance,
    MutedSounds, Parameters, Region, Sound, Unit,
};

/// How long the bike needs to stabilize after waking from standby
const WAKEUP_SETTLE: Duration = Duration::from_millis(500);

/// The default pause before automatic reconnect attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// A session with one bike
///
/// `Bike` owns the device record, the hardware profile and the connection
/// manager. [`connect`](Self::connect) brings the link up and runs the
/// setup sequence: authenticate, optionally unlock on proximity, read
/// every parameter the profile supports, then subscribe to notifications.
/// Decoded values land in [`state`](Self::state) and are republished on
/// the event channel; commands go out through the challenge-response
/// write path.
///
/// The session survives link drops: the manager reconnects automatically
/// and the setup sequence reruns on every new link, until
/// [`disconnect`](Self::disconnect) is called.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use moofers::{Bike, BikeDetails, Lock, ProfileName};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let details = BikeDetails::new(
///         "My Bike",
///         "ASY1234567",
///         ProfileName::SmartBike2018,
///         "Smart S",
///         "f8:8a:5e:12:34:56",
///         "00112233445566778899aabbccddeeff",
///         None,
///     )?;
///
///     let bike = Bike::discover(details, Duration::from_secs(30)).await?;
///     bike.connect().await?;
///     bike.set_lock(Lock::Unlocked).await?;
///     bike.disconnect().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Bike {
    details: Arc<BikeDetails>,
    profile: BikeProfile,
    key: Arc<Vec<u8>>,
    manager: Arc<ConnectionManager>,
    state: Arc<RwLock<BikeState>>,
    events: EventSender,
    proximity_unlock: Arc<AtomicBool>,
    motion_unlock: Arc<AtomicBool>,
    watching: Arc<AtomicBool>,
    dispatching: Arc<AtomicBool>,
    setup_lock: Arc<tokio::sync::Mutex<()>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for Bike {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bike")
            .field("details", &self.details)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl Bike {
    /// Create a session over an already resolved transport.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::BikeNotSupported`] if the record's profile
    /// name maps to no ported hardware generation.
    pub fn new(details: BikeDetails, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_reconnect_delay(details, transport, RECONNECT_DELAY)
    }

    /// Create a session with a custom automatic reconnect delay.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::BikeNotSupported`] if the record's profile
    /// name maps to no ported hardware generation.
    pub fn with_reconnect_delay(
        details: BikeDetails,
        transport: Arc<dyn Transport>,
        reconnect_delay: Duration,
    ) -> Result<Self> {
        let profile = details.profile().ok_or(BikeError::BikeNotSupported)?;
        let key = details.key();
        Ok(Self {
            details: Arc::new(details),
            profile,
            key: Arc::new(key),
            manager: Arc::new(ConnectionManager::new(transport, reconnect_delay)),
            state: Arc::new(RwLock::new(BikeState::default())),
            events: events::channel(),
            proximity_unlock: Arc::new(AtomicBool::new(false)),
            motion_unlock: Arc::new(AtomicBool::new(false)),
            watching: Arc::new(AtomicBool::new(false)),
            dispatching: Arc::new(AtomicBool::new(false)),
            setup_lock: Arc::new(tokio::sync::Mutex::new(())),
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Scan for the bike matching `details` and create a session for it.
    ///
    /// # Errors
    ///
    /// Returns scanning errors ([`BikeError::Timeout`],
    /// [`BikeError::PoweredOff`], ...) or
    /// [`BikeError::BikeNotSupported`] for unported generations.
    pub async fn discover(details: BikeDetails, timeout: Duration) -> Result<Self> {
        let scanner = BikeScanner::new().await?;
        let id = scanner.find_bike(&details, timeout).await?;
        let transport: Arc<dyn Transport> = BleTransport::new(id).await?;
        Self::new(details, transport)
    }

    /// The device record this session was created from
    #[must_use]
    pub fn details(&self) -> &BikeDetails {
        &self.details
    }

    /// The hardware generation profile in use
    #[must_use]
    pub const fn profile(&self) -> BikeProfile {
        self.profile
    }

    /// The current connection state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Whether the session is ready for commands
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.manager.state() == ConnectionState::Ready
    }

    /// A snapshot of the live decoded state
    ///
    /// Authoritative once the first full parameter read after
    /// [`connect`](Self::connect) completed; persists across reconnects.
    pub async fn state(&self) -> BikeState {
        self.state.read().await.clone()
    }

    /// Subscribe to session events
    #[must_use]
    pub fn events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Unlock automatically right after every connect
    pub fn set_proximity_unlock(&self, enabled: bool) {
        self.proximity_unlock.store(enabled, Ordering::SeqCst);
    }

    /// Unlock automatically when a speed notification arrives while locked
    pub fn set_motion_unlock(&self, enabled: bool) {
        self.motion_unlock.store(enabled, Ordering::SeqCst);
    }

    /// Read the received signal strength in dBm.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Disconnected`] if the link is not ready.
    pub async fn signal_strength(&self) -> Result<i16> {
        self.manager.signal_strength().await
    }

    /// Bring the link up and run the session setup sequence.
    ///
    /// Suspends until the session is fully usable: authenticated, state
    /// read and notifications subscribed. A no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns the transport or protocol error that prevented the session
    /// from becoming ready. An automatic reconnect attempt stays
    /// scheduled.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        if let Err(error) = self.manager.connect().await {
            // the manager keeps retrying; the watcher will finish the
            // setup when a later attempt sticks
            self.spawn_watcher();
            return Err(error);
        }
        let setup_result = self.setup().await;
        self.spawn_watcher();
        setup_result?;
        self.emit(BikeEvent::ConnectionState(ConnectionState::Ready));
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Idempotent. Fails all pending operations, stops the notification
    /// dispatcher and suppresses automatic reconnection.
    pub async fn disconnect(&self) {
        info!("disconnecting from {}", self.details.name);
        for task in self.tasks.lock().expect("task list poisoned").drain(..) {
            task.abort();
        }
        self.watching.store(false, Ordering::SeqCst);
        self.dispatching.store(false, Ordering::SeqCst);
        self.manager.disconnect().await;
        self.emit(BikeEvent::ConnectionState(ConnectionState::Disconnected));
    }

    // --- commands ---

    /// Lock or unlock the bike.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn set_lock(&self, value: Lock) -> Result<()> {
        self.ensure_ready()?;
        info!("setting lock to {value}");
        self.write_request(self.profile.lock_write_request(value))
            .await
    }

    /// Set the lighting mode.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn set_lighting(&self, value: Lighting) -> Result<()> {
        self.ensure_ready()?;
        info!("setting lighting to {value}");
        self.write_request(self.profile.lighting_write_request(value))
            .await
    }

    /// Set the anti-theft alarm mode. A no-op on bikes without an alarm.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn set_alarm(&self, value: Alarm) -> Result<()> {
        self.ensure_ready()?;
        info!("setting alarm to {value}");
        self.write_request(self.profile.alarm_write_request(value))
            .await
    }

    /// Set the motor assistance level.
    ///
    /// The firmware takes assistance and region in one frame, so this is
    /// a no-op until the region is known (and on bikes without a motor).
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn set_motor_assistance(&self, value: MotorAssistance) -> Result<()> {
        self.ensure_ready()?;
        info!("setting motor assistance to {value}");
        let Some(region) = self.state.read().await.region else {
            return Ok(());
        };
        self.write_request(self.profile.motor_assistance_write_request(value, region))
            .await
    }

    /// Set the region.
    ///
    /// Coupled with motor assistance the same way as
    /// [`set_motor_assistance`](Self::set_motor_assistance): a no-op
    /// until the assistance level is known.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn set_region(&self, value: Region) -> Result<()> {
        self.ensure_ready()?;
        info!("setting region to {value}");
        let Some(motor_assistance) = self.state.read().await.motor_assistance else {
            return Ok(());
        };
        self.write_request(
            self.profile
                .motor_assistance_write_request(motor_assistance, value),
        )
        .await
    }

    /// Set the measuring unit. A no-op on generations without the command.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn set_unit(&self, value: Unit) -> Result<()> {
        self.ensure_ready()?;
        info!("setting unit to {value}");
        self.write_request(self.profile.unit_write_request(value))
            .await
    }

    /// Set which sounds are muted. A no-op on bikes without a speaker.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn set_muted_sounds(&self, value: MutedSounds) -> Result<()> {
        self.ensure_ready()?;
        info!("setting muted sounds to {value}");
        self.write_request(self.profile.muted_sounds_write_request(value))
            .await
    }

    /// Play a sound `repeats` times. A no-op on bikes without a speaker.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn play_sound(&self, sound: Sound, repeats: u8) -> Result<()> {
        self.ensure_ready()?;
        info!("playing sound {sound:?} {repeats} times");
        self.write_request(self.profile.play_sound_write_request(sound, repeats))
            .await
    }

    /// Set the backup unlock code.
    ///
    /// The code must be in 111..=999 and must not contain the digit zero.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::InvalidBackupCode`] before any I/O for an
    /// invalid code, [`BikeError::NotConnected`] when the session is not
    /// ready, otherwise transport errors.
    pub async fn set_backup_code(&self, code: u16) -> Result<()> {
        if !(111..=999).contains(&code) || code.to_string().contains('0') {
            return Err(BikeError::InvalidBackupCode(code));
        }
        self.ensure_ready()?;
        info!("setting backup code to {code}");
        self.write_request(self.profile.backup_code_write_request(code))
            .await
    }

    /// Wake the bike from standby and give it half a second to stabilize.
    ///
    /// Only issues a write when the module is currently in standby.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::NotConnected`] when the session is not ready,
    /// otherwise transport errors.
    pub async fn wakeup(&self) -> Result<()> {
        self.ensure_ready()?;
        if self.state.read().await.module_state == ModuleState::Standby {
            info!("waking the bike up");
            self.write_request(self.profile.module_state_write_request(ModuleState::On))
                .await?;
            tokio::time::sleep(WAKEUP_SETTLE).await;
        }
        Ok(())
    }

    // --- session plumbing ---

    fn ensure_ready(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BikeError::NotConnected)
        }
    }

    fn emit(&self, event: BikeEvent) {
        let _ = self.events.send(event);
    }

    /// Authenticate, apply the unlock policy, read the full state and
    /// subscribe to notifications. Runs on every transport-level connect.
    /// Serialized so a reconnect cannot interleave with a caller-driven
    /// setup.
    async fn setup(&self) -> Result<()> {
        let _running = self.setup_lock.lock().await;
        self.authenticate().await?;

        if self.proximity_unlock.load(Ordering::SeqCst) {
            info!("unlocking because of proximity");
            self.set_lock(Lock::Unlocked).await?;
        }

        debug!("reading parameters");
        let parameters = self.read_parameters().await?;
        self.apply_parameters(&parameters).await;

        self.start_dispatcher();
        self.subscribe_notifications().await?;
        Ok(())
    }

    async fn authenticate(&self) -> Result<()> {
        info!("authenticating");
        self.write_request(Some(self.profile.authentication_write_request(&self.key)))
            .await
    }

    /// Read one typed value. Absent requests resolve to `None` without
    /// any I/O.
    async fn read_request<T>(&self, request: Option<ReadRequest<T>>) -> Result<Option<T>> {
        let Some(request) = request else {
            return Ok(None);
        };
        let data = self.manager.read(request.characteristic).await?;
        if request.decrypt {
            let plain = cipher::decrypt(&data, &self.key)?;
            Ok((request.parse)(Some(&plain)))
        } else {
            Ok((request.parse)(Some(&data)))
        }
    }

    /// Submit one write through the challenge-response protocol: read a
    /// fresh challenge, prepend its first two bytes and the command byte
    /// to the payload, encrypt the whole frame with the device key.
    /// Absent requests resolve without any I/O.
    async fn write_request(&self, request: Option<WriteRequest>) -> Result<()> {
        let Some(request) = request else {
            return Ok(());
        };

        let challenge = self
            .read_request(Some(self.profile.challenge_read_request()))
            .await?;
        let Some(challenge) = challenge else {
            return Ok(());
        };
        if challenge.len() < 2 {
            return Ok(());
        }

        let mut frame = BytesMut::with_capacity(3 + request.payload.len());
        frame.put_slice(&challenge[..2]);
        if let Some(command) = request.command {
            frame.put_u8(command);
        }
        frame.put_slice(&request.payload);

        let payload = cipher::encrypt(&frame, &self.key)?;
        self.manager.write(request.characteristic, &payload).await
    }

    /// Read every parameter the profile supports: the combined frame when
    /// the generation has one, individual characteristics with documented
    /// defaults otherwise.
    async fn read_parameters(&self) -> Result<Parameters> {
        if let Some(request) = self.profile.parameters_read_request() {
            if let Some(parameters) = self.read_request(Some(request)).await? {
                return Ok(parameters);
            }
        }

        Ok(Parameters {
            module_state: self
                .read_request(self.profile.module_state_read_request())
                .await?
                .unwrap_or(ModuleState::Off),
            alarm: self.read_request(self.profile.alarm_read_request()).await?,
            lock: self
                .read_request(self.profile.lock_read_request())
                .await?
                .unwrap_or(Lock::Locked),
            battery_state: self
                .read_request(self.profile.battery_state_read_request())
                .await?
                .unwrap_or(BatteryState::Discharging),
            speed: self
                .read_request(self.profile.speed_read_request())
                .await?
                .unwrap_or(0),
            motor_battery_level: None,
            module_battery_level: self
                .read_request(self.profile.battery_level_read_request())
                .await?
                .unwrap_or(0),
            lighting: self
                .read_request(self.profile.lighting_read_request())
                .await?
                .unwrap_or(Lighting::Off),
            unit: None,
            motor_assistance: None,
            region: None,
            muted_sounds: self
                .read_request(self.profile.muted_sounds_read_request())
                .await?
                .unwrap_or(MutedSounds::NONE),
            distance: self
                .read_request(self.profile.distance_read_request())
                .await?
                .unwrap_or(0.0),
            error_code: self
                .read_request(self.profile.error_code_read_request())
                .await?
                .unwrap_or_default(),
        })
    }

    /// Enable notifications for every characteristic the profile can
    /// decode. The battery level subscription is best effort; not every
    /// module firmware pushes it.
    async fn subscribe_notifications(&self) -> Result<()> {
        if let Some(request) = self.profile.parameters_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.battery_level_read_request() {
            if let Err(error) = self.manager.subscribe(request.characteristic).await {
                debug!("battery level notifications unavailable: {error}");
            }
        }
        if let Some(request) = self.profile.battery_state_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.lock_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.alarm_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.lighting_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.module_state_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.error_code_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.speed_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.distance_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        if let Some(request) = self.profile.muted_sounds_read_request() {
            self.manager.subscribe(request.characteristic).await?;
        }
        Ok(())
    }

    /// Re-run the setup sequence whenever the manager reconnects, and
    /// forward connection state transitions as events.
    fn spawn_watcher(&self) {
        if self.watching.swap(true, Ordering::SeqCst) {
            return;
        }
        let bike = self.clone();
        // a fresh receiver has already seen the current state, so only
        // transitions from here on are handled
        let mut states = self.manager.state_watch();
        let task = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                bike.emit(BikeEvent::ConnectionState(state));
                if state == ConnectionState::Ready {
                    info!("link is back, rerunning session setup");
                    if let Err(setup_error) = bike.setup().await {
                        error!("setup after reconnect failed: {setup_error}");
                        bike.emit(BikeEvent::Error(setup_error.to_string()));
                    }
                }
            }
        });
        self.tasks.lock().expect("task list poisoned").push(task);
    }

    /// Route notification frames to the per-field decoders. Runs on the
    /// session's single event-processing task; nothing else mutates the
    /// live state.
    fn start_dispatcher(&self) {
        if self.dispatching.swap(true, Ordering::SeqCst) {
            return;
        }
        let bike = self.clone();
        let mut notifications = self.manager.notifications();
        let task = tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => bike.handle_notification(notification).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("dropped {missed} notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().expect("task list poisoned").push(task);
    }

    fn decode<T>(&self, request: &ReadRequest<T>, data: &[u8]) -> Result<Option<T>> {
        if request.decrypt {
            let plain = cipher::decrypt(data, &self.key)?;
            Ok((request.parse)(Some(&plain)))
        } else {
            Ok((request.parse)(Some(data)))
        }
    }

    async fn handle_notification(&self, notification: Notification) {
        let uuid = notification.characteristic;
        let data = notification.data.as_slice();

        if let Some(request) = self.profile.parameters_read_request() {
            if request.characteristic == uuid {
                match self.decode(&request, data) {
                    Ok(Some(parameters)) => {
                        debug!("notification: parameters");
                        self.apply_parameters(&parameters).await;
                    }
                    Ok(None) => {}
                    Err(decode_error) => {
                        warn!("parameters notification failed to decode: {decode_error}");
                        self.emit(BikeEvent::Error(decode_error.to_string()));
                    }
                }
                return;
            }
        }
        if let Some(request) = self.profile.lock_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: lock {value}");
                    self.apply_lock(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.alarm_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: alarm {value}");
                    self.apply_alarm(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.lighting_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: lighting {value}");
                    self.apply_lighting(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.battery_level_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: battery level {value}");
                    self.apply_battery_level(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.battery_state_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: battery state {value}");
                    self.apply_battery_state(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.module_state_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: module state {value}");
                    self.apply_module_state(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.error_code_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: error code {value}");
                    self.apply_error_code(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.speed_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: speed {value}");
                    self.apply_speed(value).await;
                    self.maybe_motion_unlock().await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.distance_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: distance {value}");
                    self.apply_distance(value).await;
                }
                return;
            }
        }
        if let Some(request) = self.profile.muted_sounds_read_request() {
            if request.characteristic == uuid {
                if let Ok(Some(value)) = self.decode(&request, data) {
                    debug!("notification: muted sounds {value}");
                    self.apply_muted_sounds(value).await;
                }
                return;
            }
        }
    }

    /// Fire-and-forget unlock when motion is detected while locked.
    async fn maybe_motion_unlock(&self) {
        if !self.motion_unlock.load(Ordering::SeqCst) {
            return;
        }
        if self.state.read().await.lock != Lock::Locked {
            return;
        }
        info!("unlocking because of motion");
        let bike = self.clone();
        tokio::spawn(async move {
            if let Err(unlock_error) = bike.set_lock(Lock::Unlocked).await {
                warn!("motion unlock failed: {unlock_error}");
            }
        });
    }

    // --- state application; every successful decode republishes its
    // event, even when the value is unchanged ---

    async fn apply_parameters(&self, parameters: &Parameters) {
        self.apply_battery_level(parameters.battery_level()).await;
        self.apply_lock(parameters.lock).await;
        if let Some(alarm) = parameters.alarm {
            self.apply_alarm(alarm).await;
        }
        self.apply_lighting(parameters.lighting).await;
        self.apply_module_state(parameters.module_state).await;
        if let Some(motor_assistance) = parameters.motor_assistance {
            self.apply_motor_assistance(motor_assistance).await;
        }
        self.apply_speed(parameters.speed).await;
        self.apply_muted_sounds(parameters.muted_sounds).await;
        self.apply_error_code(parameters.error_code.clone()).await;
        self.apply_distance(parameters.distance).await;
        if let Some(region) = parameters.region {
            self.apply_region(region).await;
        }
        if let Some(unit) = parameters.unit {
            self.apply_unit(unit).await;
        }
        self.apply_battery_state(parameters.battery_state).await;
    }

    async fn apply_lock(&self, value: Lock) {
        self.state.write().await.lock = value;
        self.emit(BikeEvent::StateChanged(StateChange::Lock(value)));
    }

    async fn apply_alarm(&self, value: Alarm) {
        self.state.write().await.alarm = Some(value);
        self.emit(BikeEvent::StateChanged(StateChange::Alarm(value)));
    }

    async fn apply_lighting(&self, value: Lighting) {
        self.state.write().await.lighting = value;
        self.emit(BikeEvent::StateChanged(StateChange::Lighting(value)));
    }

    async fn apply_battery_level(&self, value: u8) {
        self.state.write().await.battery_level = value;
        self.emit(BikeEvent::StateChanged(StateChange::BatteryLevel(value)));
    }

    async fn apply_battery_state(&self, value: BatteryState) {
        self.state.write().await.battery_state = value;
        self.emit(BikeEvent::StateChanged(StateChange::BatteryState(value)));
    }

    async fn apply_module_state(&self, value: ModuleState) {
        self.state.write().await.module_state = value;
        self.emit(BikeEvent::StateChanged(StateChange::ModuleState(value)));
    }

    async fn apply_error_code(&self, value: ErrorCode) {
        self.state.write().await.error_code = value.clone();
        self.emit(BikeEvent::StateChanged(StateChange::ErrorCode(value)));
    }

    async fn apply_motor_assistance(&self, value: MotorAssistance) {
        self.state.write().await.motor_assistance = Some(value);
        self.emit(BikeEvent::StateChanged(StateChange::MotorAssistance(value)));
    }

    async fn apply_muted_sounds(&self, value: MutedSounds) {
        self.state.write().await.muted_sounds = value;
        self.emit(BikeEvent::StateChanged(StateChange::MutedSounds(value)));
    }

    async fn apply_speed(&self, value: u8) {
        self.state.write().await.speed = value;
        self.emit(BikeEvent::StateChanged(StateChange::Speed(value)));
    }

    async fn apply_distance(&self, value: f64) {
        self.state.write().await.distance = value;
        self.emit(BikeEvent::StateChanged(StateChange::Distance(value)));
    }

    async fn apply_region(&self, value: Region) {
        self.state.write().await.region = Some(value);
        self.emit(BikeEvent::StateChanged(StateChange::Region(value)));
    }

    async fn apply_unit(&self, value: Unit) {
        self.state.write().await.unit = Some(value);
        self.emit(BikeEvent::StateChanged(StateChange::Unit(value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileName;
    use crate::transport::TransportEvent;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// A transport that refuses everything; commands must never reach it.
    struct DeadTransport {
        calls: AtomicUsize,
        events: broadcast::Sender<TransportEvent>,
    }

    impl DeadTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                events: broadcast::channel(4).0,
            })
        }
    }

    #[async_trait]
    impl Transport for DeadTransport {
        async fn connect(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BikeError::PeripheralNotFound)
        }

        async fn discover_characteristics(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BikeError::Disconnected)
        }

        async fn read(&self, _characteristic: uuid::Uuid) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BikeError::Disconnected)
        }

        async fn write(&self, _characteristic: uuid::Uuid, _data: &[u8]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BikeError::Disconnected)
        }

        async fn subscribe(&self, _characteristic: uuid::Uuid) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BikeError::Disconnected)
        }

        async fn read_rssi(&self) -> Result<i16> {
            Err(BikeError::Disconnected)
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn events(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }
    }

    fn bike() -> (Bike, Arc<DeadTransport>) {
        let details = BikeDetails::new(
            "MyBikeName",
            "ACAB1312",
            ProfileName::Electrified2018,
            "Das Modell",
            "1a:2b:3c:4d:5e:6f",
            "4142434445464748494a4b4c4d4e4f50",
            None,
        )
        .unwrap();
        let transport = DeadTransport::new();
        let bike = Bike::new(details, transport.clone()).unwrap();
        (bike, transport)
    }

    #[test]
    fn test_unsupported_profile_is_rejected() {
        let details = BikeDetails::new(
            "a",
            "b",
            ProfileName::Electrified2020,
            "c",
            "1a:2b:3c:4d:5e:6f",
            "4142434445464748494a4b4c4d4e4f50",
            None,
        )
        .unwrap();
        let error = Bike::new(details, DeadTransport::new()).unwrap_err();
        assert!(matches!(error, BikeError::BikeNotSupported));
    }

    #[tokio::test]
    async fn test_commands_require_ready_without_io() {
        let (bike, transport) = bike();
        assert!(matches!(
            bike.set_lock(Lock::Unlocked).await,
            Err(BikeError::NotConnected)
        ));
        assert!(matches!(
            bike.set_lighting(Lighting::Off).await,
            Err(BikeError::NotConnected)
        ));
        assert!(matches!(bike.wakeup().await, Err(BikeError::NotConnected)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backup_code_validation_precedes_io() {
        let (bike, transport) = bike();
        for code in [110, 1000, 101, 230, 709, 0] {
            let error = bike.set_backup_code(code).await.unwrap_err();
            assert!(
                matches!(error, BikeError::InvalidBackupCode(rejected) if rejected == code),
                "code {code} should be rejected"
            );
        }
        // valid codes still fail, but only because the session is down
        for code in [111, 999, 123, 987] {
            assert!(matches!(
                bike.set_backup_code(code).await,
                Err(BikeError::NotConnected)
            ));
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_error() {
        let (bike, _transport) = bike();
        assert!(bike.connect().await.is_err());
        assert_eq!(bike.connection_state(), ConnectionState::Disconnected);
        bike.disconnect().await;
    }
}
