//! Conversation orchestrator: the send pipeline.
//!
//! A send-cycle validates its preconditions, optionally grabs one camera
//! frame, records the user message plus a placeholder, asks the gateway for
//! an emotion and then a reply, and finally swaps the placeholder for the
//! answer. Only one cycle runs at a time. The current [`SendPhase`] is
//! published on a `watch` channel for the view layer.

use crate::camera::{CameraAdapter, CameraControl, CameraStatus, ImageHandle, Permission, backend_from_config};
use crate::config::{ChatConfig, SessionConfig};
use crate::error::{CameraError, ExportError};
use crate::gateway::{API_KEY_MISSING_MESSAGE, EmotionLabel, Inference, InferenceGateway};
use crate::session::export::{self, HistoryFormat};
use crate::session::{Message, MessageLog, SharedMessageLog};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_WELCOME_MESSAGE: &str = "Hello! I'm your AI assistant with emotion detection capabilities. \
Turn on your camera and I'll analyze your facial expressions to better understand how you're feeling. \
How can I help you today?";

/// Placeholder text shown while inference calls are outstanding.
pub const PROCESSING_MESSAGE: &str = "Processing your message...";

pub const DEFAULT_ERROR_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Posted once per session when the camera permission is refused.
pub const CAMERA_PERMISSION_DENIED_MESSAGE: &str =
    "Camera permission denied. Please grant camera access to use this feature.";

/// Error text for a send whose capture was refused by the platform.
pub const CAMERA_ACCESS_ERROR_MESSAGE: &str =
    "Camera permission denied. Please grant camera access in your settings.";

/// Text sent to reply generation when the user sent a photo with no text.
pub const FALLBACK_GREETING: &str = "Hello";

const PERMISSION_DENIED_MARKER: &str = "Camera permission denied";

/// Where a send-cycle currently is.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    #[default]
    Idle,
    Validating,
    Capturing,
    AwaitingClassification,
    AwaitingReply,
    Settling,
}

/// Why a send was dropped without touching the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No text and no camera to send a photo from.
    BlankInput,
    /// Another send-cycle is still running.
    InProgress,
    /// The camera is on but the platform refused access.
    PermissionDenied,
}

/// Result of one call to [`Conversation::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Skipped(SkipReason),
    Completed {
        /// `None` when no photo was captured and classification was skipped.
        emotion: Option<Inference<EmotionLabel>>,
        reply: Inference<String>,
    },
    /// Capture failed; an error message was posted instead of a reply.
    Failed(CameraError),
}

/// Releases the in-progress flag and returns the phase to idle on drop.
struct CycleGuard<'a> {
    in_progress: &'a AtomicBool,
    phase: &'a watch::Sender<SendPhase>,
}

impl<'a> CycleGuard<'a> {
    fn acquire(in_progress: &'a AtomicBool, phase: &'a watch::Sender<SendPhase>) -> Option<Self> {
        in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { in_progress, phase })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(SendPhase::Idle);
        self.in_progress.store(false, Ordering::Release);
    }
}

/// One chat session.
pub struct Conversation {
    session_id: Uuid,
    camera: Arc<dyn CameraControl>,
    gateway: Arc<InferenceGateway>,
    settings: SessionConfig,
    log: SharedMessageLog,
    input: Mutex<String>,
    in_progress: AtomicBool,
    phase: watch::Sender<SendPhase>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("session_id", &self.session_id)
            .field("phase", &self.phase())
            .field("camera", &self.camera.status())
            .finish()
    }
}

impl Conversation {
    /// Start a session with the welcome message, plus the API-key notice if
    /// the gateway has no credential.
    pub fn new(camera: Arc<dyn CameraControl>, gateway: Arc<InferenceGateway>, settings: SessionConfig) -> Self {
        let mut log = MessageLog::with_welcome(&settings.welcome_message);
        if !gateway.has_credential() {
            log.append_assistant(API_KEY_MISSING_MESSAGE);
        }

        let session_id = Uuid::new_v4();
        info!(%session_id, has_credential = gateway.has_credential(), "conversation started");

        let (phase, _) = watch::channel(SendPhase::Idle);
        Self {
            session_id,
            camera,
            gateway,
            settings,
            log: log.into_shared(),
            input: Mutex::new(String::new()),
            in_progress: AtomicBool::new(false),
            phase,
        }
    }

    /// Wire up the production camera adapter and Gemini gateway from config.
    pub fn from_config(config: &ChatConfig) -> Self {
        let backend = backend_from_config(&config.camera);
        let camera = Arc::new(CameraAdapter::new(backend, &config.camera));
        let gateway = Arc::new(InferenceGateway::new(config.gateway.clone()));
        Self::new(camera, gateway, config.session.clone())
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> SendPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SendPhase> {
        self.phase.subscribe()
    }

    pub fn is_sending(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Shared handle to the log, for collaborators that append notices.
    pub fn log(&self) -> SharedMessageLog {
        Arc::clone(&self.log)
    }

    /// Ordered snapshot of the log.
    pub fn messages(&self) -> Vec<Message> {
        self.log
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .messages()
            .to_vec()
    }

    pub fn set_input(&self, text: &str) {
        *self.input.lock().unwrap_or_else(|e| e.into_inner()) = text.to_owned();
    }

    pub fn input(&self) -> String {
        self.input.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn clear_input(&self) {
        self.input.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn set_phase(&self, phase: SendPhase) {
        debug!(?phase, "send phase");
        self.phase.send_replace(phase);
    }

    pub fn camera_status(&self) -> CameraStatus {
        self.camera.status()
    }

    pub fn has_credential(&self) -> bool {
        self.gateway.has_credential()
    }

    /// Replace the API key used for inference.
    pub fn set_credential(&self, key: &str) -> bool {
        self.gateway.set_credential(key)
    }

    /// Send the current input buffer.
    pub async fn submit(&self) -> SendOutcome {
        let text = self.input();
        self.send(&text).await
    }

    /// Run one send-cycle for `text`.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.in_progress, &self.phase) else {
            debug!("send ignored, another send is in progress");
            return SendOutcome::Skipped(SkipReason::InProgress);
        };

        self.set_phase(SendPhase::Validating);
        let text = text.trim();
        let camera = self.camera.status();
        if text.is_empty() && !camera.is_active {
            return SendOutcome::Skipped(SkipReason::BlankInput);
        }
        if camera.is_active && camera.permission == Permission::Denied {
            warn!("send ignored, camera is on but permission is denied");
            return SendOutcome::Skipped(SkipReason::PermissionDenied);
        }

        let photo = if camera.is_active {
            self.set_phase(SendPhase::Capturing);
            match self.camera.capture_frame().await {
                Ok(image) => Some(image),
                Err(CameraError::EmptyFrame) => {
                    warn!("camera returned an empty frame, sending without a photo");
                    None
                }
                Err(e) => return self.fail_capture(text, e),
            }
        } else {
            None
        };

        let placeholder = {
            let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
            log.append_user(text, photo.clone());
            log.append_assistant(PROCESSING_MESSAGE)
        };
        self.clear_input();

        let emotion = match &photo {
            Some(image) => {
                self.set_phase(SendPhase::AwaitingClassification);
                Some(self.gateway.classify_emotion(image).await)
            }
            None => None,
        };
        let label = emotion.as_ref().map(|e| *e.value()).unwrap_or_default();

        self.set_phase(SendPhase::AwaitingReply);
        let prompt_text = if text.is_empty() { FALLBACK_GREETING } else { text };
        let reply = self.gateway.generate_reply(label, prompt_text).await;

        self.set_phase(SendPhase::Settling);
        self.log
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(placeholder, reply.value());

        info!(
            emotion = %label,
            with_photo = photo.is_some(),
            degraded = reply.is_degraded(),
            "send completed"
        );
        SendOutcome::Completed { emotion, reply }
    }

    fn fail_capture(&self, text: &str, error: CameraError) -> SendOutcome {
        warn!(error = %error, "capture failed during send");
        let message = if error.is_permission_denied() {
            CAMERA_ACCESS_ERROR_MESSAGE
        } else {
            DEFAULT_ERROR_MESSAGE
        };
        {
            let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
            log.append_user(text, None);
            log.append_assistant(message);
        }
        self.clear_input();
        SendOutcome::Failed(error)
    }

    /// Switch the camera on or off. Posts the permission notice once if
    /// access ends up denied.
    ///
    /// Returns whether the switch happened, not the new on/off state; read
    /// that from [`camera_status`](Self::camera_status).
    pub async fn toggle_camera(&self) -> bool {
        let active = self.camera.toggle().await;
        if self.camera.status().permission == Permission::Denied {
            self.notify_permission_denied();
        }
        active
    }

    fn notify_permission_denied(&self) {
        let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
        if !log.has_assistant_text(PERMISSION_DENIED_MARKER) {
            log.append_assistant(CAMERA_PERMISSION_DENIED_MESSAGE);
        }
    }

    /// True once there is more than the welcome message to export.
    pub fn can_download_history(&self) -> bool {
        export::can_export(self.log.read().unwrap_or_else(|e| e.into_inner()).messages())
    }

    /// Export the log to `dir` in the configured format.
    pub fn download_history(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        self.download_history_as(dir, self.settings.export_format)
    }

    /// Export the log to `dir` in `format`.
    pub fn download_history_as(&self, dir: &Path, format: HistoryFormat) -> Result<PathBuf, ExportError> {
        let messages = self.messages();
        export::write_history(&messages, dir, format, self.settings.locale, Utc::now())
    }

    /// Directory used when the caller does not name one.
    pub fn default_export_dir(&self) -> PathBuf {
        self.settings.resolved_export_dir()
    }
}

/// Image attached to the most recent user message, if any.
pub fn last_user_photo(messages: &[Message]) -> Option<&ImageHandle> {
    messages
        .iter()
        .rev()
        .find(|m| m.is_user)
        .and_then(|m| m.photo.as_ref())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::{Connector, Degradation, GatewayError, InferenceService, REPLY_FALLBACK_MESSAGE};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Camera whose status and capture result are set by the test.
    struct FakeCamera {
        status: Mutex<CameraStatus>,
        capture: Mutex<Result<ImageHandle, CameraError>>,
        deny_on_toggle: bool,
        captures: AtomicUsize,
    }

    impl FakeCamera {
        fn new(is_active: bool, permission: Permission) -> Arc<Self> {
            Arc::new(Self {
                status: Mutex::new(CameraStatus {
                    is_active,
                    permission,
                    is_capturing: false,
                }),
                capture: Mutex::new(Ok(photo())),
                deny_on_toggle: false,
                captures: AtomicUsize::new(0),
            })
        }

        fn denying() -> Arc<Self> {
            Arc::new(Self {
                status: Mutex::new(CameraStatus::default()),
                capture: Mutex::new(Err(CameraError::NotActive)),
                deny_on_toggle: true,
                captures: AtomicUsize::new(0),
            })
        }

        fn set_capture(&self, result: Result<ImageHandle, CameraError>) {
            *self.capture.lock().unwrap() = result;
        }
    }

    #[async_trait]
    impl CameraControl for FakeCamera {
        fn status(&self) -> CameraStatus {
            *self.status.lock().unwrap()
        }

        async fn check_permission(&self) -> bool {
            !self.deny_on_toggle
        }

        async fn toggle(&self) -> bool {
            let mut status = self.status.lock().unwrap();
            if self.deny_on_toggle {
                *status = CameraStatus {
                    is_active: false,
                    permission: Permission::Denied,
                    is_capturing: false,
                };
                return false;
            }
            status.is_active = !status.is_active;
            status.permission = Permission::Granted;
            true
        }

        async fn capture_frame(&self) -> Result<ImageHandle, CameraError> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            self.capture.lock().unwrap().clone()
        }
    }

    /// Service that labels every image "happy" and echoes the prompt's
    /// quoted message.
    struct EchoService {
        delay: Option<Duration>,
        prompts: Arc<Mutex<Vec<String>>>,
        classify_calls: Arc<AtomicUsize>,
        fail_generate: bool,
    }

    #[async_trait]
    impl InferenceService for EchoService {
        async fn classify(&self, _image: &[u8], _mime: &str, _instruction: &str) -> Result<String, GatewayError> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            Ok("Happy".into())
        }

        async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.prompts.lock().unwrap().push(prompt.to_owned());
            if self.fail_generate {
                return Err(GatewayError::Http {
                    status: 503,
                    message: "overloaded".into(),
                });
            }
            Ok("echo reply".into())
        }
    }

    struct Harness {
        prompts: Arc<Mutex<Vec<String>>>,
        classify_calls: Arc<AtomicUsize>,
    }

    fn gateway(key: Option<&str>, delay: Option<Duration>, fail_generate: bool) -> (Arc<InferenceGateway>, Harness) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let classify_calls = Arc::new(AtomicUsize::new(0));
        let harness = Harness {
            prompts: Arc::clone(&prompts),
            classify_calls: Arc::clone(&classify_calls),
        };
        let connector: Connector = Arc::new(move |_config: &GatewayConfig, _key: &str| {
            Arc::new(EchoService {
                delay,
                prompts: Arc::clone(&prompts),
                classify_calls: Arc::clone(&classify_calls),
                fail_generate,
            }) as Arc<dyn InferenceService>
        });
        let config = GatewayConfig {
            api_key: key.map(str::to_owned),
            api_key_env: "MOODCAM_TEST_UNSET_KEY_VAR".into(),
            ..GatewayConfig::default()
        };
        (Arc::new(InferenceGateway::with_connector(config, connector)), harness)
    }

    fn photo() -> ImageHandle {
        ImageHandle::new(vec![0xFF, 0xD8, 0xFF, 0xD9], "image/jpeg", 2, 2)
    }

    fn conversation(camera: Arc<FakeCamera>) -> (Conversation, Harness) {
        let (gateway, harness) = gateway(Some("test-key"), None, false);
        (Conversation::new(camera, gateway, SessionConfig::default()), harness)
    }

    fn texts(conv: &Conversation) -> Vec<String> {
        conv.messages().iter().map(|m| m.text_or_empty().to_owned()).collect()
    }

    #[test]
    fn starts_with_welcome_only_when_key_present() {
        let (conv, _) = conversation(FakeCamera::new(false, Permission::Unknown));
        assert_eq!(texts(&conv), vec![DEFAULT_WELCOME_MESSAGE.to_owned()]);
        assert!(!conv.can_download_history());
        assert_eq!(conv.phase(), SendPhase::Idle);
    }

    #[test]
    fn missing_key_notice_follows_welcome() {
        let (gateway, _) = gateway(None, None, false);
        let conv = Conversation::new(
            FakeCamera::new(false, Permission::Unknown),
            gateway,
            SessionConfig::default(),
        );
        assert_eq!(
            texts(&conv),
            vec![DEFAULT_WELCOME_MESSAGE.to_owned(), API_KEY_MISSING_MESSAGE.to_owned()]
        );
    }

    #[tokio::test]
    async fn blank_text_with_camera_off_is_noop() {
        let (conv, harness) = conversation(FakeCamera::new(false, Permission::Unknown));
        conv.set_input("   ");

        assert_eq!(conv.submit().await, SendOutcome::Skipped(SkipReason::BlankInput));
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.phase(), SendPhase::Idle);
        assert_eq!(conv.input(), "   ");
        assert!(harness.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_only_send_adds_user_message_and_reply() {
        let camera = FakeCamera::new(false, Permission::Unknown);
        let (conv, harness) = conversation(Arc::clone(&camera));
        conv.set_input("  Hi ");

        let outcome = conv.submit().await;

        assert_eq!(
            outcome,
            SendOutcome::Completed {
                emotion: None,
                reply: Inference::Live("echo reply".into()),
            }
        );
        let messages = conv.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[1].is_user);
        assert_eq!(messages[1].text.as_deref(), Some("Hi"));
        assert!(!messages[1].has_photo());
        assert!(!messages[2].is_user);
        assert_eq!(messages[2].text.as_deref(), Some("echo reply"));
        assert!(!texts(&conv).contains(&PROCESSING_MESSAGE.to_owned()));

        assert_eq!(conv.input(), "");
        assert_eq!(camera.captures.load(Ordering::SeqCst), 0);
        assert_eq!(harness.classify_calls.load(Ordering::SeqCst), 0);
        let prompts = harness.prompts.lock().unwrap();
        assert!(prompts[0].contains("expressing: neutral"));
        assert!(prompts[0].contains("\"Hi\""));
        assert!(conv.can_download_history());
    }

    #[tokio::test]
    async fn active_camera_with_denied_permission_skips_silently() {
        let camera = FakeCamera::new(true, Permission::Denied);
        let (conv, _) = conversation(Arc::clone(&camera));

        let outcome = conv.send("Hi").await;

        assert_eq!(outcome, SendOutcome::Skipped(SkipReason::PermissionDenied));
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.phase(), SendPhase::Idle);
        assert_eq!(camera.captures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn photo_send_classifies_and_uses_greeting_for_blank_text() {
        let camera = FakeCamera::new(true, Permission::Granted);
        let (conv, harness) = conversation(Arc::clone(&camera));

        let outcome = conv.send("").await;

        let SendOutcome::Completed { emotion, reply } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(emotion, Some(Inference::Live(EmotionLabel::Happy)));
        assert_eq!(reply.value(), "echo reply");

        let messages = conv.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[1].is_user);
        assert!(messages[1].text.is_none());
        assert_eq!(messages[1].photo.as_ref(), Some(&photo()));
        assert_eq!(last_user_photo(&messages), Some(&photo()));

        assert_eq!(harness.classify_calls.load(Ordering::SeqCst), 1);
        let prompts = harness.prompts.lock().unwrap();
        assert!(prompts[0].contains("expressing: happy"));
        assert!(prompts[0].contains("\"Hello\""));
    }

    #[tokio::test]
    async fn empty_frame_sends_without_photo() {
        let camera = FakeCamera::new(true, Permission::Granted);
        camera.set_capture(Err(CameraError::EmptyFrame));
        let (conv, harness) = conversation(Arc::clone(&camera));

        let outcome = conv.send("look").await;

        assert!(matches!(outcome, SendOutcome::Completed { emotion: None, .. }));
        let messages = conv.messages();
        assert_eq!(messages.len(), 3);
        assert!(!messages[1].has_photo());
        assert_eq!(harness.classify_calls.load(Ordering::SeqCst), 0);
        assert!(harness.prompts.lock().unwrap()[0].contains("expressing: neutral"));
    }

    #[tokio::test]
    async fn capture_failure_posts_error_and_releases_flag() {
        let camera = FakeCamera::new(true, Permission::Granted);
        camera.set_capture(Err(CameraError::CaptureFailed("device busy".into())));
        let (conv, harness) = conversation(Arc::clone(&camera));
        conv.set_input("hello");

        let outcome = conv.submit().await;

        assert_eq!(
            outcome,
            SendOutcome::Failed(CameraError::CaptureFailed("device busy".into()))
        );
        let messages = conv.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[1].is_user);
        assert_eq!(messages[1].text.as_deref(), Some("hello"));
        assert!(!messages[1].has_photo());
        assert_eq!(messages[2].text.as_deref(), Some(DEFAULT_ERROR_MESSAGE));
        assert_eq!(conv.input(), "");
        assert!(!conv.is_sending());
        assert_eq!(conv.phase(), SendPhase::Idle);
        assert!(harness.prompts.lock().unwrap().is_empty());

        camera.set_capture(Ok(photo()));
        assert!(matches!(conv.send("again").await, SendOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn capture_permission_denied_uses_access_message() {
        let camera = FakeCamera::new(true, Permission::Granted);
        camera.set_capture(Err(CameraError::PermissionDenied));
        let (conv, _) = conversation(camera);

        let outcome = conv.send("hi").await;

        assert_eq!(outcome, SendOutcome::Failed(CameraError::PermissionDenied));
        let last = conv.messages().pop().unwrap();
        assert_eq!(last.text.as_deref(), Some(CAMERA_ACCESS_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn degraded_reply_still_replaces_placeholder() {
        let (gateway, _) = gateway(Some("k"), None, true);
        let conv = Conversation::new(
            FakeCamera::new(false, Permission::Unknown),
            gateway,
            SessionConfig::default(),
        );

        let SendOutcome::Completed { reply, .. } = conv.send("Hi").await else {
            panic!("expected completed outcome");
        };
        assert!(matches!(reply.degradation(), Some(Degradation::Failed(_))));
        assert_eq!(texts(&conv).last().unwrap(), REPLY_FALLBACK_MESSAGE);
        assert_eq!(conv.messages().len(), 3);
    }

    #[tokio::test]
    async fn concurrent_send_is_skipped() {
        let (gateway, _) = gateway(Some("k"), Some(Duration::from_millis(200)), false);
        let conv = Conversation::new(
            FakeCamera::new(false, Permission::Unknown),
            gateway,
            SessionConfig::default(),
        );

        let second = async {
            tokio::task::yield_now().await;
            let phase = conv.phase();
            (phase, conv.send("second").await)
        };
        let (first, (phase_during, second)) = tokio::join!(conv.send("first"), second);

        assert!(matches!(first, SendOutcome::Completed { .. }));
        assert_eq!(phase_during, SendPhase::AwaitingReply);
        assert_eq!(second, SendOutcome::Skipped(SkipReason::InProgress));
        assert_eq!(conv.messages().len(), 3);
        assert_eq!(conv.phase(), SendPhase::Idle);
    }

    #[tokio::test]
    async fn placeholder_is_replaced_by_identity() {
        let (gateway, _) = gateway(Some("k"), Some(Duration::from_millis(100)), false);
        let conv = Conversation::new(
            FakeCamera::new(false, Permission::Unknown),
            gateway,
            SessionConfig::default(),
        );
        let log = conv.log();

        let notifier = async {
            tokio::task::yield_now().await;
            log.write().unwrap().append_assistant("side notice");
        };
        let (outcome, ()) = tokio::join!(conv.send("Hi"), notifier);

        assert!(matches!(outcome, SendOutcome::Completed { .. }));
        assert_eq!(
            texts(&conv),
            vec![
                DEFAULT_WELCOME_MESSAGE.to_owned(),
                "Hi".to_owned(),
                "side notice".to_owned(),
                "echo reply".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn phase_subscription_returns_to_idle() {
        let (conv, _) = conversation(FakeCamera::new(false, Permission::Unknown));
        let mut rx = conv.subscribe_phase();

        conv.send("Hi").await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SendPhase::Idle);
    }

    #[tokio::test]
    async fn denied_toggle_posts_notice_once() {
        let (conv, _) = conversation(FakeCamera::denying());

        assert!(!conv.toggle_camera().await);
        assert!(!conv.toggle_camera().await);

        let notices = texts(&conv)
            .iter()
            .filter(|t| t.as_str() == CAMERA_PERMISSION_DENIED_MESSAGE)
            .count();
        assert_eq!(notices, 1);
        assert_eq!(conv.camera_status().permission, Permission::Denied);
        assert!(!conv.camera_status().is_active);
    }

    #[tokio::test]
    async fn toggle_twice_restores_state() {
        let (conv, _) = conversation(FakeCamera::new(false, Permission::Granted));
        assert!(conv.toggle_camera().await);
        assert!(conv.camera_status().is_active);
        // switching off also succeeds
        assert!(conv.toggle_camera().await);
        assert!(!conv.camera_status().is_active);
        assert_eq!(conv.messages().len(), 1);
    }

    #[tokio::test]
    async fn set_credential_enables_live_replies() {
        let (gateway, _) = gateway(None, None, false);
        let conv = Conversation::new(
            FakeCamera::new(false, Permission::Unknown),
            gateway,
            SessionConfig::default(),
        );

        let SendOutcome::Completed { reply, .. } = conv.send("Hi").await else {
            panic!("expected completed outcome");
        };
        assert_eq!(reply.degradation(), Some(&Degradation::MissingCredential));

        assert!(!conv.set_credential("  "));
        assert!(conv.set_credential("fresh"));
        let SendOutcome::Completed { reply, .. } = conv.send("Hi").await else {
            panic!("expected completed outcome");
        };
        assert_eq!(reply, Inference::Live("echo reply".into()));
    }

    #[tokio::test]
    async fn download_history_writes_configured_format() {
        let dir = tempfile::tempdir().unwrap();
        let (conv, _) = conversation(FakeCamera::new(false, Permission::Unknown));

        assert!(matches!(
            conv.download_history(dir.path()),
            Err(ExportError::NothingToExport)
        ));

        conv.send("Hi").await;
        let path = conv.download_history(dir.path()).unwrap();
        assert!(path.to_string_lossy().ends_with(".json"));

        let content = std::fs::read_to_string(&path).unwrap();
        let entries = export::parse_history(HistoryFormat::Json, Default::default(), &content).unwrap();
        let tuples: Vec<_> = entries.iter().map(|e| (e.is_user, e.text.clone())).collect();
        assert_eq!(
            tuples,
            vec![
                (false, Some(DEFAULT_WELCOME_MESSAGE.to_owned())),
                (true, Some("Hi".to_owned())),
                (false, Some("echo reply".to_owned())),
            ]
        );
    }
}
