//! Inference gateway: total wrappers around the remote emotion and reply calls.
//!
//! The remote service is reached through the [`InferenceService`] trait.
//! [`InferenceGateway`] owns the credential, bounds each call with a timeout,
//! and never returns an error: every call yields an [`Inference`] that is
//! either a live answer or a degraded fallback with the reason attached.
//!
//! ```rust,no_run
//! use moodcam::config::GatewayConfig;
//! use moodcam::gateway::{EmotionLabel, InferenceGateway};
//!
//! # async fn example() {
//! let gateway = InferenceGateway::new(GatewayConfig::default());
//! let reply = gateway.generate_reply(EmotionLabel::Neutral, "Hi").await;
//! println!("{}", reply.value());
//! # }
//! ```

pub mod emotion;
pub mod error;
pub mod gemini;
pub mod prompt;

pub use emotion::{EmotionLabel, normalize};
pub use error::GatewayError;
pub use gemini::GeminiClient;
pub use prompt::{API_KEY_MISSING_MESSAGE, REPLY_FALLBACK_MESSAGE};

use crate::camera::ImageHandle;
use crate::config::GatewayConfig;
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The two remote operations, as an opaque service.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Send image bytes plus one instruction; return the raw model text.
    async fn classify(
        &self,
        image: &[u8],
        mime_type: &str,
        instruction: &str,
    ) -> Result<String, GatewayError>;

    /// Send one composed instruction; return the raw model text.
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}

/// Builds a service for a credential. Called at startup and on every
/// [`InferenceGateway::set_credential`].
pub type Connector = Arc<dyn Fn(&GatewayConfig, &str) -> Arc<dyn InferenceService> + Send + Sync>;

/// Why a gateway call fell back to its default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// No credential was configured; no request was made.
    MissingCredential,
    /// The call exceeded the gateway deadline.
    Timeout(Duration),
    /// The service returned an error.
    Failed(GatewayError),
}

impl Degradation {
    /// True when the fallback came from a missing or rejected API key, as
    /// opposed to an outage the user cannot fix.
    pub fn is_credential_problem(&self) -> bool {
        match self {
            Self::MissingCredential => true,
            Self::Failed(e) => e.is_auth_failure(),
            Self::Timeout(_) => false,
        }
    }
}

/// Outcome of a gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference<T> {
    /// The service answered.
    Live(T),
    /// The service was unavailable; `value` is the fallback.
    Degraded { value: T, reason: Degradation },
}

impl<T> Inference<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Live(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Live(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn degradation(&self) -> Option<&Degradation> {
        match self {
            Self::Live(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Credential-holding front door to the inference service.
pub struct InferenceGateway {
    config: GatewayConfig,
    connector: Connector,
    service: RwLock<Option<Arc<dyn InferenceService>>>,
}

impl std::fmt::Debug for InferenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceGateway")
            .field("model", &self.config.model)
            .field("has_credential", &self.has_credential())
            .finish()
    }
}

impl InferenceGateway {
    /// Gateway backed by [`GeminiClient`], with the credential resolved from
    /// config or environment.
    pub fn new(config: GatewayConfig) -> Self {
        let connector: Connector =
            Arc::new(|config: &GatewayConfig, key: &str| {
                Arc::new(GeminiClient::new(config, key)) as Arc<dyn InferenceService>
            });
        Self::with_connector(config, connector)
    }

    /// Gateway with a custom service factory.
    pub fn with_connector(config: GatewayConfig, connector: Connector) -> Self {
        let service = config.resolve_api_key().map(|key| connector(&config, &key));
        info!(
            model = %config.model,
            has_credential = service.is_some(),
            "inference gateway initialized"
        );
        Self {
            config,
            connector,
            service: RwLock::new(service),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn has_credential(&self) -> bool {
        self.current_service().is_some()
    }

    /// Replace the credential and rebuild the service.
    ///
    /// Returns `false` (and keeps the old credential) for blank input. No
    /// network validation happens here; a bad key shows up on first use.
    pub fn set_credential(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            warn!("refusing to set an empty API key");
            return false;
        }
        let service = (self.connector)(&self.config, key);
        *self.service.write().unwrap_or_else(|e| e.into_inner()) = Some(service);
        info!("API key updated");
        true
    }

    fn current_service(&self) -> Option<Arc<dyn InferenceService>> {
        self.service
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn bounded<F>(&self, op: &'static str, call: F) -> Result<String, Degradation>
    where
        F: Future<Output = Result<String, GatewayError>>,
    {
        let deadline = self.config.request_timeout();
        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) if e.is_auth_failure() => {
                warn!(op, error = %e, "API key rejected by the inference service");
                Err(Degradation::Failed(e))
            }
            Ok(Err(e)) => {
                warn!(op, code = e.code(), error = %e, "inference call failed");
                Err(Degradation::Failed(e))
            }
            Err(_) => {
                warn!(op, ?deadline, "inference call timed out");
                Err(Degradation::Timeout(deadline))
            }
        }
    }

    /// Classify the emotion shown in `image`. Falls back to neutral.
    pub async fn classify_emotion(&self, image: &ImageHandle) -> Inference<EmotionLabel> {
        let Some(service) = self.current_service() else {
            warn!("no API key configured, skipping emotion detection");
            return Inference::Degraded {
                value: EmotionLabel::Neutral,
                reason: Degradation::MissingCredential,
            };
        };

        debug!(bytes = image.len(), mime = image.mime_type(), "detecting emotion");
        let call = service.classify(image.bytes(), image.mime_type(), prompt::CLASSIFY_INSTRUCTION);
        match self.bounded("classify", call).await {
            Ok(raw) => {
                let label = normalize(&raw);
                info!(raw = %raw.trim(), emotion = %label, "emotion detected");
                Inference::Live(label)
            }
            Err(reason) => Inference::Degraded {
                value: EmotionLabel::Neutral,
                reason,
            },
        }
    }

    /// Generate a reply to `text` pitched for `emotion`.
    pub async fn generate_reply(&self, emotion: EmotionLabel, text: &str) -> Inference<String> {
        let Some(service) = self.current_service() else {
            warn!("no API key configured, returning setup instructions");
            return Inference::Degraded {
                value: prompt::missing_credential_reply(),
                reason: Degradation::MissingCredential,
            };
        };

        let prompt = prompt::build_reply_prompt(emotion, text);
        debug!(%emotion, "generating reply");
        match self.bounded("generate", service.generate(&prompt)).await {
            Ok(reply) => Inference::Live(reply.trim().to_owned()),
            Err(reason) => Inference::Degraded {
                value: REPLY_FALLBACK_MESSAGE.to_owned(),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Mutex;

    /// Scripted service recording the key it was built with.
    struct ScriptedService {
        key: String,
        classify: Result<String, GatewayError>,
        generate: Result<String, GatewayError>,
        delay: Option<Duration>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl InferenceService for ScriptedService {
        async fn classify(
            &self,
            _image: &[u8],
            _mime_type: &str,
            _instruction: &str,
        ) -> Result<String, GatewayError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.classify.clone()
        }

        async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.prompts.lock().unwrap().push(prompt.to_owned());
            self.generate.clone().map(|r| format!("{r} [key={}]", self.key))
        }
    }

    fn config(key: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            api_key: key.map(str::to_owned),
            api_key_env: "MOODCAM_TEST_UNSET_KEY_VAR".into(),
            request_timeout_secs: 1,
            ..GatewayConfig::default()
        }
    }

    fn scripted(
        classify: Result<String, GatewayError>,
        generate: Result<String, GatewayError>,
        delay: Option<Duration>,
    ) -> (Connector, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&prompts);
        let connector: Connector = Arc::new(move |_config: &GatewayConfig, key: &str| {
            Arc::new(ScriptedService {
                key: key.to_owned(),
                classify: classify.clone(),
                generate: generate.clone(),
                delay,
                prompts: Arc::clone(&seen),
            }) as Arc<dyn InferenceService>
        });
        (connector, prompts)
    }

    fn image() -> ImageHandle {
        ImageHandle::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg", 1, 1)
    }

    #[tokio::test]
    async fn generate_without_credential_returns_instructions() {
        let (connector, prompts) = scripted(Ok("x".into()), Ok("x".into()), None);
        let gateway = InferenceGateway::with_connector(config(None), connector);

        let reply = gateway.generate_reply(EmotionLabel::Neutral, "Hi").await;
        assert_eq!(reply.degradation(), Some(&Degradation::MissingCredential));
        assert!(reply.value().contains("API Key Missing"));
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn classify_without_credential_is_neutral() {
        let (connector, _) = scripted(Ok("furious".into()), Ok("x".into()), None);
        let gateway = InferenceGateway::with_connector(config(None), connector);

        let emotion = gateway.classify_emotion(&image()).await;
        assert_eq!(*emotion.value(), EmotionLabel::Neutral);
        assert!(emotion.is_degraded());
    }

    #[tokio::test]
    async fn classify_normalizes_live_answer() {
        let (connector, _) = scripted(Ok("  Furious!\n".into()), Ok("x".into()), None);
        let gateway = InferenceGateway::with_connector(config(Some("k")), connector);

        assert_eq!(
            gateway.classify_emotion(&image()).await,
            Inference::Live(EmotionLabel::Angry)
        );
    }

    #[tokio::test]
    async fn classify_failure_degrades_to_neutral() {
        let err = GatewayError::Request("connection refused".into());
        let (connector, _) = scripted(Err(err.clone()), Ok("x".into()), None);
        let gateway = InferenceGateway::with_connector(config(Some("k")), connector);

        assert_eq!(
            gateway.classify_emotion(&image()).await,
            Inference::Degraded {
                value: EmotionLabel::Neutral,
                reason: Degradation::Failed(err),
            }
        );
    }

    #[tokio::test]
    async fn generate_trims_and_sends_composed_prompt() {
        let (connector, prompts) = scripted(Ok("x".into()), Ok("  Hey!  ".into()), None);
        let gateway = InferenceGateway::with_connector(config(Some("k")), connector);

        let reply = gateway.generate_reply(EmotionLabel::Happy, "I got the job").await;
        assert_eq!(reply, Inference::Live("Hey!   [key=k]".to_owned()));

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("expressing: happy"));
        assert!(prompts[0].contains("\"I got the job\""));
    }

    #[tokio::test]
    async fn rejected_key_is_a_credential_problem() {
        let err = GatewayError::Http {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".into(),
        };
        let (connector, _) = scripted(Ok("x".into()), Err(err), None);
        let gateway = InferenceGateway::with_connector(config(Some("k")), connector);

        let reply = gateway.generate_reply(EmotionLabel::Neutral, "Hi").await;
        assert_eq!(reply.value(), REPLY_FALLBACK_MESSAGE);
        assert!(reply.degradation().unwrap().is_credential_problem());
        assert!(Degradation::MissingCredential.is_credential_problem());
        assert!(!Degradation::Timeout(Duration::from_secs(1)).is_credential_problem());
    }

    #[tokio::test]
    async fn generate_failure_returns_apology() {
        let err = GatewayError::Http {
            status: 500,
            message: "boom".into(),
        };
        let (connector, _) = scripted(Ok("x".into()), Err(err), None);
        let gateway = InferenceGateway::with_connector(config(Some("k")), connector);

        let reply = gateway.generate_reply(EmotionLabel::Neutral, "Hi").await;
        assert!(reply.is_degraded());
        assert_eq!(reply.value(), REPLY_FALLBACK_MESSAGE);
        assert!(!reply.degradation().unwrap().is_credential_problem());
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let (connector, _) = scripted(
            Ok("happy".into()),
            Ok("late".into()),
            Some(Duration::from_secs(5)),
        );
        let gateway = InferenceGateway::with_connector(config(Some("k")), connector);

        let reply = gateway.generate_reply(EmotionLabel::Neutral, "Hi").await;
        assert_eq!(
            reply.degradation(),
            Some(&Degradation::Timeout(Duration::from_secs(1)))
        );
        assert_eq!(reply.value(), REPLY_FALLBACK_MESSAGE);

        let emotion = gateway.classify_emotion(&image()).await;
        assert_eq!(*emotion.value(), EmotionLabel::Neutral);
    }

    #[tokio::test]
    async fn set_credential_rejects_blank_and_rebuilds_service() {
        let (connector, _) = scripted(Ok("x".into()), Ok("ok".into()), None);
        let gateway = InferenceGateway::with_connector(config(None), connector);
        assert!(!gateway.has_credential());

        assert!(!gateway.set_credential(""));
        assert!(!gateway.set_credential("   \t"));
        assert!(!gateway.has_credential());

        assert!(gateway.set_credential("  new-key  "));
        assert!(gateway.has_credential());
        let reply = gateway.generate_reply(EmotionLabel::Neutral, "Hi").await;
        assert_eq!(reply.into_value(), "ok [key=new-key]");
    }
}
