//! moodcam: a conversational client that reads the room.
//!
//! Each message can carry a still frame from the camera. The frame is sent
//! to a multimodal inference service to classify the user's emotion, and the
//! reply is then generated with that emotion in mind:
//!
//! Camera → JPEG frame → emotion label → reply prompt → assistant message
//!
//! # Architecture
//!
//! - **Camera** ([`camera`]): permission state machine, stream backends and
//!   one-shot frame capture.
//! - **Gateway** ([`gateway`]): total wrappers around the Gemini
//!   classification and generation calls, with degraded fallbacks.
//! - **Conversation** ([`conversation`]): the send pipeline that ties the two
//!   together and keeps the message log.
//! - **Session** ([`session`]): the message log and history export.

pub mod camera;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod session;

pub use config::ChatConfig;
pub use conversation::{Conversation, SendOutcome, SendPhase, SkipReason};
pub use error::{ChatError, Result};
pub use gateway::{EmotionLabel, Inference, InferenceGateway};
pub use session::{Message, MessageId, MessageLog};
