//! Client-side authentication session management.
//!
//! This crate provides:
//! - An explicit FSM for session state ([`session_fsm`])
//! - A write-through [`TokenStore`] with single-flight token refresh
//! - An [`AuthenticatedClient`] that attaches credentials and recovers from 401s
//! - A [`RequestRegistry`] for cancelling in-flight requests individually or en masse
//! - An [`EffectPipeline`] sequencing session events and their side effects

mod client;
mod error;
mod location;
mod pipeline;
mod redirect;
mod refresh;
mod request_registry;
mod runtime;
mod services;
pub mod session_fsm;
mod token_store;
mod transport;

pub use client::{AuthenticatedClient, PendingResponse};
pub use error::{AuthError, AuthResult};
pub use location::{PageLocation, ACCESS_TOKEN_PARAM};
pub use pipeline::{EffectPipeline, EventDispatcher, PipelineContext, SessionEvent};
pub use redirect::{Navigator, RecordingRedirector, RedirectKind, Redirector, UrlRedirector};
pub use refresh::RefreshGate;
pub use request_registry::{
    Registration, RequestHandle, RequestId, RequestRegistry, RequestScope, CANCEL_ALL_REASON,
    DEFAULT_CANCEL_REASON, SCOPE_DROPPED_REASON,
};
pub use runtime::{SessionCollaborators, SessionRuntime};
pub use services::{HttpProfileService, HttpTokenService, ProfileService, TokenService};
pub use session_fsm::{SessionInput, SessionMachine, SessionState, SessionStatus};
pub use token_store::{SessionStateCallback, SessionView, TokenStore};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

pub use session_storage::{SessionSnapshot, Token, UserInfo};
