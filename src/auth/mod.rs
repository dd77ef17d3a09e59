//! Device authorization and token lifecycle.
//!
//! - `state`: single-use CSRF state tokens with TTL
//! - `provider` / `exchange`: OAuth client identity and token endpoint calls
//! - `flow`: initiate / callback transitions
//! - `gate`: valid-token access with transparent refresh

mod exchange;
mod flow;
mod gate;
mod provider;
mod state;

pub use exchange::{TokenClient, TokenResponse};
pub use flow::{validate_device_id, AuthFlow, CallbackOutcome, CallbackParams, MAX_DEVICE_ID_LEN};
pub use gate::{AccessGate, DeviceStatus};
pub use provider::OAuthClientConfig;
pub use state::{AuthStateCache, AuthStateEntry, MAX_STATE_TTL_SECS};
