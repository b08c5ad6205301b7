//! Destination address: model, validation, remote source and resolver.

pub mod model;
pub mod remote;
pub mod resolver;
pub mod validate;

pub use model::{Provenance, TargetAddress};
pub use remote::{FetchStatus, HttpRemoteConfig, RemoteConfigSource, REMOTE_TARGET_KEY};
pub use resolver::{spawn_refresh_ticker, ConfigResolver, DEFAULT_MIN_FETCH_INTERVAL, TARGET_KEY};
pub use validate::validate_phone_number;
