//! Identity and request signing for the federated repository.
//!
//! [`actor_representation`] turns a domain account into the wire actor the
//! protocol endpoint expects. [`RequestSigner`] binds an account's credentials
//! to outgoing requests: local accounts send their OAuth bearer token, federated
//! accounts sign `(request-target) host date` with their RSA key, and anonymous
//! callers send nothing.

pub mod error;
pub mod identity;
pub mod signer;

pub use error::{SignError, SignResult};
pub use identity::{actor_iri, actor_representation, anonymous_actor, key_id, profile_url};
pub use signer::{key_material_from_pem, HttpSigner, RequestSigner, SIGNED_HEADERS};
