//! gamelink auth - Cross-device pairing and device credentials
//!
//! Lets a device without a browser (a game client, a console) sign in as a
//! user who approves it from a browser where they are already signed in.
//!
//! # Pairing Flow
//!
//! 1. Device calls `PairingService::create_request()` and keeps the polling secret
//! 2. Device shows the pairing URL (`/game?id=<request id>`) to the user
//! 3. Signed-in user opens the URL and confirms; the server calls `approve()`
//! 4. Device calls `poll_state()` with its secret until it sees an approval ID
//! 5. Device calls `exchange()` with the approval ID and the same secret and
//!    receives a credential ID and credential secret
//! 6. Device sends the credential on every call; the server checks it with
//!    `authenticate_credential()`
//!
//! # Example
//!
//! ```no_run
//! use gamelink_auth::{PairingService, PairingStorage, TokenCodec, User};
//! use gamelink_core::HashCost;
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let storage = Arc::new(PairingStorage::new().await.unwrap());
//!     let codec = TokenCodec::new(HashCost::default()).unwrap();
//!     let service = PairingService::new(storage, codec);
//!
//!     // Device side
//!     let created = service.create_request().await.unwrap();
//!     let id = created.request.id.clone();
//!
//!     // Browser side, once the user confirms
//!     let approval = service.approve(&id, &User::new("u1", "alice")).await.unwrap();
//!
//!     // Device side again
//!     let issued = service
//!         .exchange(&approval.id, created.secret.expose())
//!         .await
//!         .unwrap();
//!     println!("Paired as {}", issued.user.username);
//! }
//! ```

pub mod clock;
pub mod model;
pub mod pairing;
pub mod session;
pub mod storage;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use model::{
    ApprovalId, ApprovalRecord, CredentialId, PairingApproval, PairingCredential, PairingRequest,
    RequestId, RequestRecord,
};
pub use pairing::{
    AuthenticatedDevice, IssuedCredential, NewPairing, Pairing, PairingError, PairingPolicy,
    PairingResult, PairingService, PairingStatus, APPROVAL_VALIDITY_SECONDS,
    REQUEST_VALIDITY_SECONDS,
};
pub use session::{SessionAuthenticator, StaticSessions, User};
pub use storage::{PairingStorage, PairingStore, StorageError, StorageResult};
pub use token::{Secret, TokenCodec, TokenError, TokenResult, SECRET_LENGTH};
