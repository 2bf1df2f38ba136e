//! Game login pairing state machine
//!
//! Implements the pairing flow:
//! 1. Device creates a pairing request and receives a polling secret
//! 2. A signed-in user opens the pairing link and approves the request
//! 3. Device polls with its secret until the request shows an approval
//! 4. Device exchanges the approval, proving its polling secret, for a credential
//! 5. Credential ID and secret authenticate every later device call
//!
//! Requests and approvals expire; expiry is checked whenever they are read.

use crate::clock::{Clock, SystemClock};
use crate::model::{
    ApprovalId, CredentialId, PairingApproval, PairingCredential, PairingRequest, RequestId,
    RequestRecord,
};
use crate::session::User;
use crate::storage::{PairingStore, StorageError};
use crate::token::{Secret, TokenCodec, TokenError};
use chrono::{DateTime, Duration, Utc};
use gamelink_core::{Config, PairingStateKind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default pairing request validity in seconds
pub const REQUEST_VALIDITY_SECONDS: i64 = 300;

/// Default approval validity in seconds
pub const APPROVAL_VALIDITY_SECONDS: i64 = 300;

/// Pairing errors
#[derive(Debug, Error)]
pub enum PairingError {
    /// Unknown ID, or a secret that does not verify
    #[error("Pairing not found")]
    NotFound,
    #[error("Pairing has expired")]
    Expired,
    #[error("Pairing was already used")]
    AlreadyUsed,
    #[error("Invalid device credentials")]
    Unauthorized,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Token error: {0}")]
    Token(#[from] TokenError),
    /// A configured lifetime pushes the expiry past the representable range
    #[error("Pairing lifetime out of range")]
    LifetimeOverflow,
}

impl PairingError {
    /// Failures of the store or codec rather than of the caller
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            PairingError::Storage(_) | PairingError::Token(_) | PairingError::LifetimeOverflow
        )
    }
}

pub type PairingResult<T> = Result<T, PairingError>;

/// Lifetimes of the two expiring stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingPolicy {
    pub request_ttl: Duration,
    pub approval_ttl: Duration,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            request_ttl: Duration::seconds(REQUEST_VALIDITY_SECONDS),
            approval_ttl: Duration::seconds(APPROVAL_VALIDITY_SECONDS),
        }
    }
}

impl PairingPolicy {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            request_ttl: ttl_from_secs(config.request_ttl_secs).unwrap_or(defaults.request_ttl),
            approval_ttl: ttl_from_secs(config.approval_ttl_secs)
                .unwrap_or(defaults.approval_ttl),
        }
    }
}

fn ttl_from_secs(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Where a pairing stands, derived from which links are set
#[derive(Debug, Clone)]
pub enum Pairing {
    Pending,
    Approved(PairingApproval),
    Exchanged {
        approval: PairingApproval,
        credential_id: CredentialId,
    },
}

impl Pairing {
    fn from_record(record: &RequestRecord) -> PairingResult<Self> {
        match (&record.request.approval_id, &record.approval) {
            (None, _) => Ok(Pairing::Pending),
            (Some(approval_id), None) => {
                Err(StorageError::NotFound(approval_id.to_string()).into())
            }
            (Some(_), Some(approval)) => Ok(match &approval.credential_id {
                None => Pairing::Approved(approval.clone()),
                Some(credential_id) => Pairing::Exchanged {
                    approval: approval.clone(),
                    credential_id: credential_id.clone(),
                },
            }),
        }
    }

    pub fn kind(&self) -> PairingStateKind {
        match self {
            Pairing::Pending => PairingStateKind::Pending,
            Pairing::Approved(_) => PairingStateKind::Approved,
            Pairing::Exchanged { .. } => PairingStateKind::Exchanged,
        }
    }

    pub fn approval(&self) -> Option<&PairingApproval> {
        match self {
            Pairing::Pending => None,
            Pairing::Approved(approval) | Pairing::Exchanged { approval, .. } => Some(approval),
        }
    }

    /// The approving user, once there is one
    pub fn approver(&self) -> Option<User> {
        self.approval().map(PairingApproval::user)
    }
}

/// A freshly created request and its polling secret
#[derive(Debug)]
pub struct NewPairing {
    pub request: PairingRequest,
    /// Shown to the device once, never stored
    pub secret: Secret,
}

/// Result of a successful poll
#[derive(Debug, Clone)]
pub struct PairingStatus {
    pub request_id: RequestId,
    pub pairing: Pairing,
}

/// Credential minted by an exchange
#[derive(Debug)]
pub struct IssuedCredential {
    pub credential_id: CredentialId,
    /// Shown to the device once, never stored
    pub secret: Secret,
    pub user: User,
}

/// Identity behind a verified device credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedDevice {
    pub credential_id: CredentialId,
    pub user: User,
}

/// Runs the pairing flow on top of a [`PairingStore`]
pub struct PairingService {
    store: Arc<dyn PairingStore>,
    codec: TokenCodec,
    policy: PairingPolicy,
    clock: Arc<dyn Clock>,
}

impl PairingService {
    /// Create a service with default lifetimes and the system clock
    pub fn new(store: Arc<dyn PairingStore>, codec: TokenCodec) -> Self {
        Self {
            store,
            codec,
            policy: PairingPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Builder pattern: set lifetimes
    pub fn with_policy(mut self, policy: PairingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder pattern: set time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &PairingPolicy {
        &self.policy
    }

    /// Whole seconds left until `expires_at`, never negative
    pub fn seconds_until(&self, expires_at: DateTime<Utc>) -> i64 {
        (expires_at - self.clock.now()).num_seconds().max(0)
    }

    fn expiry(&self, now: DateTime<Utc>, ttl: Duration) -> PairingResult<DateTime<Utc>> {
        now.checked_add_signed(ttl).ok_or(PairingError::LifetimeOverflow)
    }

    /// Start a pairing: store the hash of a new polling secret
    pub async fn create_request(&self) -> PairingResult<NewPairing> {
        let secret = self.codec.generate();
        let secret_hash = self.codec.hash(&secret)?;
        let now = self.clock.now();

        let expires_at = self.expiry(now, self.policy.request_ttl)?;
        let request = PairingRequest::new(secret_hash, now, expires_at);
        self.store.create_request(request.clone()).await?;

        info!("Created pairing request {}", request.id);
        Ok(NewPairing { request, secret })
    }

    /// Load a request that can still be approved
    ///
    /// Checks run in order: existence, then whether it was already
    /// approved, then expiry.
    pub async fn get_pending_request(&self, id: &RequestId) -> PairingResult<PairingRequest> {
        let record = self
            .store
            .get_request(id)
            .await?
            .ok_or(PairingError::NotFound)?;
        self.ensure_pending(&record)?;
        Ok(record.request)
    }

    fn ensure_pending(&self, record: &RequestRecord) -> PairingResult<()> {
        if !matches!(Pairing::from_record(record)?, Pairing::Pending) {
            return Err(PairingError::AlreadyUsed);
        }
        if record.request.is_expired(self.clock.now()) {
            return Err(PairingError::Expired);
        }
        Ok(())
    }

    /// Attach an approval by `user` to a pending request
    pub async fn approve(&self, id: &RequestId, user: &User) -> PairingResult<PairingApproval> {
        let record = self
            .store
            .get_request(id)
            .await?
            .ok_or(PairingError::NotFound)?;
        self.ensure_pending(&record)?;

        let now = self.clock.now();
        let approval = PairingApproval::new(
            record.request.id.clone(),
            user,
            now,
            self.expiry(now, self.policy.approval_ttl)?,
        );
        self.store.create_approval(approval.clone()).await?;

        let mut linked = record.request;
        linked.approval_id = Some(approval.id.clone());
        match self.store.update_request(linked).await {
            Ok(()) => {
                info!(
                    "Pairing request {} approved by user {} (approval {})",
                    id, user.id, approval.id
                );
                Ok(approval)
            }
            Err(StorageError::Conflict(_)) => {
                warn!("Pairing request {} was approved concurrently", id);
                Err(PairingError::AlreadyUsed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Report a request's state to the device holding its polling secret
    ///
    /// Unknown IDs and wrong secrets both fail with `NotFound`. Expiry is only
    /// reported after the secret verified: a lapsed pending request or a
    /// lapsed unexchanged approval then fails with `Expired`, so the device
    /// knows to start over instead of polling on. An exchanged pairing never
    /// expires.
    pub async fn poll_state(&self, id: &RequestId, secret: &str) -> PairingResult<PairingStatus> {
        let Some(record) = self.store.get_request(id).await? else {
            self.codec.verify_decoy(secret);
            return Err(PairingError::NotFound);
        };
        if !self.codec.verify(secret, &record.request.secret_hash) {
            warn!("Invalid polling secret for pairing request {}", id);
            return Err(PairingError::NotFound);
        }

        let now = self.clock.now();
        let pairing = Pairing::from_record(&record)?;
        let expired = match &pairing {
            Pairing::Pending => record.request.is_expired(now),
            Pairing::Approved(approval) => approval.is_expired(now),
            Pairing::Exchanged { .. } => false,
        };
        if expired {
            debug!("Pairing request {} polled after expiry", id);
            return Err(PairingError::Expired);
        }

        debug!("Pairing request {} is {:?}", id, pairing.kind());
        Ok(PairingStatus {
            request_id: record.request.id,
            pairing,
        })
    }

    /// Trade an approval for a durable device credential
    ///
    /// The device proves ownership with the polling secret of the request
    /// the approval answers. Only the first exchange of an approval succeeds.
    pub async fn exchange(
        &self,
        approval_id: &ApprovalId,
        secret: &str,
    ) -> PairingResult<IssuedCredential> {
        let Some(record) = self.store.get_approval(approval_id).await? else {
            self.codec.verify_decoy(secret);
            return Err(PairingError::NotFound);
        };
        let approval = record.approval;

        let Some(request) = self.store.get_request(&approval.request_id).await? else {
            self.codec.verify_decoy(secret);
            return Err(PairingError::NotFound);
        };
        if !self.codec.verify(secret, &request.request.secret_hash) {
            warn!("Invalid exchange secret for approval {}", approval_id);
            return Err(PairingError::NotFound);
        }
        // An approval that lost the race to link its request is unusable
        if request.request.approval_id.as_ref() != Some(&approval.id) {
            return Err(PairingError::NotFound);
        }

        if approval.credential_id.is_some() {
            return Err(PairingError::AlreadyUsed);
        }
        let now = self.clock.now();
        if approval.is_expired(now) {
            return Err(PairingError::Expired);
        }

        let credential_secret = self.codec.generate();
        let credential =
            PairingCredential::for_approval(&approval, self.codec.hash(&credential_secret)?, now);
        self.store.create_credential(credential.clone()).await?;

        let mut linked = approval;
        linked.credential_id = Some(credential.id.clone());
        match self.store.update_approval(linked).await {
            Ok(()) => {
                info!(
                    "Approval {} exchanged for credential {} (user {})",
                    approval_id, credential.id, credential.user_id
                );
                Ok(IssuedCredential {
                    user: credential.user(),
                    credential_id: credential.id,
                    secret: credential_secret,
                })
            }
            Err(StorageError::Conflict(_)) => {
                warn!("Approval {} was exchanged concurrently", approval_id);
                Err(PairingError::AlreadyUsed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a device credential
    ///
    /// Unknown IDs and wrong secrets both fail with `Unauthorized`.
    pub async fn authenticate_credential(
        &self,
        id: &CredentialId,
        secret: &str,
    ) -> PairingResult<AuthenticatedDevice> {
        let Some(credential) = self.store.get_credential(id).await? else {
            self.codec.verify_decoy(secret);
            return Err(PairingError::Unauthorized);
        };
        if !self.codec.verify(secret, &credential.secret_hash) {
            warn!("Invalid secret for device credential {}", id);
            return Err(PairingError::Unauthorized);
        }

        Ok(AuthenticatedDevice {
            user: credential.user(),
            credential_id: credential.id,
        })
    }
}
