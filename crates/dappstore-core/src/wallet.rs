//! Wallet connection state and the signing capability.
//!
//! The pipeline never signs anything itself. It receives a
//! [`TransactionSigner`] explicitly and hands it to the minting collaborator;
//! the only thing it inspects is the connection state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Connection state of the publishing wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WalletState {
    Disconnected,
    Connecting,
    Connected {
        public_key: String,
        wallet_name: String,
    },
    Error {
        message: String,
    },
}

impl WalletState {
    /// Public key when connected.
    pub fn public_key(&self) -> Option<&str> {
        match self {
            WalletState::Connected { public_key, .. } => Some(public_key),
            WalletState::Disconnected | WalletState::Connecting | WalletState::Error { .. } => {
                None
            }
        }
    }
}

/// Errors returned by a signer.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("signing rejected: {0}")]
    Rejected(String),

    #[error("signing is not available from this wallet: {0}")]
    Unsupported(String),

    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

/// Signs and broadcasts serialized transactions.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn state(&self) -> WalletState;

    /// Sign `payload` and submit it; returns the transaction signature.
    async fn sign_and_send(&self, payload: &[u8]) -> Result<String, SigningError>;
}

/// A wallet identified only by its public key.
///
/// Signing happens out of process (the minting command holds the keypair), so
/// [`sign_and_send`](TransactionSigner::sign_and_send) always reports
/// [`SigningError::Unsupported`].
///
/// The key is taken on trust from the caller. Build it from the keypair the
/// minting command actually uses, not from the release descriptor, or the
/// publisher-key check can never fail.
#[derive(Debug, Clone)]
pub struct DetachedWallet {
    public_key: String,
    wallet_name: String,
}

impl DetachedWallet {
    pub fn new(public_key: &str, wallet_name: &str) -> Self {
        Self {
            public_key: public_key.to_string(),
            wallet_name: wallet_name.to_string(),
        }
    }
}

#[async_trait]
impl TransactionSigner for DetachedWallet {
    fn state(&self) -> WalletState {
        WalletState::Connected {
            public_key: self.public_key.clone(),
            wallet_name: self.wallet_name.clone(),
        }
    }

    async fn sign_and_send(&self, _payload: &[u8]) -> Result<String, SigningError> {
        Err(SigningError::Unsupported(self.wallet_name.clone()))
    }
}
