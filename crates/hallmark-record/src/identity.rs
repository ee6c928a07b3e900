//! Host identity -- keypair, derived peer id, advertised version strings.

use std::path::Path;

use libp2p_identity::{Keypair, PeerId, PublicKey};

use crate::RecordError;

/// The local node's descriptor. Immutable for the engine's lifetime.
#[derive(Clone)]
pub struct HostIdentity {
    keypair: Keypair,
    peer_id: PeerId,
    protocol_version: String,
    agent_version: String,
}

impl HostIdentity {
    /// Generate a fresh Ed25519 identity.
    pub fn generate(
        protocol_version: impl Into<String>,
        agent_version: impl Into<String>,
    ) -> Self {
        Self::from_keypair(Keypair::generate_ed25519(), protocol_version, agent_version)
    }

    pub fn from_keypair(
        keypair: Keypair,
        protocol_version: impl Into<String>,
        agent_version: impl Into<String>,
    ) -> Self {
        let peer_id = keypair.public().to_peer_id();
        Self {
            keypair,
            peer_id,
            protocol_version: protocol_version.into(),
            agent_version: agent_version.into(),
        }
    }

    /// Load a keypair from `path`, or generate and persist one.
    pub fn load_or_create(
        path: &Path,
        protocol_version: impl Into<String>,
        agent_version: impl Into<String>,
    ) -> Result<Self, RecordError> {
        let keypair = if path.exists() {
            let bytes = std::fs::read(path)?;
            Keypair::from_protobuf_encoding(&bytes)
                .map_err(|e| RecordError::Malformed(format!("keypair: {e}")))?
        } else {
            let keypair = Keypair::generate_ed25519();
            let bytes = keypair
                .to_protobuf_encoding()
                .map_err(|e| RecordError::Signing(e.to_string()))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
            keypair
        };
        Ok(Self::from_keypair(keypair, protocol_version, agent_version))
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn agent_version(&self) -> &str {
        &self.agent_version
    }
}
