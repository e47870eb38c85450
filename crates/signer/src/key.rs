use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::{Signer as _, SigningKey};
use protocol::domain::{PublicKey, Signature};
use rand::rngs::OsRng;

/// The validator signing key as held by the remote signer process: in memory
/// while running, persisted as a pkcs8 pem file.
pub struct LocalSigner {
    sign_key: SigningKey,
}

impl LocalSigner {
    pub fn random() -> Self {
        let mut csprng = OsRng;
        Self {
            sign_key: SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_buf(buf: &[u8]) -> Option<Self> {
        let buf: &[u8; 32] = buf.try_into().ok()?;
        Some(Self {
            sign_key: SigningKey::from_bytes(buf),
        })
    }

    pub fn from_pem(buf: &str) -> Option<Self> {
        let sign_key = SigningKey::from_pkcs8_pem(buf).ok()?;
        Some(Self { sign_key })
    }

    pub fn to_pem(&self) -> String {
        self.sign_key
            .to_pkcs8_pem(LineEnding::CRLF)
            .expect("should encode pem")
            .to_string()
    }

    pub fn public_key(&self) -> PublicKey {
        self.sign_key.verifying_key()
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.sign_key.sign(msg)
    }
}
