//! ECDSA P-256 signing primitives.
//!
//! Every signature in the data plane is ECDSA over NIST P-256 with SHA-256,
//! DER-encoded. Private keys travel as PKCS#8 PEM, public keys as
//! SubjectPublicKeyInfo PEM. PEM private-key material is only materialized
//! inside the signing call and lives in a zeroizing buffer that is wiped on
//! every exit path.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::zeroize::Zeroizing;
use p256::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// P-256 keypair backing transaction, batch, and block signatures.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut OsRng),
        }
    }

    /// Load a keypair from PKCS#8 PEM private-key material.
    pub fn from_private_key_pem(pem: &str) -> Result<Self> {
        if pem.trim().is_empty() {
            return Err(Error::InvalidArgument("private key PEM is empty".into()));
        }
        let signing = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::Crypto(format!("invalid PKCS#8 private key: {e}")))?;
        Ok(Self { signing })
    }

    /// Export the private key as PKCS#8 PEM inside a zeroizing buffer.
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.signing
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("private key encoding failed: {e}")))
    }

    /// Export the public key as SubjectPublicKeyInfo PEM.
    pub fn public_key_pem(&self) -> String {
        self.signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("SPKI encoding of a valid P-256 key cannot fail")
    }

    /// Sign a 32-byte digest, returning the DER-encoded signature.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Vec<u8> {
        let signature: Signature = self.signing.sign(digest);
        signature.to_der().as_bytes().to_vec()
    }

    /// Verify a DER signature over a digest with this keypair's public half.
    pub fn verify_digest(&self, digest: &[u8; 32], signature_der: &[u8]) -> bool {
        let Ok(signature) = Signature::from_der(signature_der) else {
            return false;
        };
        self.signing
            .verifying_key()
            .verify(digest, &signature)
            .is_ok()
    }
}

/// Sign a digest with PEM private-key material in a scoped acquisition.
///
/// The key is parsed immediately before signing; the PEM copy is wiped when
/// this function returns, on success and on error alike.
pub fn sign_digest_with_pem(private_key_pem: &str, digest: &[u8; 32]) -> Result<Vec<u8>> {
    let pem = Zeroizing::new(private_key_pem.to_owned());
    let keypair = Keypair::from_private_key_pem(&pem)?;
    Ok(keypair.sign_digest(digest))
}

/// Verify a DER signature over a digest under a SubjectPublicKeyInfo PEM key.
///
/// Never errors: malformed keys or signatures verify as `false`.
pub fn verify_digest_with_pem(public_key_pem: &str, digest: &[u8; 32], signature_der: &[u8]) -> bool {
    let Ok(verifying) = VerifyingKey::from_public_key_pem(public_key_pem) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(signature_der) else {
        return false;
    };
    verifying.verify(digest, &signature).is_ok()
}
