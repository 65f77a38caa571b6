//! Signature verification over the WebAuthn signed-data buffer.

use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};

use super::cose::{CoseAlgorithm, PublicKeyDescriptor};

/// Verify `signature` over `signed_data` with `key`.
///
/// ES256 signatures are ASN.1 DER; EdDSA signatures are 64 raw bytes.
/// Any structural problem (bad key encoding, wrong signature length,
/// undecodable DER) yields `false`.
pub fn verify_signature(key: &PublicKeyDescriptor, signed_data: &[u8], signature: &[u8]) -> bool {
    match key.algorithm {
        CoseAlgorithm::Es256 => {
            let Ok(verifying_key) = P256VerifyingKey::from_sec1_bytes(&key.key_material) else {
                return false;
            };
            let Ok(signature) = P256Signature::from_der(signature) else {
                return false;
            };
            verifying_key.verify(signed_data, &signature).is_ok()
        }
        CoseAlgorithm::EdDsa => {
            let Ok(key_bytes) = <[u8; 32]>::try_from(key.key_material.as_slice()) else {
                return false;
            };
            let Ok(verifying_key) = Ed25519VerifyingKey::from_bytes(&key_bytes) else {
                return false;
            };
            let Ok(signature) = Ed25519Signature::from_slice(signature) else {
                return false;
            };
            verifying_key.verify_strict(signed_data, &signature).is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Signer as _;
    use p256::ecdsa::signature::Signer as _;
    use rand::rngs::OsRng;

    fn es256_key() -> (p256::ecdsa::SigningKey, PublicKeyDescriptor) {
        let signing_key = p256::ecdsa::SigningKey::random(&mut OsRng);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let descriptor = PublicKeyDescriptor {
            algorithm: CoseAlgorithm::Es256,
            key_material: point.as_bytes().to_vec(),
        };
        (signing_key, descriptor)
    }

    #[test]
    fn test_es256_der_signature() {
        let (signing_key, descriptor) = es256_key();
        let signature: P256Signature = signing_key.sign(b"signed data");
        let der = signature.to_der();

        assert!(verify_signature(&descriptor, b"signed data", der.as_bytes()));
        assert!(!verify_signature(&descriptor, b"signed datA", der.as_bytes()));
        // Raw r||s is not accepted for ES256
        assert!(!verify_signature(
            &descriptor,
            b"signed data",
            &signature.to_bytes()
        ));
    }

    #[test]
    fn test_es256_wrong_key() {
        let (signing_key, _) = es256_key();
        let (_, other) = es256_key();
        let signature: P256Signature = signing_key.sign(b"payload");
        assert!(!verify_signature(
            &other,
            b"payload",
            signature.to_der().as_bytes()
        ));
    }

    #[test]
    fn test_eddsa_signature() {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let descriptor = PublicKeyDescriptor {
            algorithm: CoseAlgorithm::EdDsa,
            key_material: signing_key.verifying_key().to_bytes().to_vec(),
        };
        let signature = signing_key.sign(b"payload").to_bytes();

        assert!(verify_signature(&descriptor, b"payload", &signature));
        assert!(!verify_signature(&descriptor, b"payload", &signature[..63]));
        assert!(!verify_signature(&descriptor, b"other", &signature));
    }

    #[test]
    fn test_garbage_key_material() {
        let descriptor = PublicKeyDescriptor {
            algorithm: CoseAlgorithm::Es256,
            key_material: vec![0x04; 10],
        };
        assert!(!verify_signature(&descriptor, b"x", &[0x30, 0x00]));
    }
}
