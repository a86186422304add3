//! Software [Provider] backed by RustCrypto AEAD implementations.

use crate::{CipherKind, Error, Provider, Sealed, Tag, KEY_LENGTH, TAG_LENGTH};
use aes_gcm::{
    aead::{
        consts::{U12, U16},
        generic_array::GenericArray,
        AeadInPlace, KeyInit,
    },
    aes::Aes128,
    AesGcm,
};
use ascon_aead::Ascon128;

/// AES-128-GCM with the standard 96-bit nonce.
type Aes128Gcm12 = AesGcm<Aes128, U12>;

/// AES-128-GCM with a 128-bit nonce (initial counter block derived with GHASH).
type Aes128Gcm16 = AesGcm<Aes128, U16>;

/// Seals and opens messages entirely in software.
///
/// Ciphers are keyed per call and wiped when dropped, so no key schedule outlives the call that
/// needed it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Software;

impl Software {
    pub fn new() -> Self {
        Self
    }
}

/// Ensure the nonce length is accepted by `kind`.
fn check_nonce(kind: CipherKind, nonce: &[u8]) -> Result<(), Error> {
    if !kind.nonce_lengths().contains(&nonce.len()) {
        return Err(Error::InvalidNonceLength(kind, nonce.len()));
    }
    Ok(())
}

fn seal_with<A: AeadInPlace + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Sealed, Error> {
    let cipher = A::new_from_slice(key)
        .map_err(|_| Error::InvalidKeyLength(key.len()))?;
    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, &mut ciphertext)
        .map_err(|_| Error::EncryptionFailed)?;
    let mut out: Tag = [0u8; TAG_LENGTH];
    out.copy_from_slice(&tag);
    Ok(Sealed {
        ciphertext,
        tag: out,
    })
}

fn open_with<A: AeadInPlace + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = A::new_from_slice(key)
        .map_err(|_| Error::InvalidKeyLength(key.len()))?;
    let mut plaintext = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            aad,
            &mut plaintext,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::DecryptionFailed)?;
    Ok(plaintext)
}

impl Provider for Software {
    fn seal(
        &self,
        kind: CipherKind,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Sealed, Error> {
        if key.len() != KEY_LENGTH {
            return Err(Error::InvalidKeyLength(key.len()));
        }
        check_nonce(kind, nonce)?;
        match (kind, nonce.len()) {
            (CipherKind::Aes128Gcm, 12) => seal_with::<Aes128Gcm12>(key, nonce, aad, plaintext),
            (CipherKind::Aes128Gcm, _) => seal_with::<Aes128Gcm16>(key, nonce, aad, plaintext),
            (CipherKind::Ascon128, _) => seal_with::<Ascon128>(key, nonce, aad, plaintext),
        }
    }

    fn open(
        &self,
        kind: CipherKind,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if key.len() != KEY_LENGTH {
            return Err(Error::InvalidKeyLength(key.len()));
        }
        check_nonce(kind, nonce)?;
        if tag.len() != TAG_LENGTH {
            return Err(Error::InvalidTagLength(tag.len()));
        }
        match (kind, nonce.len()) {
            (CipherKind::Aes128Gcm, 12) => {
                open_with::<Aes128Gcm12>(key, nonce, aad, ciphertext, tag)
            }
            (CipherKind::Aes128Gcm, _) => {
                open_with::<Aes128Gcm16>(key, nonce, aad, ciphertext, tag)
            }
            (CipherKind::Ascon128, _) => open_with::<Ascon128>(key, nonce, aad, ciphertext, tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const KEY: [u8; 16] = [7u8; 16];

    #[test_case(CipherKind::Aes128Gcm, 12; "aes gcm short nonce")]
    #[test_case(CipherKind::Aes128Gcm, 16; "aes gcm long nonce")]
    #[test_case(CipherKind::Ascon128, 16; "ascon")]
    fn test_seal_open(kind: CipherKind, nonce_len: usize) {
        let provider = Software::new();
        let nonce = vec![0u8; nonce_len];
        let sealed = provider
            .seal(kind, &KEY, &nonce, b"header", b"toggle")
            .unwrap();
        assert_eq!(sealed.ciphertext.len(), 6);
        assert_ne!(&sealed.ciphertext[..], b"toggle");

        let ciphertext = &sealed.ciphertext;
        let plaintext = provider
            .open(kind, &KEY, &nonce, b"header", ciphertext, &sealed.tag)
            .unwrap();
        assert_eq!(&plaintext[..], b"toggle");
    }

    #[test_case(CipherKind::Aes128Gcm; "aes gcm")]
    #[test_case(CipherKind::Ascon128; "ascon")]
    fn test_tampering_fails_closed(kind: CipherKind) {
        let provider = Software::new();
        let nonce = vec![0u8; 16];
        let sealed = provider
            .seal(kind, &KEY, &nonce, b"aad", b"payload")
            .unwrap();

        // Flip a ciphertext bit
        let mut ciphertext = sealed.ciphertext.clone();
        ciphertext[0] ^= 1;
        assert_eq!(
            provider.open(kind, &KEY, &nonce, b"aad", &ciphertext, &sealed.tag),
            Err(Error::DecryptionFailed)
        );

        // Flip a tag bit
        let mut tag = sealed.tag;
        tag[15] ^= 0x80;
        assert_eq!(
            provider.open(kind, &KEY, &nonce, b"aad", &sealed.ciphertext, &tag),
            Err(Error::DecryptionFailed)
        );

        // Different associated data
        let ciphertext = &sealed.ciphertext;
        assert_eq!(
            provider.open(kind, &KEY, &nonce, b"aae", ciphertext, &sealed.tag),
            Err(Error::DecryptionFailed)
        );

        // Different key
        assert_eq!(
            provider.open(kind, &[8u8; 16], &nonce, b"aad", ciphertext, &sealed.tag),
            Err(Error::DecryptionFailed)
        );
    }

    #[test]
    fn test_kinds_not_interchangeable() {
        let provider = Software::new();
        let nonce = [0u8; 16];
        let sealed = provider
            .seal(CipherKind::Aes128Gcm, &KEY, &nonce, &[], b"data")
            .unwrap();
        let opened = provider.open(
            CipherKind::Ascon128,
            &KEY,
            &nonce,
            &[],
            &sealed.ciphertext,
            &sealed.tag,
        );
        assert!(opened.is_err());
    }

    #[test]
    fn test_nonce_lengths_validated() {
        let provider = Software::new();
        assert_eq!(
            provider.seal(CipherKind::Ascon128, &KEY, &[0u8; 12], &[], b"x"),
            Err(Error::InvalidNonceLength(CipherKind::Ascon128, 12))
        );
        assert_eq!(
            provider.seal(CipherKind::Aes128Gcm, &KEY, &[0u8; 8], &[], b"x"),
            Err(Error::InvalidNonceLength(CipherKind::Aes128Gcm, 8))
        );
        let tag = [0u8; 16];
        assert_eq!(
            provider.open(CipherKind::Aes128Gcm, &KEY, &[0u8; 32], &[], b"x", &tag),
            Err(Error::InvalidNonceLength(CipherKind::Aes128Gcm, 32))
        );
    }

    #[test]
    fn test_key_and_tag_lengths_validated() {
        let provider = Software::new();
        assert_eq!(
            provider.seal(CipherKind::Aes128Gcm, &[0u8; 32], &[0u8; 12], &[], b"x"),
            Err(Error::InvalidKeyLength(32))
        );
        let tag = [0u8; 8];
        assert_eq!(
            provider.open(CipherKind::Ascon128, &KEY, &[0u8; 16], &[], b"x", &tag),
            Err(Error::InvalidTagLength(8))
        );
    }

    #[test]
    fn test_deterministic_under_fixed_nonce() {
        let provider = Software::new();
        let nonce = [0u8; 16];
        let canary = [0u8; 16];
        let a = provider
            .seal(CipherKind::Aes128Gcm, &KEY, &nonce, b"challenge", &canary)
            .unwrap();
        let b = provider
            .seal(CipherKind::Aes128Gcm, &KEY, &nonce, b"challenge", &canary)
            .unwrap();
        assert_eq!(a, b);
    }
}
