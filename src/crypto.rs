//! AES-CBC helpers for the `params` query field and encrypted responses.
//!
//! The session key is base64 text handed out at login. The IV is always
//! sixteen zero bytes and padding is PKCS#7, matching the web client.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::percent_decode_str;

use crate::errors::{AppError, AppResult};

const ZERO_IV: [u8; 16] = [0u8; 16];

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

fn decode_key(secret_key: &str) -> AppResult<Vec<u8>> {
    if secret_key.is_empty() {
        return Err(AppError::crypto("Secret key is empty"));
    }
    STANDARD
        .decode(secret_key)
        .map_err(|e| AppError::Crypto(format!("Secret key is not valid base64: {}", e)))
}

fn invalid_key(len: usize) -> AppError {
    AppError::Crypto(format!("Unsupported key length {} bytes", len))
}

/// Encrypt `data` with the session key and return base64 ciphertext.
pub fn encode_aes(secret_key: &str, data: &str) -> AppResult<String> {
    let key = decode_key(secret_key)?;
    let plaintext = data.as_bytes();

    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(&key, &ZERO_IV)
            .map_err(|_| invalid_key(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => Aes192CbcEnc::new_from_slices(&key, &ZERO_IV)
            .map_err(|_| invalid_key(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => Aes256CbcEnc::new_from_slices(&key, &ZERO_IV)
            .map_err(|_| invalid_key(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        other => return Err(invalid_key(other)),
    };

    let encoded = STANDARD.encode(ciphertext);
    if encoded.is_empty() {
        return Err(AppError::crypto("Failed to encrypt message"));
    }
    Ok(encoded)
}

/// Decrypt base64 ciphertext produced by the server. The input may still
/// be percent-encoded.
pub fn decode_aes(secret_key: &str, data: &str) -> AppResult<String> {
    let key = decode_key(secret_key)?;

    let unescaped = percent_decode_str(data)
        .decode_utf8()
        .map_err(|e| AppError::Crypto(format!("Encrypted payload is not UTF-8: {}", e)))?;
    let ciphertext = STANDARD
        .decode(unescaped.as_bytes())
        .map_err(|e| AppError::Crypto(format!("Encrypted payload is not valid base64: {}", e)))?;

    let unpad_failed = |_| AppError::crypto("Failed to decrypt payload");
    let plaintext = match key.len() {
        16 => Aes128CbcDec::new_from_slices(&key, &ZERO_IV)
            .map_err(|_| invalid_key(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(unpad_failed)?,
        24 => Aes192CbcDec::new_from_slices(&key, &ZERO_IV)
            .map_err(|_| invalid_key(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(unpad_failed)?,
        32 => Aes256CbcDec::new_from_slices(&key, &ZERO_IV)
            .map_err(|_| invalid_key(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(unpad_failed)?,
        other => return Err(invalid_key(other)),
    };

    String::from_utf8(plaintext).map_err(|_| AppError::crypto("Decrypted payload is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // base64 of sixteen 0x01 bytes
    const KEY_128: &str = "AQEBAQEBAQEBAQEBAQEBAQ==";

    #[test]
    fn test_encrypt_then_decrypt() {
        let params = r#"{"toid":"42","totalChunk":3,"chunkId":1}"#;
        let encrypted = encode_aes(KEY_128, params).unwrap();
        assert_ne!(encrypted, params);
        assert_eq!(decode_aes(KEY_128, &encrypted).unwrap(), params);
    }

    #[test]
    fn test_ciphertext_is_block_aligned() {
        let encrypted = encode_aes(KEY_128, "0123456789abcdef").unwrap();
        let raw = STANDARD.decode(encrypted).unwrap();
        // a full block of plaintext gains a full block of padding
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn test_decode_accepts_percent_encoded_input() {
        let encrypted = encode_aes(KEY_128, "{\"error_code\":0}").unwrap();
        let escaped = encrypted.replace('+', "%2B").replace('/', "%2F").replace('=', "%3D");
        assert_eq!(decode_aes(KEY_128, &escaped).unwrap(), "{\"error_code\":0}");
    }

    #[test]
    fn test_bad_keys_are_crypto_errors() {
        assert!(matches!(encode_aes("", "x"), Err(AppError::Crypto(_))));
        assert!(matches!(encode_aes("%%%", "x"), Err(AppError::Crypto(_))));
        // five bytes, valid base64 but not an AES key size
        assert!(matches!(encode_aes("AQEBAQE=", "x"), Err(AppError::Crypto(_))));
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let encrypted = encode_aes(KEY_128, "hello there, general").unwrap();
        let other_key = STANDARD.encode([2u8; 16]);
        match decode_aes(&other_key, &encrypted) {
            Err(AppError::Crypto(_)) => {}
            Ok(text) => assert_ne!(text, "hello there, general"),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
}
