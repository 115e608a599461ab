//! Shared fixtures: LCP licenses and packages built on the fly

#![allow(dead_code)]

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use lcp_core::{LcpConfig, LcpService, PassphraseCache};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

pub const LICENSE_ID: &str = "abc";
pub const PASSPHRASE: &str = "correct-horse";
pub const CONTENT_KEY: [u8; 32] = [
    0x3a, 0x91, 0x0c, 0x5e, 0x77, 0x12, 0xa4, 0x08, 0xde, 0x6b, 0x2f, 0x90, 0x41, 0xcc, 0x13, 0x7a,
    0x55, 0x02, 0xe9, 0x8d, 0x36, 0xb1, 0x4f, 0x60, 0x1e, 0xf3, 0x88, 0x27, 0x9a, 0x04, 0xc5, 0x6d,
];

pub const AES256_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";
pub const LCP_SCHEME: &str = "http://readium.org/2014/11/lcp";
pub const BASIC_PROFILE: &str = "http://readium.org/lcp/basic-profile";

/// IV-prefixed AES-256-CBC with PKCS#7, as LCP packagers write it
pub fn seal(key: &[u8; 32], iv: [u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let encryptor = cbc::Encryptor::<Aes256>::new(key.into(), (&iv).into());
    let mut out = iv.to_vec();
    out.extend(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext));
    out
}

pub fn user_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Deterministic, non-repeating test plaintext
pub fn plaintext(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 3) as u8
        })
        .collect()
}

pub fn license_json(id: &str, passphrase: &str) -> Value {
    let key = user_key(passphrase);
    json!({
        "id": id,
        "issued": "2024-03-01T10:00:00Z",
        "updated": "2024-03-01T10:00:00Z",
        "provider": "https://provider.example.org",
        "encryption": {
            "profile": BASIC_PROFILE,
            "content_key": {
                "algorithm": AES256_CBC,
                "encrypted_value": BASE64.encode(seal(&key, [0x21; 16], &CONTENT_KEY)),
            },
            "user_key": {
                "algorithm": "http://www.w3.org/2001/04/xmlenc#sha256",
                "text_hint": "a horse, correctly",
                "key_check": BASE64.encode(seal(&key, [0x42; 16], id.as_bytes())),
            },
        },
        "links": [
            {"rel": "hint", "href": "https://provider.example.org/hint"},
            {"rel": "publication", "href": "https://provider.example.org/book.lcpa",
             "type": "application/audiobook+lcp"}
        ],
        "rights": {"print": 0, "copy": 0},
        "user": {"id": "reader-1"}
    })
}

pub fn license_bytes(id: &str, passphrase: &str) -> Vec<u8> {
    serde_json::to_vec(&license_json(id, passphrase)).unwrap()
}

/// Builds ZIP packages entry by entry
#[derive(Default)]
pub struct PackageBuilder {
    entries: Vec<(String, Vec<u8>, CompressionMethod)>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), data.into(), CompressionMethod::Stored));
        self
    }

    pub fn deflated(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), data.into(), CompressionMethod::Deflated));
        self
    }

    /// Encrypt with the content key and store
    pub fn encrypted(self, name: &str, plaintext: &[u8]) -> Self {
        let iv: [u8; 16] = Sha256::digest(name.as_bytes())[..16].try_into().unwrap();
        let sealed = seal(&CONTENT_KEY, iv, plaintext);
        self.stored(name, sealed)
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, method) in &self.entries {
            let options = SimpleFileOptions::default().compression_method(*method);
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn write(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.bytes()).unwrap();
        path
    }
}

/// RWPM reading-order link for an encrypted audio track
pub fn encrypted_track(href: &str, original_length: usize, duration: f64) -> Value {
    json!({
        "href": href,
        "type": "audio/mpeg",
        "duration": duration,
        "properties": {"encrypted": {
            "scheme": LCP_SCHEME,
            "profile": BASIC_PROFILE,
            "algorithm": AES256_CBC,
            "originalLength": original_length
        }}
    })
}

pub fn audiobook_manifest(reading_order: Vec<Value>) -> String {
    json!({
        "@context": "https://readium.org/webpub-manifest/context.jsonld",
        "metadata": {
            "@type": "http://schema.org/Audiobook",
            "conformsTo": "https://readium.org/webpub-manifest/profiles/audiobook",
            "title": "The Test Recording",
            "author": "A. Narrator",
            "identifier": "urn:uuid:00000000-0000-0000-0000-000000000001",
            "language": "en"
        },
        "readingOrder": reading_order,
        "resources": [{"href": "cover.jpg", "type": "image/jpeg"}]
    })
    .to_string()
}

/// Audiobook with one encrypted track per entry in `tracks`
pub fn audiobook(tracks: &[(&str, &[u8])]) -> PackageBuilder {
    let reading_order = tracks
        .iter()
        .map(|(href, data)| encrypted_track(href, data.len(), 60.0))
        .collect();
    let mut builder = PackageBuilder::new()
        .deflated("manifest.json", audiobook_manifest(reading_order))
        .deflated("cover.jpg", plaintext(3000, 99));
    for (href, data) in tracks {
        builder = builder.encrypted(href, data);
    }
    builder
}

/// Service with its own cache so tests don't share keys
pub fn service(config: LcpConfig) -> LcpService {
    LcpService::new(config)
        .unwrap()
        .with_cache(Arc::new(PassphraseCache::new()))
}

pub fn window(bytes: usize) -> LcpConfig {
    LcpConfig::builder().chunk_window(bytes).build().unwrap()
}
