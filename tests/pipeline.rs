mod common;

use async_trait::async_trait;
use common::*;
use lcp_core::license::License;
use lcp_core::{Asset, Format, FormatHints, LcpError, PackageFetcher, PassphraseStore};
use serde_json::json;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

fn asset(package: &PackageBuilder, extension: &str) -> Asset {
    Asset::from_bytes(format!("memory.{extension}"), package.bytes(), FormatHints::extension(extension)).unwrap()
}

fn read_all(publication: &lcp_core::Publication, href: &str) -> Vec<u8> {
    let mut reader = publication.resource(href).unwrap();
    reader.open(0).unwrap();
    let mut out = Vec::new();
    loop {
        let chunk = reader.read(4096).unwrap();
        if chunk.is_empty() {
            break;
        }
        out.extend(chunk);
    }
    out
}

#[tokio::test]
async fn test_open_audiobook_with_correct_passphrase() {
    let one = plaintext(1500, 1);
    let two = plaintext(800, 2);
    let package = audiobook(&[("audio/01.mp3", &one), ("audio/02.mp3", &two)]);
    let service = service(window(256));
    let license = license_bytes(LICENSE_ID, PASSPHRASE);

    let publication = service
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(publication.format(), Format::Audiobook);
    assert_eq!(publication.metadata().title.as_deref(), Some("The Test Recording"));
    assert_eq!(publication.metadata().authors, vec!["A. Narrator"]);
    assert_eq!(publication.metadata().duration, Some(120.0));
    assert_eq!(publication.license().id(), LICENSE_ID);

    let hrefs: Vec<&str> = publication.reading_order().iter().map(|l| l.href.as_str()).collect();
    assert_eq!(hrefs, vec!["audio/01.mp3", "audio/02.mp3"]);
    assert!(publication.reading_order().iter().all(|l| l.encryption.is_encrypted()));

    assert_eq!(read_all(&publication, "audio/01.mp3"), one);
    assert_eq!(read_all(&publication, "audio/02.mp3"), two);
    assert!(service.cache().contains(LICENSE_ID));
}

#[tokio::test]
async fn test_wrong_passphrase_leaves_cache_empty() {
    let package = audiobook(&[("audio/01.mp3", &plaintext(100, 1))]);
    let service = service(window(256));
    let license = license_bytes(LICENSE_ID, PASSPHRASE);

    let result = service
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some("wrong"), &CancellationToken::new())
        .await;

    match result {
        Err(LcpError::WrongPassphrase { license_id }) => assert_eq!(license_id, LICENSE_ID),
        other => panic!("expected WrongPassphrase, got {other:?}"),
    }
    assert!(service.cache().is_empty());
}

#[tokio::test]
async fn test_embedded_license_is_used() {
    let track = plaintext(640, 3);
    let package = audiobook(&[("audio/01.mp3", &track)]).stored("license.lcpl", license_bytes(LICENSE_ID, PASSPHRASE));
    let service = service(window(256));

    let publication = service
        .open_publication(asset(&package, "lcpa"), None, Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(read_all(&publication, "audio/01.mp3"), track);
}

#[tokio::test]
async fn test_missing_license_is_invalid() {
    let package = audiobook(&[("audio/01.mp3", &plaintext(64, 3))]);
    let service = service(window(256));
    let result = service
        .open_publication(asset(&package, "lcpa"), None, Some(PASSPHRASE), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(LcpError::LicenseInvalid(_))));
}

#[tokio::test]
async fn test_expired_license() {
    let package = audiobook(&[("audio/01.mp3", &plaintext(64, 4))]);
    let service = service(window(256));
    let mut doc = license_json(LICENSE_ID, PASSPHRASE);
    doc["status"] = json!("expired");
    let license = serde_json::to_vec(&doc).unwrap();

    let result = service
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(LcpError::LicenseExpired { .. })));
}

#[tokio::test]
async fn test_future_rights_start_is_restricted() {
    let package = audiobook(&[("audio/01.mp3", &plaintext(64, 5))]);
    let service = service(window(256));
    let mut doc = license_json(LICENSE_ID, PASSPHRASE);
    doc["rights"]["start"] = json!("2999-01-01T00:00:00Z");
    let license = serde_json::to_vec(&doc).unwrap();

    let result = service
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(LcpError::RightsRestricted(_))));
    assert!(service.cache().is_empty());
}

#[tokio::test]
async fn test_unsupported_resource_algorithm() {
    let mut track = encrypted_track("audio/01.mp3", 64, 10.0);
    track["properties"]["encrypted"]["algorithm"] = json!("http://www.w3.org/2001/04/xmlenc#aes128-cbc");
    let package = PackageBuilder::new()
        .deflated("manifest.json", audiobook_manifest(vec![track]))
        .deflated("cover.jpg", plaintext(3000, 99))
        .encrypted("audio/01.mp3", &plaintext(64, 6));
    let service = service(window(256));
    let license = license_bytes(LICENSE_ID, PASSPHRASE);

    let result = service
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await;
    match result {
        Err(LcpError::UnsupportedEncryptionProfile { href, .. }) => assert_eq!(href, "audio/01.mp3"),
        other => panic!("expected UnsupportedEncryptionProfile, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reading_order_entry_missing_from_package() {
    let package = PackageBuilder::new()
        .deflated("manifest.json", audiobook_manifest(vec![encrypted_track("audio/01.mp3", 64, 10.0)]))
        .deflated("cover.jpg", plaintext(3000, 99));
    let service = service(window(256));
    let license = license_bytes(LICENSE_ID, PASSPHRASE);

    let result = service
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(LcpError::ManifestInvalid(_))));
}

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:epub-1</dc:identifier>
    <dc:title>Encrypted Chapters</dc:title>
    <dc:creator>B. Writer</dc:creator>
  </metadata>
  <manifest>
    <item id="c1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="c2"/>
  </spine>
</package>"#;

fn encryption_xml(chapter_one_length: usize) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
            xmlns:enc="http://www.w3.org/2001/04/xmlenc#"
            xmlns:ds="http://www.w3.org/2000/09/xmldsig#"
            xmlns:comp="http://www.idpf.org/2016/encryption#compression">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="{AES256_CBC}"/>
    <ds:KeyInfo><ds:RetrievalMethod URI="license.lcpl#/encryption/content_key" Type="http://readium.org/2014/11/lcp#EncryptedContentKey"/></ds:KeyInfo>
    <enc:CipherData><enc:CipherReference URI="OEBPS/text/ch1.xhtml"/></enc:CipherData>
    <enc:EncryptionProperties><enc:EncryptionProperty>
      <comp:Compression Method="8" OriginalLength="{chapter_one_length}"/>
    </enc:EncryptionProperty></enc:EncryptionProperties>
  </enc:EncryptedData>
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="{AES256_CBC}"/>
    <ds:KeyInfo><ds:RetrievalMethod URI="license.lcpl#/encryption/content_key" Type="http://readium.org/2014/11/lcp#EncryptedContentKey"/></ds:KeyInfo>
    <enc:CipherData><enc:CipherReference URI="OEBPS/text/ch2.xhtml"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#
    )
}

#[tokio::test]
async fn test_epub_with_deflated_and_stored_chapters() {
    let chapter_one = "<html><body>".repeat(400).into_bytes();
    let chapter_two = plaintext(2222, 7);
    let package = PackageBuilder::new()
        .stored("mimetype", "application/epub+zip")
        .deflated("META-INF/container.xml", CONTAINER_XML)
        .deflated("META-INF/encryption.xml", encryption_xml(chapter_one.len()))
        .stored("META-INF/license.lcpl", license_bytes(LICENSE_ID, PASSPHRASE))
        .deflated("OEBPS/content.opf", OPF)
        .encrypted("OEBPS/text/ch1.xhtml", &deflate(&chapter_one))
        .encrypted("OEBPS/text/ch2.xhtml", &chapter_two);
    let service = service(window(128));

    let publication = service
        .open_publication(asset(&package, "epub"), None, Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(publication.format(), Format::Epub);
    assert_eq!(publication.metadata().title.as_deref(), Some("Encrypted Chapters"));
    assert_eq!(publication.metadata().identifier.as_deref(), Some("urn:uuid:epub-1"));
    assert_eq!(publication.reading_order().len(), 2);
    assert_eq!(read_all(&publication, "OEBPS/text/ch1.xhtml"), chapter_one);
    assert_eq!(read_all(&publication, "OEBPS/text/ch2.xhtml"), chapter_two);

    // Random access inside the deflated chapter
    let mut reader = publication.resource("OEBPS/text/ch1.xhtml").unwrap();
    assert_eq!(reader.open(1000).unwrap(), Some(chapter_one.len() as u64));
    assert_eq!(reader.read(50).unwrap(), &chapter_one[1000..1050]);
    reader.seek(10).unwrap();
    assert_eq!(reader.read(12).unwrap(), &chapter_one[10..22]);
}

#[tokio::test]
async fn test_clear_deflated_resource() {
    let package = audiobook(&[("audio/01.mp3", &plaintext(64, 8))]);
    let service = service(window(256));
    let license = license_bytes(LICENSE_ID, PASSPHRASE);
    let publication = service
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(read_all(&publication, "cover.jpg"), plaintext(3000, 99));
}

#[tokio::test]
async fn test_persisted_store_skips_passphrase() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("passphrases.db");
    let track = plaintext(333, 9);
    let package = audiobook(&[("audio/01.mp3", &track)]);
    let license = license_bytes(LICENSE_ID, PASSPHRASE);

    {
        let store = PassphraseStore::open(&db_path).await.unwrap();
        let first = service(window(256)).with_store(store);
        first
            .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
            .await
            .unwrap();
        first.store().unwrap().database().clone().close().await;
    }

    let store = PassphraseStore::open(&db_path).await.unwrap();
    let second = service(window(256)).with_store(store);
    assert!(second.cache().is_empty());
    let publication = second
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(read_all(&publication, "audio/01.mp3"), track);

    second.forget_passphrases(Some(LICENSE_ID)).await.unwrap();
    let result = second
        .open_publication(asset(&package, "lcpa"), Some(license.as_slice()), None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(LcpError::WrongPassphrase { .. })));
}

#[tokio::test]
async fn test_store_offers_keys_from_same_user() {
    let store = PassphraseStore::in_memory().await.unwrap();
    let service = service(window(256)).with_store(store);
    let package = audiobook(&[("audio/01.mp3", &plaintext(100, 10))]);

    let first = license_bytes("loan-1", PASSPHRASE);
    service
        .open_publication(asset(&package, "lcpa"), Some(first.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();

    let second = license_bytes("loan-2", PASSPHRASE);
    service
        .open_publication(asset(&package, "lcpa"), Some(second.as_slice()), None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(service.cache().contains("loan-2"));
}

struct FakeFetcher {
    dir: PathBuf,
    package: Vec<u8>,
}

#[async_trait]
impl PackageFetcher for FakeFetcher {
    async fn fetch(&self, license: &License, progress: Option<watch::Sender<f64>>) -> lcp_core::Result<PathBuf> {
        assert!(license.publication_link().is_some());
        let path = self.dir.join(format!("{}.lcpa", license.id()));
        tokio::fs::write(&path, &self.package).await?;
        if let Some(progress) = progress {
            let _ = progress.send(1.0);
        }
        Ok(path)
    }
}

#[tokio::test]
async fn test_acquire_then_open() {
    let dir = tempfile::tempdir().unwrap();
    let track = plaintext(4000, 11);
    let fetcher = FakeFetcher {
        dir: dir.path().to_path_buf(),
        package: audiobook(&[("audio/01.mp3", &track)]).bytes(),
    };
    let service = service(window(512));
    let license = license_bytes(LICENSE_ID, PASSPHRASE);
    let (tx, rx) = watch::channel(0.0);

    let path = service.acquire_publication(&fetcher, &license, Some(tx)).await.unwrap();
    assert_eq!(*rx.borrow(), 1.0);

    let asset = Asset::open(&path, FormatHints::default()).unwrap();
    assert_eq!(asset.format(), Format::Audiobook);
    let publication = service
        .open_publication(asset, Some(license.as_slice()), Some(PASSPHRASE), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(read_all(&publication, "audio/01.mp3"), track);
}

#[tokio::test]
async fn test_missing_asset() {
    let result = Asset::open("/nonexistent/book.lcpa", FormatHints::default());
    assert!(matches!(result, Err(LcpError::AssetNotFound(_))));
}
