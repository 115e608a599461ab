//! lcp-core - reader core for Readium LCP protected packages
//!
//! Opens an encrypted package (audiobook, PDF, EPUB or web publication),
//! authenticates a passphrase against its LCP license and exposes every
//! resource as a range-readable plaintext stream. Decryption happens in
//! bounded, block-aligned windows and plaintext never touches the disk.
//!
//! # Example
//! ```no_run
//! use lcp_core::{Asset, FormatHints, LcpConfig, LcpService};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> lcp_core::Result<()> {
//! let service = LcpService::new(LcpConfig::default())?;
//! let asset = Asset::open("book.lcpa", FormatHints::default())?;
//! let license = std::fs::read("book.lcpl")?;
//! let publication = service
//!     .open_publication(asset, Some(license.as_slice()), Some("passphrase"), &CancellationToken::new())
//!     .await?;
//!
//! let first = &publication.reading_order()[0];
//! let mut reader = publication.open_resource(first);
//! reader.open(0)?;
//! let head = reader.read(4096)?;
//! # let _ = head;
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod fetch;
pub mod license;
pub mod publication;
pub mod resource;
pub mod rights;
pub mod service;
pub mod storage;

pub use asset::Asset;
pub use config::{LcpConfig, LcpConfigBuilder};
pub use container::{ByteSource, Container, EntryHandle, FileSource, MemorySource};
pub use crypto::{CipherAlgorithm, DecryptionContext};
pub use error::{CancelReason, LcpError, Result};
pub use fetch::{HttpPackageFetcher, PackageFetcher};
pub use license::{AuthenticationReason, Authenticator, License, LicenseStatus, PassphraseCache};
pub use publication::{EncryptionProfile, Format, FormatHints, Link, Metadata, Publication};
pub use resource::{EncryptedResource, ResourceState};
pub use rights::Usability;
pub use service::LcpService;
pub use storage::PassphraseStore;
