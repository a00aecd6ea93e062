//! Downloaded package trust verification
//!
//! A package is trusted only if
//! 1. it carries an embedded signature whose signer certificate can be extracted,
//! 2. that certificate is byte-for-byte one of the pinned publisher certificates
//!    shipped with the current configuration, and
//! 3. the platform signature verification accepts the file (revocation checks
//!    disabled, UI only for attended checks).
//!
//! Pinning is checked before the platform chain so that a certificate which
//! chains to a public root but is not pinned is never accepted.

use crate::error::{Result, UpdaterError};
use log::{error, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Signer certificate extracted from a signed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerCertificate {
    /// Re-encoded DER certificate
    pub der: Vec<u8>,
    /// Simple display name of the subject
    pub subject: String,
}

/// Platform facility that understands embedded package signatures
pub trait SignatureInspector: Send + Sync {
    /// Extract the signer certificate from the package's signed-data envelope
    fn signer_certificate(&self, package: &Path) -> Result<SignerCertificate>;

    /// Run the platform signature/trust verification on the package
    fn verify_signature(&self, package: &Path, interactive: bool) -> Result<()>;
}

/// Set of pinned publisher certificates
///
/// Built from a single configuration document; a new document replaces the
/// set instead of extending it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinnedCertificates {
    certificates: HashSet<Vec<u8>>,
}

impl PinnedCertificates {
    pub fn new<I>(certificates: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            certificates: certificates.into_iter().collect(),
        }
    }

    /// Exact DER membership
    pub fn contains(&self, der: &[u8]) -> bool {
        self.certificates.contains(der)
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Outcome of a trust evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecision {
    pub trusted: bool,
    /// Subject of the signer that was examined, if one could be extracted
    pub signer: Option<String>,
    /// Why the package was rejected
    pub reason: Option<String>,
}

impl TrustDecision {
    fn accept(signer: String) -> Self {
        Self {
            trusted: true,
            signer: Some(signer),
            reason: None,
        }
    }

    fn reject(signer: Option<String>, reason: String) -> Self {
        Self {
            trusted: false,
            signer,
            reason: Some(reason),
        }
    }

    /// Convert into a result, mapping rejection to `TrustVerification`
    pub fn into_result(self) -> Result<String> {
        if self.trusted {
            Ok(self.signer.unwrap_or_default())
        } else {
            Err(UpdaterError::TrustVerification(
                self.reason.unwrap_or_else(|| "untrusted package".to_string()),
            ))
        }
    }
}

/// Pinning plus platform signature verification
#[derive(Clone)]
pub struct TrustVerifier {
    inspector: Arc<dyn SignatureInspector>,
}

impl TrustVerifier {
    pub fn new(inspector: Arc<dyn SignatureInspector>) -> Self {
        Self { inspector }
    }

    /// Returns true only if every verification step succeeds
    pub fn verify(&self, package: &Path, pinned: &PinnedCertificates, interactive: bool) -> bool {
        self.evaluate(package, pinned, interactive).trusted
    }

    /// Evaluate a package and report which signer was examined
    pub fn evaluate(
        &self,
        package: &Path,
        pinned: &PinnedCertificates,
        interactive: bool,
    ) -> TrustDecision {
        info!("Verifying package signature of {}", package.display());

        let signer = match self.inspector.signer_certificate(package) {
            Ok(signer) => signer,
            Err(e) => {
                warn!("No usable signature on {}: {}", package.display(), e);
                return TrustDecision::reject(None, format!("package is not signed: {}", e));
            }
        };

        if !pinned.contains(&signer.der) {
            error!(
                "Signer '{}' is not among the {} pinned certificates",
                signer.subject,
                pinned.len()
            );
            return TrustDecision::reject(
                Some(signer.subject.clone()),
                format!("signer '{}' is not a trusted publisher", signer.subject),
            );
        }

        if let Err(e) = self.inspector.verify_signature(package, interactive) {
            error!("Signature verification failed for '{}': {}", signer.subject, e);
            return TrustDecision::reject(Some(signer.subject), format!("signature check failed: {}", e));
        }

        info!("Package signature OK, signed by '{}'", signer.subject);
        TrustDecision::accept(signer.subject)
    }
}

/// Compute the SHA256 of a file for diagnostics
pub fn compute_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Inspector that treats the file's first line as the signer and
    /// records the tail as the "signed" payload.
    ///
    /// File layout: `<signer>\n<payload>`. The signature is valid when the
    /// payload equals what was registered for that signer at signing time.
    pub(crate) struct FakeInspector {
        pub signed: Mutex<Vec<(String, Vec<u8>)>>,
        pub calls: Mutex<Vec<bool>>,
    }

    impl FakeInspector {
        pub fn new() -> Self {
            Self {
                signed: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn sign(&self, path: &Path, signer: &str, payload: &[u8]) {
            let mut content = format!("{}\n", signer).into_bytes();
            content.extend_from_slice(payload);
            std::fs::write(path, content).unwrap();
            self.signed
                .lock()
                .unwrap()
                .push((signer.to_string(), payload.to_vec()));
        }

        fn split(path: &Path) -> Option<(String, Vec<u8>)> {
            let content = std::fs::read(path).ok()?;
            let pos = content.iter().position(|b| *b == b'\n')?;
            let signer = String::from_utf8(content[..pos].to_vec()).ok()?;
            Some((signer, content[pos + 1..].to_vec()))
        }
    }

    pub(crate) fn der_for(signer: &str) -> Vec<u8> {
        format!("DER:{}", signer).into_bytes()
    }

    impl SignatureInspector for FakeInspector {
        fn signer_certificate(&self, package: &Path) -> Result<SignerCertificate> {
            let (signer, _) = Self::split(package)
                .ok_or_else(|| UpdaterError::TrustVerification("no envelope".into()))?;
            Ok(SignerCertificate {
                der: der_for(&signer),
                subject: signer,
            })
        }

        fn verify_signature(&self, package: &Path, interactive: bool) -> Result<()> {
            self.calls.lock().unwrap().push(interactive);
            let (signer, payload) = Self::split(package)
                .ok_or_else(|| UpdaterError::TrustVerification("no envelope".into()))?;
            let signed = self.signed.lock().unwrap();
            if signed.iter().any(|(s, p)| *s == signer && *p == payload) {
                Ok(())
            } else {
                Err(UpdaterError::TrustVerification("digest mismatch".into()))
            }
        }
    }

    fn pinned(signers: &[&str]) -> PinnedCertificates {
        PinnedCertificates::new(signers.iter().map(|s| der_for(s)))
    }

    #[test]
    fn test_pinned_and_valid_is_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Open-EID.msi");
        let inspector = Arc::new(FakeInspector::new());
        inspector.sign(&package, "RIIGI INFOSUSTEEMI AMET", b"payload");

        let verifier = TrustVerifier::new(inspector.clone());
        let decision = verifier.evaluate(&package, &pinned(&["RIIGI INFOSUSTEEMI AMET"]), true);
        assert!(decision.trusted);
        assert_eq!(decision.signer.as_deref(), Some("RIIGI INFOSUSTEEMI AMET"));
        assert_eq!(*inspector.calls.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_tampered_package_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Open-EID.msi");
        let inspector = Arc::new(FakeInspector::new());
        inspector.sign(&package, "RIIGI INFOSUSTEEMI AMET", b"payload");

        let mut bytes = std::fs::read(&package).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&package, bytes).unwrap();

        let verifier = TrustVerifier::new(inspector);
        assert!(!verifier.verify(&package, &pinned(&["RIIGI INFOSUSTEEMI AMET"]), false));
    }

    #[test]
    fn test_valid_but_unpinned_signer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Open-EID.msi");
        let inspector = Arc::new(FakeInspector::new());
        inspector.sign(&package, "Some Public CA Customer", b"payload");

        let verifier = TrustVerifier::new(inspector.clone());
        let decision = verifier.evaluate(&package, &pinned(&["RIIGI INFOSUSTEEMI AMET"]), false);
        assert!(!decision.trusted);
        assert_eq!(decision.signer.as_deref(), Some("Some Public CA Customer"));
        // Platform verification is never consulted for unpinned signers
        assert!(inspector.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsigned_package_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("unsigned.msi");
        std::fs::write(&package, b"no newline means no envelope").unwrap();

        let verifier = TrustVerifier::new(Arc::new(FakeInspector::new()));
        let decision = verifier.evaluate(&package, &pinned(&["RIIGI INFOSUSTEEMI AMET"]), false);
        assert!(!decision.trusted);
        assert!(decision.signer.is_none());
        assert!(decision.into_result().is_err());
    }

    #[test]
    fn test_empty_pin_set_trusts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("Open-EID.msi");
        let inspector = Arc::new(FakeInspector::new());
        inspector.sign(&package, "RIIGI INFOSUSTEEMI AMET", b"payload");

        let verifier = TrustVerifier::new(inspector);
        assert!(!verifier.verify(&package, &PinnedCertificates::default(), false));
    }

    #[test]
    fn test_checksum_computation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("checksum.txt");
        std::fs::write(&file, b"Hello, World!").unwrap();

        // SHA256("Hello, World!")
        assert_eq!(
            compute_checksum(&file).unwrap(),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
