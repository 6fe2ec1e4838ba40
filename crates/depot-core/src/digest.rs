//! # Digest Verification
//!
//! Parses `Digest` request headers (`sha-256=<base64>, md5=<base64>`) into a
//! [`DigestSet`] that observes the uploaded bytes as they are written and
//! reports, once the stream has ended, whether every declared digest matched.
//!
//! Algorithms are looked up in a registry of constructors. Adding an
//! algorithm means adding one entry to [`REGISTRY`].

use std::fmt;
use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use digest::Digest;
use md5::Md5;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{DigestError, DigestParseFailure};

/// Incremental verifier for one declared digest.
pub trait DigestValidator: Send {
    /// Registered algorithm name.
    fn algorithm(&self) -> &'static str;

    /// Feed the next chunk of the stream.
    fn update(&mut self, bytes: &[u8]);

    /// Whether the bytes seen so far hash to the expected value.
    fn is_valid(&self) -> bool;
}

/// [`DigestValidator`] backed by any RustCrypto hasher.
pub struct HashValidator<D> {
    algorithm: &'static str,
    expected: Vec<u8>,
    hasher: D,
}

impl<D: Digest> HashValidator<D> {
    pub fn new(algorithm: &'static str, expected: Vec<u8>) -> Self {
        Self {
            algorithm,
            expected,
            hasher: D::new(),
        }
    }
}

impl<D: Digest + Clone + Send> DigestValidator for HashValidator<D> {
    fn algorithm(&self) -> &'static str {
        self.algorithm
    }

    fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.hasher, bytes);
    }

    fn is_valid(&self) -> bool {
        let actual = self.hasher.clone().finalize();
        if actual.len() != self.expected.len() {
            return false;
        }
        actual.as_slice().ct_eq(&self.expected).into()
    }
}

type Constructor = fn(&'static str, Vec<u8>) -> Box<dyn DigestValidator>;

fn construct<D>(algorithm: &'static str, expected: Vec<u8>) -> Box<dyn DigestValidator>
where
    D: Digest + Clone + Send + 'static,
{
    Box::new(HashValidator::<D>::new(algorithm, expected))
}

/// Supported algorithms, by the lower-case name used in `Digest` headers.
pub static REGISTRY: &[(&str, Constructor)] = &[
    ("sha-256", construct::<Sha256>),
    ("md5", construct::<Md5>),
];

/// Names of the supported algorithms, in registry order.
pub fn supported_algorithms() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

fn lookup(name: &str) -> Option<(&'static str, Constructor)> {
    REGISTRY
        .iter()
        .find(|(registered, _)| registered.eq_ignore_ascii_case(name))
        .map(|(registered, constructor)| (*registered, *constructor))
}

/// Every digest declared by one request.
///
/// Writing to a `DigestSet` feeds all of its validators with the same bytes
/// in the same order. An empty set is vacuously valid; use [`is_empty`] to
/// tell "no digest requested" apart from "digest matched".
///
/// [`is_empty`]: DigestSet::is_empty
#[derive(Default)]
pub struct DigestSet {
    validators: Vec<Box<dyn DigestValidator>>,
}

impl DigestSet {
    /// Parse a `Digest` header value.
    ///
    /// Tokens are separated by `,` and split on their first `=`. Tokens
    /// without `=` and unknown algorithm names are skipped. A supported
    /// algorithm whose value is not valid base64 is a parse failure; all
    /// such failures are reported together.
    pub fn parse(header: &str) -> Result<Self, DigestError> {
        let mut validators = Vec::new();
        let mut failures = Vec::new();

        for token in header.split(',') {
            let Some((name, value)) = token.split_once('=') else {
                continue;
            };
            let Some((algorithm, constructor)) = lookup(name.trim()) else {
                tracing::debug!(algorithm = %name.trim(), "ignoring unsupported digest algorithm");
                continue;
            };
            match STANDARD.decode(value.trim()) {
                Ok(expected) => validators.push(constructor(algorithm, expected)),
                Err(source) => failures.push(DigestParseFailure { algorithm, source }),
            }
        }

        if failures.is_empty() {
            Ok(Self { validators })
        } else {
            Err(DigestError { failures })
        }
    }

    /// Whether no supported digest was declared.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn algorithms(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.algorithm()).collect()
    }

    /// Whether every declared digest matches the bytes written so far.
    pub fn is_valid(&self) -> bool {
        self.validators.iter().all(|v| v.is_valid())
    }
}

impl Write for DigestSet {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for validator in &mut self.validators {
            validator.update(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for DigestSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestSet")
            .field("algorithms", &self.algorithms())
            .finish()
    }
}
