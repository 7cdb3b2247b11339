//! Client identity loading
//!
//! This module handles:
//! * Splitting a PEM blob into its certificate and key sections
//! * Decrypting passphrase-protected keys (PKCS#8 and OpenSSL's traditional format)
//! * Producing the certificate chain and key rustls presents during the handshake

mod legacy;
mod material;

pub use material::ClientIdentity;
