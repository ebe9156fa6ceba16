//! Secret handling with automatic memory zeroization
//!
//! Wraps sensitive byte material (API keys, bearer tokens) so that the
//! backing memory is zeroed when the value is dropped, and so that the
//! value can never leak through `Debug`/`Display` formatting.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret string that zeroes its memory on drop
///
/// # Security Note
/// `expose()` hands out the plaintext; callers must not store or log the
/// returned slice. Use `constant_time_eq()` for comparisons of secret
/// material to avoid timing side channels.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new secure string, taking ownership of the plaintext
    pub fn new(s: String) -> Self {
        Self { inner: s }
    }

    /// Expose the inner value (use with caution)
    ///
    /// # Security Warning
    /// The exposed value must be used immediately and never stored.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Expose the inner value as bytes, for signing operations
    pub fn expose_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Get length in bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Compare with another secure string in constant time
    pub fn constant_time_eq(&self, other: &SecureString) -> bool {
        constant_time_eq(self.expose_bytes(), other.expose_bytes())
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    //! Unit tests for security.
    use super::*;

    /// Validates `SecureString::new` behavior for the secure string creation
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `s.len()` equals `4`.
    /// - Confirms `s.expose()` equals `"test"`.
    #[test]
    fn test_secure_string_creation() {
        let s = SecureString::new("test".to_string());
        assert_eq!(s.len(), 4);
        assert_eq!(s.expose(), "test");
    }

    /// Validates `SecureString::new` behavior for the secure string empty
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `s.is_empty()` evaluates to true.
    #[test]
    fn test_secure_string_empty() {
        let s = SecureString::new(String::new());
        assert!(s.is_empty());
    }

    /// Validates `SecureString::new` behavior for the secure string debug
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `debug_str` equals `"SecureString(***)"`.
    /// - Ensures `!debug_str.contains("hunter2")` evaluates to true.
    #[test]
    fn test_secure_string_debug_redacted() {
        let s = SecureString::new("hunter2".to_string());
        let debug_str = format!("{:?}", s);
        assert_eq!(debug_str, "SecureString(***)");
        assert!(!debug_str.contains("hunter2"));
    }

    /// Validates `SecureString::new` behavior for the secure string display
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `display_str` equals `"***"`.
    #[test]
    fn test_secure_string_display_redacted() {
        let s = SecureString::new("hunter2".to_string());
        let display_str = format!("{}", s);
        assert_eq!(display_str, "***");
    }

    /// Validates `SecureString::new` behavior for the constant time eq
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `s1.constant_time_eq(&s2)` evaluates to true.
    /// - Ensures `!s1.constant_time_eq(&s3)` evaluates to true.
    #[test]
    fn test_constant_time_eq() {
        let s1 = SecureString::new("test".to_string());
        let s2 = SecureString::new("test".to_string());
        let s3 = SecureString::new("different".to_string());

        assert!(s1.constant_time_eq(&s2));
        assert!(!s1.constant_time_eq(&s3));
    }

    /// Validates `SecureString::new` behavior for the constant time eq
    /// different lengths scenario.
    ///
    /// Assertions:
    /// - Ensures `!s1.constant_time_eq(&s2)` evaluates to true.
    #[test]
    fn test_constant_time_eq_different_lengths() {
        let s1 = SecureString::new("short".to_string());
        let s2 = SecureString::new("much longer string".to_string());

        assert!(!s1.constant_time_eq(&s2));
    }
}
