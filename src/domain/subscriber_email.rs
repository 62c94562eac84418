use sha2::{Digest, Sha256};
use validator::validate_email;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    pub fn parse(email: String) -> Result<SubscriberEmail, String> {
        let email = email.trim().to_string();
        let is_valid_email = validate_email(&email);

        if !is_valid_email {
            return Err(format!("{} email is not valid", email));
        }

        Ok(Self(email))
    }

    /// Lowercased form used for every equality check against stored data.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn hash(&self) -> EmailHash {
        EmailHash::of(&self.0)
    }
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriberEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of the trimmed, lowercased email, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EmailHash(String);

impl EmailHash {
    pub fn of(email: &str) -> EmailHash {
        let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());

        EmailHash(hex::encode(digest))
    }

    /// Wraps a hash previously produced by [`EmailHash::of`] and read back from storage.
    pub fn from_stored(hash: String) -> EmailHash {
        EmailHash(hash)
    }
}

impl AsRef<str> for EmailHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
