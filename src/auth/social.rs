//! Social sign-in stub.
//!
//! No provider token is verified: the caller-supplied external id is trusted
//! as-is and mapped onto a synthetic local account.
use std::{fmt, str::FromStr};

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialProvider {
    Google,
    Apple,
    Microsoft,
}

impl SocialProvider {
    pub fn slug(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
            Self::Microsoft => "microsoft",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Apple => "Apple",
            Self::Microsoft => "Microsoft",
        }
    }
}

impl fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for SocialProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            "microsoft" => Ok(Self::Microsoft),
            other => Err(format!("Unsupported provider: {other}")),
        }
    }
}

/// Local account a provider identity maps onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialIdentity {
    pub email: String,
    pub name: String,
}

/// Whether `email` lies in the synthetic namespace social accounts are minted in.
pub fn is_social_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    local.starts_with("user_")
        && [SocialProvider::Google, SocialProvider::Apple, SocialProvider::Microsoft]
            .iter()
            .any(|p| domain.strip_suffix(".com") == Some(p.slug()))
}

impl SocialIdentity {
    pub fn resolve(
        provider: SocialProvider,
        external_id: Option<&str>,
        name: Option<&str>,
    ) -> Self {
        let id = external_id
            .map(|raw| {
                raw.chars()
                    .filter(char::is_ascii_alphanumeric)
                    .map(|c| c.to_ascii_lowercase())
                    .take(64)
                    .collect::<String>()
            })
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..8].to_string());

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} User", provider.display_name()));

        Self {
            email: format!("user_{id}@{}.com", provider.slug()),
            name,
        }
    }
}
