//! Domain types shared by the API and the frontend: profiles, regards,
//! stats, NFT templates, plus the small pure helpers around them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 20;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub wallet_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub profile_image: String,
    pub created_at: u64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Regard {
    pub id: String,
    /// Display handle of the sender (profile name or truncated wallet).
    pub sender: String,
    pub sender_wallet: String,
    pub recipient_username: String,
    /// Amount in SOL.
    pub amount: f64,
    pub message: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nft: Option<RegardNft>,
    pub transaction_signature: String,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegardNft {
    pub name: String,
    pub image: String,
    pub mint: String,
}

#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegardStats {
    pub total_sol: f64,
    pub total_regards: usize,
    pub total_nfts: usize,
    pub unique_senders: usize,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: String,
}

/// The fixed template set; template ids are part of the API surface.
pub fn nft_templates() -> Vec<NftTemplate> {
    vec![
        NftTemplate {
            id: "gratitude".to_string(),
            name: "Gratitude".to_string(),
            description: "A warm thank-you, minted as a keepsake.".to_string(),
            image: "/assets/nft-gratitude.svg".to_string(),
        },
        NftTemplate {
            id: "star".to_string(),
            name: "Star".to_string(),
            description: "For the people who go above and beyond.".to_string(),
            image: "/assets/nft-star.svg".to_string(),
        },
        NftTemplate {
            id: "collaboration".to_string(),
            name: "Collaboration".to_string(),
            description: "Celebrates building something together.".to_string(),
            image: "/assets/nft-collaboration.svg".to_string(),
        },
    ]
}

pub fn nft_template_by_id(id: &str) -> Option<NftTemplate> {
    nft_templates().into_iter().find(|template| template.id == id)
}

#[derive(Debug, PartialEq, Error)]
pub enum UsernameError {
    #[error("username must be between {USERNAME_MIN_CHARS} and {USERNAME_MAX_CHARS} characters")]
    BadLength,
    #[error("username may only contain letters, numbers, underscores, and hyphens")]
    BadCharacters,
}

pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    let length = username.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&length) {
        return Err(UsernameError::BadLength);
    }

    let allowed = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !allowed {
        return Err(UsernameError::BadCharacters);
    }

    Ok(())
}

/// `abcd…wxyz` form used wherever a raw wallet address would be noise.
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 9 {
        return address.to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Up to two uppercase initials for placeholder avatars.
pub fn initials(display_name: &str) -> String {
    let letters: String = display_name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect();

    if letters.is_empty() {
        "?".to_string()
    } else {
        letters
    }
}

pub fn relative_timestamp(now_secs: u64, then_secs: u64) -> String {
    let elapsed = now_secs.saturating_sub(then_secs);
    match elapsed {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", elapsed / 60),
        3_600..=86_399 => format!("{}h ago", elapsed / 3_600),
        86_400..=604_799 => format!("{}d ago", elapsed / 86_400),
        _ => format!("{}w ago", elapsed / 604_800),
    }
}

pub fn round_sol(amount: f64) -> f64 {
    (amount * 10_000.0).round() / 10_000.0
}

pub fn compute_stats<'a>(regards: impl IntoIterator<Item = &'a Regard>) -> RegardStats {
    let mut total_sol = 0.0;
    let mut total_regards = 0;
    let mut total_nfts = 0;
    let mut senders: HashSet<&str> = HashSet::new();

    for regard in regards {
        total_sol += regard.amount;
        total_regards += 1;
        if regard.nft.is_some() {
            total_nfts += 1;
        }
        senders.insert(regard.sender_wallet.as_str());
    }

    RegardStats {
        total_sol: round_sol(total_sol),
        total_regards,
        total_nfts,
        unique_senders: senders.len(),
    }
}
