//! In-memory data store behind the API: profiles, regards, auth sessions,
//! and signing nonces. Resets on restart by design; time is always passed in
//! so every operation tests without a clock.

use crate::regards::{compute_stats, initials, Regard, RegardNft, RegardStats, UserProfile};
use crate::wire::Pubkey;
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use thiserror::Error;

pub const NONCE_TTL_SECONDS: u64 = 300;

const AVATAR_PALETTE: [&str; 6] = ["7c3aed", "2563eb", "0d9488", "db2777", "ea580c", "16a34a"];

#[derive(Debug, PartialEq, Error)]
pub enum ProfileError {
    #[error("this wallet already has a profile")]
    WalletAlreadyRegistered,
    #[error("username is already taken")]
    UsernameTaken,
}

#[derive(Clone)]
pub struct Session {
    pub wallet_address: String,
    pub expires_at: u64,
}

struct IssuedNonce {
    message: String,
    expires_at: u64,
}

pub struct NewRegard {
    pub sender: String,
    pub sender_wallet: String,
    pub recipient_username: String,
    pub amount: f64,
    pub message: String,
    pub transaction_signature: String,
    pub nft: Option<RegardNft>,
}

pub struct Store {
    users: HashMap<String, UserProfile>,
    wallet_profiles: HashMap<String, String>,
    regards: Vec<Regard>,
    sessions: HashMap<String, Session>,
    nonces: HashMap<String, IssuedNonce>,
    next_regard_seq: u64,
    next_session_seq: u64,
}

impl Store {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            wallet_profiles: HashMap::new(),
            regards: Vec::new(),
            sessions: HashMap::new(),
            nonces: HashMap::new(),
            next_regard_seq: 1,
            next_session_seq: 1,
        }
    }

    /// Demo users plus a few regards addressed to alice so dashboards render
    /// non-empty out of the box.
    pub fn with_seed_data(now_secs: u64) -> Self {
        let mut store = Self::new();

        let seeds = [
            ("alice", "Alice Anderson", [11u8; 32], "Designer and open-source tinkerer."),
            ("bob", "Bob Brown", [12u8; 32], "Ships Solana tooling."),
            ("charlie", "Charlie Chen", [13u8; 32], "Streams live coding sessions."),
        ];

        for (username, display_name, key_bytes, bio) in seeds {
            let wallet = Pubkey::from_bytes(key_bytes).to_string();
            store
                .create_profile(
                    &wallet,
                    username,
                    Some(display_name),
                    Some(bio),
                    None,
                    now_secs.saturating_sub(30 * 86_400),
                )
                .expect("seed profiles never collide");
        }

        let gratitude = crate::regards::nft_template_by_id("gratitude").expect("fixed template exists");
        let sample_regards = [
            (
                [21u8; 32],
                "Dana",
                0.05,
                "Thanks for the design review, it saved our launch.",
                7_200,
                Some(&gratitude),
            ),
            (
                [22u8; 32],
                "Eli",
                0.1,
                "Your talk on wallet UX was fantastic.",
                86_400,
                None,
            ),
            (
                [21u8; 32],
                "Dana",
                0.01,
                "Coffee on me. Keep shipping!",
                3 * 86_400,
                None,
            ),
        ];

        for (index, (key_bytes, sender, amount, message, age_secs, template)) in
            sample_regards.into_iter().enumerate()
        {
            let sender_wallet = Pubkey::from_bytes(key_bytes).to_string();
            store.append_regard(
                NewRegard {
                    sender: sender.to_string(),
                    sender_wallet,
                    recipient_username: "alice".to_string(),
                    amount,
                    message: message.to_string(),
                    transaction_signature: format!("seed-signature-{index}"),
                    nft: template.map(|template| RegardNft {
                        name: template.name.clone(),
                        image: template.image.clone(),
                        mint: format!("seed-mint-{index}"),
                    }),
                },
                now_secs.saturating_sub(age_secs),
            );
        }

        store
    }

    pub fn username_available(&self, username: &str) -> bool {
        !self.users.contains_key(&username.to_ascii_lowercase())
    }

    pub fn user_by_username(&self, username: &str) -> Option<&UserProfile> {
        self.users.get(&username.to_ascii_lowercase())
    }

    pub fn user_by_wallet(&self, wallet_address: &str) -> Option<&UserProfile> {
        let username = self.wallet_profiles.get(wallet_address)?;
        self.users.get(username)
    }

    pub fn create_profile(
        &mut self,
        wallet_address: &str,
        username: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        profile_image: Option<&str>,
        now_secs: u64,
    ) -> Result<UserProfile, ProfileError> {
        if self.wallet_profiles.contains_key(wallet_address) {
            return Err(ProfileError::WalletAlreadyRegistered);
        }

        let key = username.to_ascii_lowercase();
        if self.users.contains_key(&key) {
            return Err(ProfileError::UsernameTaken);
        }

        let display_name = display_name
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(username)
            .to_string();
        let profile_image = profile_image
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| placeholder_avatar_url(username, &display_name));

        let profile = UserProfile {
            username: username.to_string(),
            display_name,
            wallet_address: wallet_address.to_string(),
            bio: bio.map(str::trim).filter(|value| !value.is_empty()).map(ToString::to_string),
            profile_image,
            created_at: now_secs,
        };

        self.wallet_profiles.insert(wallet_address.to_string(), key.clone());
        self.users.insert(key, profile.clone());
        Ok(profile)
    }

    pub fn update_profile(
        &mut self,
        wallet_address: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        profile_image: Option<&str>,
    ) -> Option<UserProfile> {
        let key = self.wallet_profiles.get(wallet_address)?.clone();
        let profile = self.users.get_mut(&key)?;

        if let Some(value) = display_name.map(str::trim).filter(|value| !value.is_empty()) {
            profile.display_name = value.to_string();
        }
        if let Some(value) = bio.map(str::trim) {
            profile.bio = (!value.is_empty()).then(|| value.to_string());
        }
        if let Some(value) = profile_image.map(str::trim).filter(|value| !value.is_empty()) {
            profile.profile_image = value.to_string();
        }

        Some(profile.clone())
    }

    pub fn append_regard(&mut self, new: NewRegard, now_secs: u64) -> Regard {
        let seq = self.next_regard_seq;
        self.next_regard_seq += 1;

        let regard = Regard {
            id: format!("regard-{seq}"),
            sender: new.sender,
            sender_wallet: new.sender_wallet,
            recipient_username: new.recipient_username.to_ascii_lowercase(),
            amount: new.amount,
            message: new.message,
            timestamp: now_secs,
            nft: new.nft,
            transaction_signature: new.transaction_signature,
        };

        self.regards.push(regard.clone());
        regard
    }

    /// Newest-first page of regards received by `username`, with the total
    /// count before paging.
    pub fn regards_page(&self, username: &str, limit: usize, offset: usize) -> (Vec<Regard>, usize) {
        let key = username.to_ascii_lowercase();
        let mut received: Vec<&Regard> = self
            .regards
            .iter()
            .filter(|regard| regard.recipient_username == key)
            .collect();
        received.reverse();

        let total = received.len();
        let page = received.into_iter().skip(offset).take(limit).cloned().collect();
        (page, total)
    }

    pub fn stats_for(&self, username: &str) -> RegardStats {
        let key = username.to_ascii_lowercase();
        compute_stats(self.regards.iter().filter(|regard| regard.recipient_username == key))
    }

    /// Returns the message to sign and its TTL in seconds. A fresh nonce
    /// replaces any pending one for the same wallet.
    pub fn issue_nonce(&mut self, wallet_address: &str, now_millis: u64) -> (String, u64) {
        let message = format!("Sign this message to authenticate with DropRegards: {now_millis}");
        self.nonces.insert(
            wallet_address.to_string(),
            IssuedNonce {
                message: message.clone(),
                expires_at: now_millis / 1_000 + NONCE_TTL_SECONDS,
            },
        );

        (message, NONCE_TTL_SECONDS)
    }

    /// Mock verification keeps the original's behavior: a provided nonce must
    /// match the pending one and be unexpired, while an omitted nonce is
    /// accepted. Success consumes the pending nonce either way.
    pub fn consume_nonce(&mut self, wallet_address: &str, provided: Option<&str>, now_secs: u64) -> bool {
        match provided {
            Some(value) => {
                let valid = self
                    .nonces
                    .get(wallet_address)
                    .is_some_and(|nonce| nonce.message == value && now_secs < nonce.expires_at);
                if valid {
                    self.nonces.remove(wallet_address);
                }
                valid
            }
            None => {
                self.nonces.remove(wallet_address);
                true
            }
        }
    }

    pub fn issue_session(&mut self, wallet_address: &str, ttl_seconds: u64, now_secs: u64) -> String {
        self.purge_expired_sessions(now_secs);

        let seq = self.next_session_seq;
        self.next_session_seq += 1;
        let token = opaque_token(wallet_address, seq, now_secs);

        self.sessions.insert(
            token.clone(),
            Session {
                wallet_address: wallet_address.to_string(),
                expires_at: now_secs + ttl_seconds,
            },
        );
        token
    }

    pub fn session_wallet(&self, token: &str, now_secs: u64) -> Option<String> {
        let session = self.sessions.get(token)?;
        if now_secs >= session.expires_at {
            return None;
        }
        Some(session.wallet_address.clone())
    }

    pub fn revoke_session(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn purge_expired_sessions(&mut self, now_secs: u64) {
        self.sessions.retain(|_, session| session.expires_at > now_secs);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic placeholder avatar for profiles created without an image:
/// the display name's initials on a background picked by hashing the username.
pub fn placeholder_avatar_url(username: &str, display_name: &str) -> String {
    let mut hasher = FnvHasher::default();
    username.to_ascii_lowercase().hash(&mut hasher);
    let background = AVATAR_PALETTE[(hasher.finish() % AVATAR_PALETTE.len() as u64) as usize];
    let initials = initials(display_name);

    format!("https://ui-avatars.com/api/?name={initials}&background={background}&color=fff&size=256")
}

fn opaque_token(wallet_address: &str, seq: u64, now_secs: u64) -> String {
    let mut hasher = FnvHasher::default();
    wallet_address.hash(&mut hasher);
    seq.hash(&mut hasher);
    now_secs.hash(&mut hasher);

    format!("drt-{seq}-{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn wallet(byte: u8) -> String {
        Pubkey::from_bytes([byte; 32]).to_string()
    }

    #[test]
    fn seed_users_resolve_by_username_and_wallet() {
        let store = Store::with_seed_data(NOW);

        let alice = store.user_by_username("alice").expect("alice is seeded");
        assert_eq!(alice.display_name, "Alice Anderson");
        assert_eq!(
            store.user_by_wallet(&alice.wallet_address).map(|user| user.username.as_str()),
            Some("alice")
        );
        assert!(store.user_by_username("ALICE").is_some(), "lookup is case-insensitive");
        assert!(store.user_by_username("nobody").is_none());
    }

    #[test]
    fn seeded_regards_give_alice_a_non_empty_dashboard() {
        let store = Store::with_seed_data(NOW);

        let stats = store.stats_for("alice");
        assert_eq!(stats.total_regards, 3);
        assert_eq!(stats.total_nfts, 1);
        assert_eq!(stats.unique_senders, 2);
        assert_eq!(stats.total_sol, 0.16);

        let (page, total) = store.regards_page("bob", 10, 0);
        assert_eq!(total, 0);
        assert!(page.is_empty());
    }

    #[test]
    fn profile_creation_enforces_uniqueness() {
        let mut store = Store::new();
        store
            .create_profile(&wallet(1), "dana", Some("Dana"), None, None, NOW)
            .expect("first profile succeeds");

        assert_eq!(
            store.create_profile(&wallet(1), "other", None, None, None, NOW),
            Err(ProfileError::WalletAlreadyRegistered)
        );
        assert_eq!(
            store.create_profile(&wallet(2), "DANA", None, None, None, NOW),
            Err(ProfileError::UsernameTaken)
        );
        assert!(!store.username_available("dana"));
        assert!(store.username_available("erin"));
    }

    #[test]
    fn missing_profile_image_falls_back_to_placeholder_avatar() {
        let mut store = Store::new();
        let profile = store
            .create_profile(&wallet(3), "erin", Some("Erin Example"), None, None, NOW)
            .expect("profile creates");

        assert!(profile.profile_image.contains("name=EE"));
        assert_eq!(profile.profile_image, placeholder_avatar_url("erin", "Erin Example"));
    }

    #[test]
    fn placeholder_avatar_is_deterministic_per_username() {
        let first = placeholder_avatar_url("alice", "Alice Anderson");
        let second = placeholder_avatar_url("Alice", "Alice Anderson");
        assert_eq!(first, second, "case must not change the avatar");

        let other = placeholder_avatar_url("bob", "Alice Anderson");
        assert_ne!(first, other, "different usernames should usually differ");
    }

    #[test]
    fn profile_update_changes_only_provided_fields() {
        let mut store = Store::new();
        store
            .create_profile(&wallet(4), "fred", Some("Fred"), Some("old bio"), None, NOW)
            .expect("profile creates");

        let updated = store
            .update_profile(&wallet(4), Some("Freddie"), None, None)
            .expect("update succeeds");
        assert_eq!(updated.display_name, "Freddie");
        assert_eq!(updated.bio.as_deref(), Some("old bio"));

        let cleared = store
            .update_profile(&wallet(4), None, Some(""), None)
            .expect("update succeeds");
        assert_eq!(cleared.bio, None, "empty bio clears the field");

        assert!(store.update_profile(&wallet(5), Some("x"), None, None).is_none());
    }

    #[test]
    fn regard_pages_are_newest_first_with_stable_windows() {
        let mut store = Store::new();
        for index in 0..5u64 {
            store.append_regard(
                NewRegard {
                    sender: format!("sender-{index}"),
                    sender_wallet: wallet(index as u8),
                    recipient_username: "alice".to_string(),
                    amount: 0.01,
                    message: format!("message {index}"),
                    transaction_signature: format!("sig-{index}"),
                    nft: None,
                },
                NOW + index,
            );
        }

        let (first_page, total) = store.regards_page("alice", 2, 0);
        assert_eq!(total, 5);
        assert_eq!(first_page[0].message, "message 4");
        assert_eq!(first_page[1].message, "message 3");

        let (second_page, _) = store.regards_page("alice", 2, 2);
        assert_eq!(second_page[0].message, "message 2");

        let (past_end, _) = store.regards_page("alice", 10, 5);
        assert!(past_end.is_empty());
    }

    #[test]
    fn sessions_validate_until_expiry_and_purge() {
        let mut store = Store::new();
        let token = store.issue_session(&wallet(6), 3_600, NOW);

        assert_eq!(store.session_wallet(&token, NOW + 3_599), Some(wallet(6)));
        assert_eq!(store.session_wallet(&token, NOW + 3_600), None);
        assert_eq!(store.session_wallet("drt-999-bogus", NOW), None);

        store.purge_expired_sessions(NOW + 4_000);
        assert!(!store.revoke_session(&token), "purged session is gone");

        let fresh = store.issue_session(&wallet(6), 3_600, NOW);
        assert!(store.revoke_session(&fresh));
        assert_eq!(store.session_wallet(&fresh, NOW), None);
    }

    #[test]
    fn issued_tokens_are_unique() {
        let mut store = Store::new();
        let first = store.issue_session(&wallet(7), 60, NOW);
        let second = store.issue_session(&wallet(7), 60, NOW);
        assert_ne!(first, second);
    }

    #[test]
    fn nonce_round_trip_and_expiry() {
        let mut store = Store::new();
        let (message, ttl) = store.issue_nonce(&wallet(8), NOW * 1_000);
        assert!(message.starts_with("Sign this message to authenticate with DropRegards: "));
        assert_eq!(ttl, NONCE_TTL_SECONDS);

        assert!(!store.consume_nonce(&wallet(8), Some("wrong"), NOW));
        assert!(store.consume_nonce(&wallet(8), Some(&message), NOW + 10));
        assert!(
            !store.consume_nonce(&wallet(8), Some(&message), NOW + 10),
            "a nonce is single-use"
        );

        let (expired, _) = store.issue_nonce(&wallet(8), NOW * 1_000);
        assert!(!store.consume_nonce(&wallet(8), Some(&expired), NOW + NONCE_TTL_SECONDS + 1));

        assert!(store.consume_nonce(&wallet(9), None, NOW), "omitted nonce stays mock-accepted");
    }
}
