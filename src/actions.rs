//! Solana Actions ("blinks") payloads: the metadata served to action
//! clients, the actions.json routing rules, and donation amount parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Preset donation amounts offered next to the custom input, in SOL.
pub const DONATION_PRESETS_SOL: [f64; 3] = [0.01, 0.05, 0.1];

pub const ACTION_VERSION: &str = "2.4";

pub fn donate_action_path(username: &str) -> String {
    format!("/api/actions/{username}/donate-sol")
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ActionRuleSet {
    pub rules: Vec<ActionRule>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRule {
    pub path_pattern: String,
    pub api_path: String,
}

impl ActionRuleSet {
    /// Maps public profile paths onto their donate action endpoint.
    pub fn profile_rules() -> Self {
        Self {
            rules: vec![ActionRule {
                path_pattern: "/*".to_string(),
                api_path: "/api/actions/*/donate-sol".to_string(),
            }],
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ActionMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    pub icon: String,
    pub title: String,
    pub description: String,
    pub label: String,
    pub links: ActionLinks,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ActionLinks {
    pub actions: Vec<LinkedAction>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LinkedAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ActionParameter>>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ActionParameter {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub label: String,
    pub required: bool,
}

/// Metadata for a user's donate action: three presets plus a custom-amount
/// link whose href carries an `{amount}` template parameter.
pub fn donation_metadata(username: &str, display_name: &str, icon_url: &str) -> ActionMetadata {
    let base = donate_action_path(username);

    let mut actions: Vec<LinkedAction> = DONATION_PRESETS_SOL
        .iter()
        .map(|amount| LinkedAction {
            kind: "transaction".to_string(),
            label: format!("{amount} SOL"),
            href: format!("{base}?amount={amount}"),
            parameters: None,
        })
        .collect();

    actions.push(LinkedAction {
        kind: "transaction".to_string(),
        label: "Send SOL".to_string(),
        href: format!("{base}?amount={{amount}}"),
        parameters: Some(vec![ActionParameter {
            kind: "number".to_string(),
            name: "amount".to_string(),
            label: "Enter a custom SOL amount".to_string(),
            required: true,
        }]),
    });

    ActionMetadata {
        kind: "action".to_string(),
        icon: icon_url.to_string(),
        title: format!("DropRegards to {display_name}"),
        description: format!("Send SOL to {display_name} as a token of your regard."),
        label: "Send SOL".to_string(),
        links: ActionLinks { actions },
    }
}

#[derive(Clone, Deserialize)]
pub struct ActionPostRequest {
    pub account: String,
}

#[derive(Clone, Serialize)]
pub struct ActionPostResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionPostResponse {
    pub fn unsigned(transaction_base64: String, message: String) -> Self {
        Self {
            kind: "transaction".to_string(),
            transaction: transaction_base64,
            message: Some(message),
        }
    }
}

/// Action-client error body; action endpoints return this shape for every
/// failure so wallets can render the message.
#[derive(Clone, Serialize, Deserialize)]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Error)]
pub enum AmountError {
    #[error("amount is required")]
    Missing,
    #[error("amount must be a number")]
    Invalid,
    #[error("amount must be greater than 0")]
    TooSmall,
    #[error("amount exceeds the maximum of {max} SOL")]
    TooLarge { max: f64 },
}

impl AmountError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Missing => "amount_missing",
            Self::Invalid => "amount_invalid",
            Self::TooSmall => "amount_too_small",
            Self::TooLarge { .. } => "amount_too_large",
        }
    }
}

/// Parses and range-checks a donation amount in SOL. Lamport granularity is
/// enforced later at transaction-build time.
pub fn parse_donation_amount(raw: Option<&str>, max_sol: f64) -> Result<f64, AmountError> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty());
    let Some(raw) = raw else {
        return Err(AmountError::Missing);
    };

    let amount: f64 = raw.parse().map_err(|_| AmountError::Invalid)?;
    if !amount.is_finite() {
        return Err(AmountError::Invalid);
    }
    if amount <= 0.0 {
        return Err(AmountError::TooSmall);
    }
    if amount > max_sol {
        return Err(AmountError::TooLarge { max: max_sol });
    }

    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_offers_presets_and_custom_template() {
        let metadata = donation_metadata("alice", "Alice", "https://example.com/alice.png");

        assert_eq!(metadata.kind, "action");
        assert_eq!(metadata.label, "Send SOL");
        assert_eq!(metadata.links.actions.len(), 4);

        let hrefs: Vec<&str> = metadata
            .links
            .actions
            .iter()
            .map(|action| action.href.as_str())
            .collect();
        assert_eq!(
            hrefs,
            vec![
                "/api/actions/alice/donate-sol?amount=0.01",
                "/api/actions/alice/donate-sol?amount=0.05",
                "/api/actions/alice/donate-sol?amount=0.1",
                "/api/actions/alice/donate-sol?amount={amount}",
            ]
        );

        let custom = metadata.links.actions.last().expect("custom action present");
        let parameters = custom.parameters.as_ref().expect("custom action has parameters");
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0].name, "amount");
        assert_eq!(parameters[0].kind, "number");
        assert!(parameters[0].required);
    }

    #[test]
    fn metadata_serializes_with_protocol_field_names() {
        let metadata = donation_metadata("bob", "Bob", "https://example.com/bob.png");
        let value = serde_json::to_value(&metadata).expect("metadata serializes");

        assert_eq!(value["type"], "action");
        assert_eq!(value["links"]["actions"][0]["type"], "transaction");
        // Preset entries must not carry a parameters key at all.
        assert!(value["links"]["actions"][0].get("parameters").is_none());
        assert_eq!(value["links"]["actions"][3]["parameters"][0]["type"], "number");
    }

    #[test]
    fn profile_rules_route_to_the_action_api() {
        let rules = ActionRuleSet::profile_rules();
        let value = serde_json::to_value(&rules).expect("rules serialize");

        assert_eq!(value["rules"][0]["pathPattern"], "/*");
        assert_eq!(value["rules"][0]["apiPath"], "/api/actions/*/donate-sol");
    }

    #[test]
    fn donation_amount_accepts_presets_and_custom_values() {
        for preset in DONATION_PRESETS_SOL {
            let parsed = parse_donation_amount(Some(&preset.to_string()), 100.0);
            assert_eq!(parsed, Ok(preset));
        }
        assert_eq!(parse_donation_amount(Some(" 2.5 "), 100.0), Ok(2.5));
    }

    #[test]
    fn donation_amount_rejects_missing_and_malformed_input() {
        assert_eq!(parse_donation_amount(None, 100.0), Err(AmountError::Missing));
        assert_eq!(parse_donation_amount(Some(""), 100.0), Err(AmountError::Missing));
        assert_eq!(parse_donation_amount(Some("  "), 100.0), Err(AmountError::Missing));
        assert_eq!(parse_donation_amount(Some("abc"), 100.0), Err(AmountError::Invalid));
        assert_eq!(parse_donation_amount(Some("NaN"), 100.0), Err(AmountError::Invalid));
        assert_eq!(parse_donation_amount(Some("inf"), 100.0), Err(AmountError::Invalid));
    }

    #[test]
    fn donation_amount_enforces_range() {
        assert_eq!(parse_donation_amount(Some("0"), 100.0), Err(AmountError::TooSmall));
        assert_eq!(parse_donation_amount(Some("-1"), 100.0), Err(AmountError::TooSmall));
        assert_eq!(
            parse_donation_amount(Some("100.1"), 100.0),
            Err(AmountError::TooLarge { max: 100.0 })
        );
    }
}
