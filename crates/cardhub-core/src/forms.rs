//! Materialization of child-row lists from indexed form fields.
//!
//! Multipart forms encode child rows as flat keys such as `card_banks[0][iban]`. The helpers
//! here turn those maps into ordered request rows so repositories only ever see typed lists.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{CardBankRequest, CardSocialMediaRequest};
use crate::DbId;

static CARD_BANK_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^card_banks\[(\d+)\]\[(bank_id|iban|id)\]$").expect("valid regex")
});

static CARD_SOCIAL_MEDIA_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^card_social_media\[(\d+)\]\[(social_media_id|url|id)\]$").expect("valid regex")
});

/// Group `index -> field -> first value` for every key matching `pattern`.
fn collect_indexed<'a>(
    pattern: &Regex,
    form: &'a HashMap<String, Vec<String>>,
) -> BTreeMap<usize, HashMap<&'a str, &'a str>> {
    let mut rows: BTreeMap<usize, HashMap<&str, &str>> = BTreeMap::new();

    for (key, values) in form {
        let Some(value) = values.first() else {
            continue;
        };
        let Some(caps) = pattern.captures(key) else {
            continue;
        };
        let (Some(index), Some(field)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let Ok(index) = index.as_str().parse::<usize>() else {
            continue;
        };
        rows.entry(index)
            .or_default()
            .insert(field.as_str(), value.as_str());
    }

    rows
}

fn parse_id(value: Option<&&str>) -> Option<DbId> {
    value
        .and_then(|v| v.trim().parse::<DbId>().ok())
        .filter(|id| *id > 0)
}

/// Bank rows from `card_banks[i][bank_id|iban|id]`, ordered by index.
///
/// Rows without a bank reference or IBAN are dropped.
pub fn parse_card_banks(form: &HashMap<String, Vec<String>>) -> Vec<CardBankRequest> {
    collect_indexed(&CARD_BANK_KEY, form)
        .into_values()
        .filter_map(|fields| {
            let bank_id = parse_id(fields.get("bank_id"))?;
            let iban = fields.get("iban").map(|v| v.trim()).unwrap_or_default();
            if iban.is_empty() {
                return None;
            }
            Some(CardBankRequest {
                id: parse_id(fields.get("id")),
                bank_id,
                iban: iban.to_string(),
            })
        })
        .collect()
}

/// Social media rows from `card_social_media[i][social_media_id|url|id]`, ordered by index.
pub fn parse_card_social_media(form: &HashMap<String, Vec<String>>) -> Vec<CardSocialMediaRequest> {
    collect_indexed(&CARD_SOCIAL_MEDIA_KEY, form)
        .into_values()
        .filter_map(|fields| {
            let social_media_id = parse_id(fields.get("social_media_id"))?;
            let url = fields.get("url").map(|v| v.trim()).unwrap_or_default();
            if url.is_empty() {
                return None;
            }
            Some(CardSocialMediaRequest {
                id: parse_id(fields.get("id")),
                social_media_id,
                url: url.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in pairs {
            map.entry(k.to_string()).or_default().push(v.to_string());
        }
        map
    }

    #[test]
    fn test_banks_sorted_by_index() {
        let form = form(&[
            ("card_banks[10][bank_id]", "3"),
            ("card_banks[10][iban]", "TR10"),
            ("card_banks[2][bank_id]", "1"),
            ("card_banks[2][iban]", "TR02"),
            ("card_banks[2][id]", "44"),
            ("name", "ignored"),
        ]);

        let banks = parse_card_banks(&form);
        assert_eq!(
            banks,
            vec![
                CardBankRequest {
                    id: Some(44),
                    bank_id: 1,
                    iban: "TR02".to_string()
                },
                CardBankRequest {
                    id: None,
                    bank_id: 3,
                    iban: "TR10".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_incomplete_rows_dropped() {
        let form = form(&[
            ("card_banks[0][bank_id]", "0"),
            ("card_banks[0][iban]", "TR00"),
            ("card_banks[1][bank_id]", "2"),
            ("card_banks[1][iban]", "   "),
            ("card_banks[2][bank_id]", "abc"),
            ("card_banks[2][iban]", "TR22"),
            ("card_banks[3][bank_id]", "5"),
            ("card_banks[3][iban]", "TR33"),
            ("card_banks[3][id]", "not-a-number"),
        ]);

        let banks = parse_card_banks(&form);
        assert_eq!(banks.len(), 1);
        assert_eq!(banks[0].bank_id, 5);
        assert_eq!(banks[0].id, None);
    }

    #[test]
    fn test_first_value_wins() {
        let form = form(&[
            ("card_social_media[0][social_media_id]", "7"),
            ("card_social_media[0][url]", "https://a.example.com"),
            ("card_social_media[0][url]", "https://b.example.com"),
        ]);

        let rows = parse_card_social_media(&form);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].social_media_id, 7);
        assert_eq!(rows[0].url, "https://a.example.com");
    }

    #[test]
    fn test_unrelated_keys_ignored() {
        let form = form(&[
            ("card_banks[0][swift]", "XYZ"),
            ("card_social_media[x][url]", "https://c.example.com"),
        ]);
        assert!(parse_card_banks(&form).is_empty());
        assert!(parse_card_social_media(&form).is_empty());
    }
}
