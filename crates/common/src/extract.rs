// Party extraction: pull account and address mentions out of case text
// and classify them by confidence.
//
// Likely parties come from checkuser-result templates and sock lists;
// possible parties from generic mention templates. A possible entry that
// also appears as likely is dropped.

use crate::identity::{is_address_form, normalize};
use crate::types::ExtractedParties;
use crate::wikitext::template::{canonical_name, parse_templates};

/// Templates whose first argument names a checked or listed party.
const LIKELY_TEMPLATES: [&str; 3] = ["checkuser", "checkip", "curesult"];
/// Templates carrying a whole list of parties as positional arguments.
const LIST_TEMPLATES: [&str; 2] = ["sock list", "socklist"];
/// Generic mention templates, lower confidence.
const POSSIBLE_TEMPLATES: [&str; 5] = ["user", "vandal", "ip", "noping", "noping2"];

/// Extract every party mentioned in `text`.
pub fn extract_parties(text: &str) -> ExtractedParties {
    let mut likely: Vec<String> = Vec::new();
    let mut possible: Vec<String> = Vec::new();

    for template in parse_templates(text) {
        let name = canonical_name(&template.name);

        if LIKELY_TEMPLATES.contains(&name.as_str()) {
            if let Some(party) = template.pos(1) {
                push_party(&mut likely, party);
            }
        } else if LIST_TEMPLATES.contains(&name.as_str()) {
            let mut slot = 1;
            while let Some(party) = template.pos(slot) {
                push_party(&mut likely, party);
                slot += 1;
            }
        } else if POSSIBLE_TEMPLATES.contains(&name.as_str()) {
            if let Some(party) = template.pos(1) {
                push_party(&mut possible, party);
            }
        }
    }

    possible.retain(|party| !likely.contains(party));

    let mut parties = ExtractedParties::default();
    for party in likely {
        if is_address_form(&party) {
            parties.likely_addresses.push(party);
        } else {
            parties.likely_accounts.push(party);
        }
    }
    for party in possible {
        if is_address_form(&party) {
            parties.possible_addresses.push(party);
        } else {
            parties.possible_accounts.push(party);
        }
    }
    parties
}

/// Normalize and append, skipping empties and duplicates.
fn push_party(list: &mut Vec<String>, raw: &str) {
    let party = normalize(raw);
    if !party.is_empty() && !list.contains(&party) {
        list.push(party);
    }
}

#[cfg(test)]
mod tests {
    use super::extract_parties;

    #[test]
    fn classifies_checked_and_mentioned_parties() {
        let text = "* {{checkuser|1=Foo}}\nDiscussion of {{user|Bar}} follows.\n";
        let parties = extract_parties(text);

        assert_eq!(parties.likely_accounts, vec!["Foo"]);
        assert_eq!(parties.possible_accounts, vec!["Bar"]);
        assert!(parties.likely_addresses.is_empty());
        assert!(parties.possible_addresses.is_empty());
    }

    #[test]
    fn possible_mention_of_likely_party_is_dropped() {
        let text = "{{checkuser|Foo}} and later {{user|foo_}} again.\n";
        let parties = extract_parties(text);

        assert_eq!(parties.likely_accounts, vec!["Foo"]);
        assert!(parties.possible_accounts.is_empty());
    }

    #[test]
    fn sock_list_arguments_are_all_likely() {
        let text = "{{sock list|Foo|Bar|192.0.2.7}}";
        let parties = extract_parties(text);

        assert_eq!(parties.likely_accounts, vec!["Foo", "Bar"]);
        assert_eq!(parties.likely_addresses, vec!["192.0.2.7"]);
    }

    #[test]
    fn addresses_split_from_accounts() {
        let text = "{{checkip|2001:db8::1}} {{IP|10.0.0.0/16}}";
        let parties = extract_parties(text);

        assert_eq!(parties.likely_addresses, vec!["2001:DB8::1"]);
        assert_eq!(parties.possible_addresses, vec!["10.0.0.0/16"]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let text = "{{checkuser|Foo}} {{checkuser|1=foo_}} {{CUresult|Foo}}";
        let parties = extract_parties(text);

        assert_eq!(parties.likely_accounts, vec!["Foo"]);
    }

    #[test]
    fn empty_arguments_are_skipped() {
        let parties = extract_parties("{{checkuser|}} {{user|   }}");
        assert!(parties.is_empty());
    }

    #[test]
    fn unrelated_templates_are_ignored() {
        let parties = extract_parties("{{SPI case status|close}} {{SPIpriorcases}}");
        assert!(parties.is_empty());
    }
}
