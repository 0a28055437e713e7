// Heading-based case document model and the case-scaffold templates.

use crate::types::{CaseSection, NoticeParams};
use crate::wikitext::template::{find_template, Template};

/// Per-investigation status tag.
pub const STATUS_TEMPLATE: &str = "SPI case status";
/// Case-wide archive notice carrying the party identity and flags.
pub const NOTICE_TEMPLATE: &str = "SPI archive notice";
/// Prior-cases navigation marker kept directly under the notice.
pub const PRIOR_CASES_TEMPLATE: &str = "SPIpriorcases";

/// A parsed case page: full text plus its heading-delimited sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseDocument {
    pub text: String,
    pub sections: Vec<CaseSection>,
}

impl CaseDocument {
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let sections = parse_sections(&text);
        Self { text, sections }
    }

    /// Level-3 sections, one per investigation.
    pub fn investigations(&self) -> impl Iterator<Item = &CaseSection> {
        self.sections.iter().filter(|s| s.level == 3)
    }

    /// Section by its volatile 1-based heading index.
    pub fn section(&self, index: usize) -> Option<&CaseSection> {
        self.sections.iter().find(|s| s.index == index)
    }

    /// The case-wide archive notice, if present (first one wins).
    pub fn notice(&self) -> Option<(Template, NoticeParams)> {
        let template = find_template(&self.text, NOTICE_TEMPLATE)?;
        let params = parse_notice(&template);
        Some((template, params))
    }
}

/// Split wikitext into heading-delimited sections.
///
/// A heading line is `== label ==` with matching `=` counts (2-6). Each
/// section runs to the next heading of equal or higher rank, and the
/// index counts every heading in document order starting at 1.
pub fn parse_sections(text: &str) -> Vec<CaseSection> {
    #[derive(Debug)]
    struct Draft {
        level: u8,
        label: String,
        start: usize,
        body_start: usize,
    }

    let mut drafts: Vec<Draft> = Vec::new();
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        if let Some((level, label)) = parse_heading(line) {
            drafts.push(Draft {
                level,
                label,
                start: offset,
                body_start: offset + line.len(),
            });
        }
        offset += line.len();
    }

    let total = text.len();
    drafts
        .iter()
        .enumerate()
        .map(|(i, draft)| {
            let end = drafts[i + 1..]
                .iter()
                .find(|next| next.level <= draft.level)
                .map(|next| next.start)
                .unwrap_or(total);
            CaseSection {
                index: i + 1,
                level: draft.level,
                label: draft.label.clone(),
                start: draft.start,
                body_start: draft.body_start,
                end,
            }
        })
        .collect()
}

/// Parse one line as a wikitext heading, returning (level, label).
fn parse_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_end();
    if !trimmed.starts_with("==") {
        return None;
    }

    let leading = trimmed.bytes().take_while(|b| *b == b'=').count();
    let trailing = trimmed.bytes().rev().take_while(|b| *b == b'=').count();
    if leading != trailing || leading > 6 || trimmed.len() < leading * 2 + 1 {
        return None;
    }

    let label = trimmed[leading..trimmed.len() - trailing].trim();
    if label.is_empty() {
        return None;
    }
    Some((leading as u8, label.to_string()))
}

/// Raw status argument of the first status tag in `text`.
///
/// An empty or missing first argument reads as `open`; a missing tag
/// returns `None` (callers decide whether that warrants a warning).
pub fn case_status(text: &str) -> Option<String> {
    let template = find_template(text, STATUS_TEMPLATE)?;
    let raw = template.pos(1).unwrap_or("").trim();
    Some(if raw.is_empty() { "open".to_string() } else { raw.to_string() })
}

/// Render a status tag with the given argument.
pub fn status_template(argument: &str) -> String {
    if argument.is_empty() || argument.eq_ignore_ascii_case("open") {
        format!("{{{{{STATUS_TEMPLATE}}}}}")
    } else {
        format!("{{{{{STATUS_TEMPLATE}|{argument}}}}}")
    }
}

/// Rewrite the first status tag in `text` to carry `argument`.
///
/// Returns `None` when no status tag is present.
pub fn set_status_argument(text: &str, argument: &str) -> Option<String> {
    let template = find_template(text, STATUS_TEMPLATE)?;
    let mut out = String::with_capacity(text.len() + 16);
    out.push_str(&text[..template.start]);
    out.push_str(&status_template(argument));
    out.push_str(&text[template.end..]);
    Some(out)
}

/// Remove the first status tag from `text`, swallowing one trailing
/// newline so archived bodies do not accumulate blank lines.
pub fn strip_status_template(text: &str) -> String {
    match find_template(text, STATUS_TEMPLATE) {
        Some(template) => {
            let mut end = template.end;
            if text[end..].starts_with('\n') {
                end += 1;
            }
            format!("{}{}", &text[..template.start], &text[end..])
        }
        None => text.to_string(),
    }
}

/// Read archive-notice parameters out of a tokenized notice template.
pub fn parse_notice(template: &Template) -> NoticeParams {
    NoticeParams {
        username: template.pos(1).unwrap_or("").trim().to_string(),
        crosswiki: template.flag("crosswiki"),
        deny: template.flag("deny"),
        notalk: template.flag("notalk"),
        lta: template
            .param("LTA")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned),
    }
}

/// Render archive-notice parameters back into template markup.
pub fn render_notice(params: &NoticeParams) -> String {
    let mut out = format!("{{{{{NOTICE_TEMPLATE}|1={}", params.username);
    if params.crosswiki {
        out.push_str("|crosswiki=yes");
    }
    if params.deny {
        out.push_str("|deny=yes");
    }
    if params.notalk {
        out.push_str("|notalk=yes");
    }
    if let Some(lta) = &params.lta {
        out.push_str("|LTA=");
        out.push_str(lta);
    }
    out.push_str("}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<noinclude>__TOC__</noinclude>\n{{SPI archive notice|1=Foo}}\n{{SPIpriorcases}}\n===19 August 2026===\n{{SPI case status|close}}\nbody one\n====Suspected sockpuppets====\n* {{checkuser|1=Bar}}\n===20 August 2026===\n{{SPI case status}}\nbody two\n";

    #[test]
    fn splits_sections_with_volatile_indices() {
        let doc = CaseDocument::parse(PAGE);

        assert_eq!(doc.sections.len(), 3);
        assert_eq!(doc.sections[0].index, 1);
        assert_eq!(doc.sections[0].level, 3);
        assert_eq!(doc.sections[0].label, "19 August 2026");
        assert_eq!(doc.sections[1].index, 2);
        assert_eq!(doc.sections[1].level, 4);
        assert_eq!(doc.sections[2].index, 3);
        assert_eq!(doc.sections[2].label, "20 August 2026");
    }

    #[test]
    fn level4_section_stays_inside_its_investigation() {
        let doc = CaseDocument::parse(PAGE);
        let first = &doc.sections[0];
        let nested = &doc.sections[1];

        // The investigation spans its sub-section; the sub-section ends
        // where the next investigation starts.
        assert_eq!(first.end, doc.sections[2].start);
        assert_eq!(nested.end, doc.sections[2].start);
        assert!(first.full(&doc.text).contains("Suspected sockpuppets"));
    }

    #[test]
    fn investigations_are_level3_only() {
        let doc = CaseDocument::parse(PAGE);
        let labels: Vec<_> = doc.investigations().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["19 August 2026", "20 August 2026"]);
    }

    #[test]
    fn last_section_runs_to_end_of_text() {
        let doc = CaseDocument::parse(PAGE);
        assert_eq!(doc.sections[2].end, PAGE.len());
    }

    #[test]
    fn mismatched_heading_markers_are_not_headings() {
        let sections = parse_sections("===label==\ntext\n");
        assert!(sections.is_empty());
    }

    #[test]
    fn status_defaults_to_open() {
        let doc = CaseDocument::parse(PAGE);
        let second = doc.sections[2].full(&doc.text);

        assert_eq!(case_status(second).as_deref(), Some("open"));
        assert_eq!(case_status(doc.sections[0].full(&doc.text)).as_deref(), Some("close"));
        assert_eq!(case_status("no tag here"), None);
    }

    #[test]
    fn set_status_argument_rewrites_in_place() {
        let text = "{{SPI case status|CUrequest}}\nbody";
        let updated = set_status_argument(text, "endorse").expect("tag should be present");
        assert_eq!(updated, "{{SPI case status|endorse}}\nbody");

        let reopened = set_status_argument(text, "open").expect("tag should be present");
        assert_eq!(reopened, "{{SPI case status}}\nbody");
    }

    #[test]
    fn strip_status_template_swallows_trailing_newline() {
        let text = "{{SPI case status|close}}\nbody\n";
        assert_eq!(strip_status_template(text), "body\n");
        assert_eq!(strip_status_template("no tag"), "no tag");
    }

    #[test]
    fn notice_parses_flags_and_lta() {
        let doc = CaseDocument::parse(
            "{{SPI archive notice|1=Foo|crosswiki=yes|deny=yes|notalk=yes|LTA=Foo case}}\n",
        );
        let (_, params) = doc.notice().expect("notice should be present");

        assert_eq!(params.username, "Foo");
        assert!(params.crosswiki && params.deny && params.notalk);
        assert_eq!(params.lta.as_deref(), Some("Foo case"));
    }

    #[test]
    fn notice_round_trips() {
        let params = NoticeParams {
            username: "Foo".into(),
            crosswiki: true,
            deny: false,
            notalk: true,
            lta: Some("Foo case".into()),
        };
        let rendered = render_notice(&params);
        let doc = CaseDocument::parse(rendered);
        let (_, reparsed) = doc.notice().expect("rendered notice should parse");

        assert_eq!(reparsed, params);
    }

    #[test]
    fn first_notice_wins() {
        let doc = CaseDocument::parse(
            "{{SPI archive notice|1=First}}\n{{SPI archive notice|1=Second}}\n",
        );
        let (_, params) = doc.notice().expect("notice should be present");
        assert_eq!(params.username, "First");
    }
}

#[cfg(test)]
mod notice_props {
    use super::{parse_notice, render_notice};
    use crate::types::NoticeParams;
    use crate::wikitext::template::find_template;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn render_parse_round_trip(
            username in "[A-Za-z][A-Za-z0-9 .-]{0,20}",
            crosswiki in any::<bool>(),
            deny in any::<bool>(),
            notalk in any::<bool>(),
            lta in proptest::option::of("[A-Za-z][A-Za-z0-9 /.-]{0,20}"),
        ) {
            let params = NoticeParams {
                username: username.trim().to_string(),
                crosswiki,
                deny,
                notalk,
                lta: lta.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            };
            let rendered = render_notice(&params);
            let template = find_template(&rendered, super::NOTICE_TEMPLATE)
                .expect("rendered notice should tokenize");
            prop_assert_eq!(parse_notice(&template), params);
        }
    }
}
