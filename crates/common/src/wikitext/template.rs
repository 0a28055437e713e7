// Template tokenizer (`{{name|arg|key=value}}` syntax).
//
// Argument splitting is aware of nested `{{ }}` and `[[ ]]` pairs, so a
// value may itself contain templates or links. Only top-level templates
// are returned; callers re-tokenize argument values when they need to
// descend.

/// A parsed template invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Raw template name as written (untrimmed interior spacing preserved).
    pub name: String,
    /// Implicit positional arguments in source order.
    pub positional: Vec<String>,
    /// Named arguments (numeric keys included) in source order.
    pub named: Vec<(String, String)>,
    /// Byte offset of the opening `{{`.
    pub start: usize,
    /// Byte offset just after the closing `}}`.
    pub end: usize,
}

impl Template {
    /// Compare the template name against `name`, ignoring case and
    /// treating underscores as spaces.
    pub fn name_is(&self, name: &str) -> bool {
        canonical_name(&self.name) == canonical_name(name)
    }

    /// Positional argument by 1-based index, honoring explicit `1=`
    /// style numbering.
    pub fn pos(&self, index: usize) -> Option<&str> {
        let key = index.to_string();
        if let Some(value) = self.param(&key) {
            return Some(value);
        }
        self.positional.get(index - 1).map(String::as_str)
    }

    /// Named argument by key, case-insensitive.
    pub fn param(&self, key: &str) -> Option<&str> {
        let wanted = key.trim().to_lowercase();
        self.named
            .iter()
            .find(|(k, _)| k.trim().to_lowercase() == wanted)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a flag-style argument is set to `yes`.
    pub fn flag(&self, key: &str) -> bool {
        self.param(key).map(|v| v.eq_ignore_ascii_case("yes")).unwrap_or(false)
    }

    /// Raw source slice of the invocation.
    pub fn raw<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Canonical form of a template name: trimmed, lowercased, `_` as space,
/// interior whitespace collapsed.
pub fn canonical_name(name: &str) -> String {
    name.replace('_', " ").split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Tokenize all top-level template invocations in `text`.
pub fn parse_templates(text: &str) -> Vec<Template> {
    let bytes = text.as_bytes();
    let mut templates = Vec::new();
    let mut index = 0usize;

    while index + 1 < bytes.len() {
        if bytes[index] == b'{' && bytes[index + 1] == b'{' {
            if let Some(close) = find_close(bytes, index + 2) {
                let inner = &text[index + 2..close];
                if let Some(template) = parse_inner(inner, index, close + 2) {
                    templates.push(template);
                }
                index = close + 2;
                continue;
            }
            // Unbalanced open: skip past it rather than rescanning.
            index += 2;
            continue;
        }
        index += 1;
    }

    templates
}

/// First top-level invocation of the named template, if any.
pub fn find_template(text: &str, name: &str) -> Option<Template> {
    parse_templates(text).into_iter().find(|t| t.name_is(name))
}

/// Scan from `from` for the `}}` closing the pair opened just before,
/// tracking nested `{{ }}` and `[[ ]]`.
fn find_close(bytes: &[u8], from: usize) -> Option<usize> {
    let mut brace_depth = 0u32;
    let mut link_depth = 0u32;
    let mut index = from;

    while index + 1 < bytes.len() {
        match (bytes[index], bytes[index + 1]) {
            (b'{', b'{') => {
                brace_depth += 1;
                index += 2;
            }
            (b'}', b'}') => {
                if brace_depth == 0 && link_depth == 0 {
                    return Some(index);
                }
                brace_depth = brace_depth.saturating_sub(1);
                index += 2;
            }
            (b'[', b'[') => {
                link_depth += 1;
                index += 2;
            }
            (b']', b']') => {
                link_depth = link_depth.saturating_sub(1);
                index += 2;
            }
            _ => index += 1,
        }
    }

    None
}

fn parse_inner(inner: &str, start: usize, end: usize) -> Option<Template> {
    let mut parts = split_top_level(inner);
    if parts.is_empty() {
        return None;
    }

    let name = parts.remove(0).trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut positional = Vec::new();
    let mut named = Vec::new();

    for part in parts {
        match top_level_eq(&part) {
            Some(eq) => {
                let key = part[..eq].trim().to_string();
                let value = part[eq + 1..].trim().to_string();
                if key.is_empty() {
                    positional.push(part.trim().to_string());
                } else {
                    named.push((key, value));
                }
            }
            None => positional.push(part.trim().to_string()),
        }
    }

    Some(Template { name, positional, named, start, end })
}

/// Split on `|` characters outside nested `{{ }}` / `[[ ]]` pairs.
fn split_top_level(inner: &str) -> Vec<String> {
    let bytes = inner.as_bytes();
    let mut parts = Vec::new();
    let mut brace_depth = 0u32;
    let mut link_depth = 0u32;
    let mut piece_start = 0usize;
    let mut index = 0usize;

    while index < bytes.len() {
        if index + 1 < bytes.len() {
            match (bytes[index], bytes[index + 1]) {
                (b'{', b'{') => {
                    brace_depth += 1;
                    index += 2;
                    continue;
                }
                (b'}', b'}') => {
                    brace_depth = brace_depth.saturating_sub(1);
                    index += 2;
                    continue;
                }
                (b'[', b'[') => {
                    link_depth += 1;
                    index += 2;
                    continue;
                }
                (b']', b']') => {
                    link_depth = link_depth.saturating_sub(1);
                    index += 2;
                    continue;
                }
                _ => {}
            }
        }
        if bytes[index] == b'|' && brace_depth == 0 && link_depth == 0 {
            parts.push(inner[piece_start..index].to_string());
            piece_start = index + 1;
        }
        index += 1;
    }
    parts.push(inner[piece_start..].to_string());

    parts
}

/// Byte offset of the first `=` outside nested pairs, if any.
fn top_level_eq(part: &str) -> Option<usize> {
    let bytes = part.as_bytes();
    let mut brace_depth = 0u32;
    let mut link_depth = 0u32;
    let mut index = 0usize;

    while index < bytes.len() {
        if index + 1 < bytes.len() {
            match (bytes[index], bytes[index + 1]) {
                (b'{', b'{') => {
                    brace_depth += 1;
                    index += 2;
                    continue;
                }
                (b'}', b'}') => {
                    brace_depth = brace_depth.saturating_sub(1);
                    index += 2;
                    continue;
                }
                (b'[', b'[') => {
                    link_depth += 1;
                    index += 2;
                    continue;
                }
                (b']', b']') => {
                    link_depth = link_depth.saturating_sub(1);
                    index += 2;
                    continue;
                }
                _ => {}
            }
        }
        if bytes[index] == b'=' && brace_depth == 0 && link_depth == 0 {
            return Some(index);
        }
        index += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{find_template, parse_templates};

    #[test]
    fn parses_basic_template() {
        let templates = parse_templates("before {{checkuser|Alice}} after");

        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "checkuser");
        assert_eq!(templates[0].pos(1), Some("Alice"));
    }

    #[test]
    fn parses_named_and_numbered_arguments() {
        let templates = parse_templates("{{checkuser|1=Alice|bullet=no}}");

        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].pos(1), Some("Alice"));
        assert_eq!(templates[0].param("bullet"), Some("no"));
        assert!(templates[0].positional.is_empty());
    }

    #[test]
    fn named_lookup_is_case_insensitive() {
        let templates = parse_templates("{{SPI archive notice|1=Alice|LTA=Some page}}");

        assert_eq!(templates[0].param("lta"), Some("Some page"));
        assert_eq!(templates[0].param("LTA"), Some("Some page"));
    }

    #[test]
    fn name_matching_ignores_case_and_underscores() {
        let templates = parse_templates("{{SPI_case_status|open}}");

        assert!(templates[0].name_is("SPI case status"));
        assert!(templates[0].name_is("spi case status"));
        assert!(!templates[0].name_is("SPI archive notice"));
    }

    #[test]
    fn nested_templates_stay_inside_argument() {
        let templates = parse_templates("{{outer|a={{inner|x|y}}|b}}");

        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].param("a"), Some("{{inner|x|y}}"));
        assert_eq!(templates[0].pos(1), Some("b"));
    }

    #[test]
    fn links_with_pipes_stay_inside_argument() {
        let templates = parse_templates("{{note|see [[Target|alias]] here}}");

        assert_eq!(templates[0].pos(1), Some("see [[Target|alias]] here"));
    }

    #[test]
    fn equals_inside_link_does_not_make_named_argument() {
        let templates = parse_templates("{{note|[[Special:Diff/5?x=1|diff]]}}");

        assert_eq!(templates[0].pos(1), Some("[[Special:Diff/5?x=1|diff]]"));
        assert!(templates[0].named.is_empty());
    }

    #[test]
    fn multiple_templates_preserve_offsets() {
        let text = "{{a|1}} mid {{b|2}}";
        let templates = parse_templates(text);

        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].raw(text), "{{a|1}}");
        assert_eq!(templates[1].raw(text), "{{b|2}}");
    }

    #[test]
    fn unbalanced_open_is_skipped() {
        let templates = parse_templates("{{broken and {{fine|x}}");

        // The unclosed outer open is skipped; the inner still parses.
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "fine");
    }

    #[test]
    fn find_template_returns_first_match() {
        let text = "{{checkuser|Alice}} {{checkuser|Bob}}";
        let found = find_template(text, "CheckUser").expect("template should be found");

        assert_eq!(found.pos(1), Some("Alice"));
    }

    #[test]
    fn empty_template_is_ignored() {
        assert!(parse_templates("{{}} {{ }}").is_empty());
    }
}
