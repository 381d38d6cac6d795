/// Compiled selectors for the small CSS subset the expander needs:
/// `tag`, `*`, `[attr]`, `[attr="v"]`, `[attr*="v"]`, `[attr^="v"]`,
/// compounds such as `button[data-testid="x"]`, and comma-separated lists.
/// Combinators are not supported.
use std::iter::Peekable;
use std::str::Chars;

use crate::config::SelectorConfig;
use crate::errors::{ExpanderError, ExpanderResult};
use crate::perception::traits::Page;
use crate::perception::types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatcher {
    name: String,
    op: AttrOp,
}

impl AttrMatcher {
    fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else { return false };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::Contains(v) => !v.is_empty() && value.contains(v.as_str()),
            AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound {
    /// `None` for `*` or an attribute-only compound.
    tag: Option<String>,
    attrs: Vec<AttrMatcher>,
}

impl Compound {
    fn matches(&self, page: &dyn Page, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            match page.tag_name(node) {
                Some(actual) if actual.eq_ignore_ascii_case(tag) => {}
                _ => return false,
            }
        }
        self.attrs
            .iter()
            .all(|a| a.matches(page.attribute(node, &a.name).as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> ExpanderResult<Self> {
        let mut alternatives = Vec::new();
        for part in split_list(source) {
            alternatives.push(parse_compound(part.trim(), source)?);
        }
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, page: &dyn Page, node: NodeId) -> bool {
        self.alternatives.iter().any(|c| c.matches(page, node))
    }

    /// Nearest ancestor-or-self matching this selector.
    pub fn closest(&self, page: &dyn Page, node: NodeId) -> Option<NodeId> {
        let document = page.document();
        let mut current = Some(node);
        while let Some(id) = current {
            if id == document {
                return None;
            }
            if self.matches(page, id) {
                return Some(id);
            }
            current = page.parent(id);
        }
        None
    }

    /// First descendant of `scope` in document order matching this selector.
    pub fn query_first(&self, page: &dyn Page, scope: NodeId) -> Option<NodeId> {
        page.descendants(scope)
            .into_iter()
            .find(|&id| self.matches(page, id))
    }

    /// Whether `node` or any of its descendants matches.
    pub fn matches_within(&self, page: &dyn Page, node: NodeId) -> bool {
        self.matches(page, node) || self.query_first(page, node).is_some()
    }
}

/// Splits a selector list on commas that sit outside quoted values.
fn split_list(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (i, c) in source.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ',') => {
                parts.push(&source[start..i]);
                start = i + 1;
            }
            (None, _) => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

fn parse_compound(part: &str, source: &str) -> ExpanderResult<Compound> {
    let err = |msg: &str| ExpanderError::Selector(format!("{msg} in `{source}`"));
    if part.is_empty() {
        return Err(err("empty selector"));
    }

    let mut chars = part.chars().peekable();
    let tag = match chars.peek() {
        Some('*') => {
            chars.next();
            None
        }
        Some(c) if is_ident_char(*c) => Some(read_ident(&mut chars).to_ascii_lowercase()),
        _ => None,
    };

    let mut attrs = Vec::new();
    while let Some(c) = chars.next() {
        match c {
            '[' => attrs.push(parse_attr(&mut chars).map_err(|m| err(&m))?),
            c if c.is_whitespace() || matches!(c, '>' | '+' | '~') => {
                return Err(err("combinators are not supported"));
            }
            other => return Err(err(&format!("unexpected `{other}`"))),
        }
    }

    if tag.is_none() && attrs.is_empty() && !part.starts_with('*') {
        return Err(err("selector has no tag or attribute"));
    }
    Ok(Compound { tag, attrs })
}

fn parse_attr(chars: &mut Peekable<Chars<'_>>) -> Result<AttrMatcher, String> {
    skip_ws(chars);
    let name = read_ident(chars);
    if name.is_empty() {
        return Err("missing attribute name".into());
    }
    skip_ws(chars);

    let op = match chars.next() {
        Some(']') => return Ok(AttrMatcher { name, op: AttrOp::Exists }),
        Some('=') => '=',
        Some(c @ ('*' | '^')) => {
            if chars.next() != Some('=') {
                return Err(format!("expected `=` after `{c}`"));
            }
            c
        }
        Some(other) => return Err(format!("unexpected `{other}` in attribute")),
        None => return Err("unterminated attribute".into()),
    };

    skip_ws(chars);
    let value = match chars.peek() {
        Some(&quote @ ('"' | '\'')) => {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(c) if c == quote => break,
                    Some(c) => value.push(c),
                    None => return Err("unterminated string".into()),
                }
            }
            value
        }
        _ => read_ident(chars),
    };
    skip_ws(chars);
    if chars.next() != Some(']') {
        return Err("expected `]`".into());
    }

    let op = match op {
        '=' => AttrOp::Equals(value),
        '*' => AttrOp::Contains(value),
        _ => AttrOp::Prefix(value),
    };
    Ok(AttrMatcher { name, op })
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    ident
}

fn skip_ws(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

/// Every structural lookup the expander performs, compiled once per engine.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub primary_column: Selector,
    pub quoted_post: Selector,
    pub show_more_text: Selector,
    pub control: Selector,
    pub post: Selector,
    pub link: Selector,
    marker_test_ids: Vec<String>,
}

impl Selectors {
    pub fn compile(config: &SelectorConfig) -> ExpanderResult<Self> {
        Ok(Self {
            primary_column: Selector::parse(&config.primary_column)?,
            quoted_post: Selector::parse(&config.quoted_post)?,
            show_more_text: Selector::parse(&config.show_more_text)?,
            control: Selector::parse(&config.control)?,
            post: Selector::parse(&config.post)?,
            link: Selector::parse(&config.link)?,
            marker_test_ids: config
                .marker_test_ids
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    /// Inline "show more" marker, recognised independently of its label.
    pub fn is_text_marker(&self, page: &dyn Page, node: NodeId) -> bool {
        if self.show_more_text.matches(page, node) {
            return true;
        }
        let test_id = page
            .attribute(node, "data-testid")
            .unwrap_or_default()
            .to_lowercase();
        !test_id.is_empty() && self.marker_test_ids.iter().any(|m| test_id.contains(m))
    }

    /// The main content region, or the document when the page has none.
    pub fn primary_scope(&self, page: &dyn Page) -> NodeId {
        let document = page.document();
        self.primary_column
            .query_first(page, document)
            .unwrap_or(document)
    }
}
