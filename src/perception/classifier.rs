use regex::{Regex, RegexBuilder};

use crate::config::LabelRulesConfig;
use crate::errors::ExpanderResult;
use crate::perception::filters::{is_in_primary_column, is_inside_quoted_content, is_on_screen};
use crate::perception::label::resolve_label;
use crate::perception::selector::Selectors;
use crate::perception::traits::Page;
use crate::perception::types::{ControlKind, NodeId};

/// An ordered list of case-insensitive label patterns.
#[derive(Debug, Clone)]
pub struct RuleTable {
    patterns: Vec<Regex>,
}

impl RuleTable {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> ExpanderResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, label: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(label))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LabelRules {
    pub forbidden: RuleTable,
    pub replies: RuleTable,
    pub show_more: RuleTable,
}

impl LabelRules {
    pub fn compile(config: &LabelRulesConfig) -> ExpanderResult<Self> {
        Ok(Self {
            forbidden: RuleTable::compile(config.forbidden.as_slice())?,
            replies: RuleTable::compile(config.replies.as_slice())?,
            show_more: RuleTable::compile(config.show_more.as_slice())?,
        })
    }

    /// Classifies a resolved label. Forbidden wording always wins.
    pub fn classify_label(&self, label: &str) -> Option<ControlKind> {
        if label.is_empty() || self.forbidden.matches(label) {
            return None;
        }
        if self.replies.matches(label) {
            return Some(ControlKind::RepliesExpander);
        }
        if self.show_more.matches(label) {
            return Some(ControlKind::TextExpander);
        }
        None
    }
}

/// Decides whether an element is an expandable control, and of which kind.
pub struct Classifier<'a> {
    page: &'a dyn Page,
    selectors: &'a Selectors,
    rules: &'a LabelRules,
}

impl<'a> Classifier<'a> {
    pub fn new(page: &'a dyn Page, selectors: &'a Selectors, rules: &'a LabelRules) -> Self {
        Self {
            page,
            selectors,
            rules,
        }
    }

    pub fn classify(&self, node: NodeId) -> Option<ControlKind> {
        let page = self.page;
        if !is_in_primary_column(page, self.selectors, node)
            || !is_on_screen(page, node, false)
            || self.selectors.link.closest(page, node).is_some()
            || is_inside_quoted_content(page, self.selectors, node)
        {
            return None;
        }

        if self.selectors.is_text_marker(page, node) {
            return Some(ControlKind::TextExpander);
        }

        let label = resolve_label(page, node);
        let kind = self.rules.classify_label(&label);
        if kind.is_none() && !label.is_empty() {
            tracing::trace!(node = %node, label = %label, "not an expand control");
        }
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;
    use crate::errors::ExpanderError;
    use crate::perception::memory::{MemoryPage, NodeSpec};

    fn rules() -> LabelRules {
        LabelRules::compile(&LabelRulesConfig::default()).unwrap()
    }

    #[test]
    fn label_families() {
        let r = rules();
        let defaults = LabelRulesConfig::default();
        assert_eq!(r.replies.len(), defaults.replies.len());
        assert!(!r.forbidden.is_empty());
        assert!(RuleTable::compile::<&str>(&[]).unwrap().is_empty());
        for label in [
            "Show replies",
            "show more replies",
            "Load more replies",
            "More replies",
            "Show additional replies",
            "Show 3 more replies",
            "VIEW REPLIES",
        ] {
            assert_eq!(r.classify_label(label), Some(ControlKind::RepliesExpander), "{label}");
        }
        for label in [
            "Show more",
            "See all",
            "Read more",
            "show entire post",
            "Show this thread",
            "Show thread",
            "Show conversation",
            "showmore",
        ] {
            assert_eq!(r.classify_label(label), Some(ControlKind::TextExpander), "{label}");
        }
        for label in ["", "Reply", "Like", "Repost", "Follow", "More"] {
            assert_eq!(r.classify_label(label), None, "{label}");
        }
    }

    #[test]
    fn forbidden_wording_vetoes_reveal_patterns() {
        let r = rules();
        for label in [
            "Show more Quote Tweets",
            "View all quote tweets",
            "Show more quoted reply",
            "See all · Share Tweet",
        ] {
            assert!(r.show_more.matches(label) || r.replies.matches(label), "{label}");
            assert_eq!(r.classify_label(label), None, "{label}");
        }
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let cfg = LabelRulesConfig {
            replies: vec!["(unclosed".into()],
            ..LabelRulesConfig::default()
        };
        assert!(matches!(LabelRules::compile(&cfg), Err(ExpanderError::Pattern(_))));
    }

    fn page() -> MemoryPage {
        let quote = |id: &str, text: &str| {
            NodeSpec::new("div")
                .attr("data-testid", "quoteTweet")
                .child(NodeSpec::new("button").dom_id(id).text(text))
        };
        MemoryPage::new(vec![
            NodeSpec::new("header").child(NodeSpec::new("button").dom_id("outside").text("Show more")),
            NodeSpec::new("div").attr("data-testid", "primaryColumn").child(
                NodeSpec::new("article")
                    .child(
                        NodeSpec::new("button")
                            .dom_id("marker")
                            .attr("data-testid", "tweet-text-show-more-link"),
                    )
                    .child(NodeSpec::new("button").dom_id("replies").text("Show 3 more replies"))
                    .child(NodeSpec::new("button").dom_id("text").attr("aria-label", "Read more"))
                    .child(NodeSpec::new("button").dom_id("like").text("Like"))
                    .child(NodeSpec::new("button").dom_id("empty"))
                    .child(NodeSpec::new("button").dom_id("qt").text("Show more Quote Tweets"))
                    .child(NodeSpec::new("button").dom_id("gone").text("Show more").hidden())
                    .child(
                        NodeSpec::new("a")
                            .attr("href", "/status/1")
                            .child(NodeSpec::new("button").dom_id("linked").text("Show more")),
                    )
                    .child(quote("quoted-text", "Show more"))
                    .child(quote("quoted-replies", "Show replies"))
                    .child(
                        NodeSpec::new("div").attr("data-testid", "quoteTweet").child(
                            NodeSpec::new("button")
                                .dom_id("quoted-marker")
                                .attr("data-testid", "tweet-text-show-more-link"),
                        ),
                    )
                    .child(NodeSpec::new("article").child(
                        NodeSpec::new("button").dom_id("nested").text("Show more"),
                    )),
            ),
        ])
    }

    #[test]
    fn classifies_elements() {
        let page = page();
        let selectors = Selectors::compile(&SelectorConfig::default()).unwrap();
        let rules = rules();
        let classifier = Classifier::new(&page, &selectors, &rules);
        let kind = |name: &str| classifier.classify(page.find(name).unwrap());

        assert_eq!(kind("marker"), Some(ControlKind::TextExpander));
        assert_eq!(kind("replies"), Some(ControlKind::RepliesExpander));
        assert_eq!(kind("text"), Some(ControlKind::TextExpander));

        for rejected in ["outside", "like", "empty", "qt", "gone", "linked"] {
            assert_eq!(kind(rejected), None, "{rejected}");
        }
    }

    #[test]
    fn quoted_content_is_rejected_whatever_the_label() {
        let page = page();
        let selectors = Selectors::compile(&SelectorConfig::default()).unwrap();
        let rules = rules();
        let classifier = Classifier::new(&page, &selectors, &rules);

        for quoted in ["quoted-text", "quoted-replies", "quoted-marker", "nested"] {
            assert_eq!(classifier.classify(page.find(quoted).unwrap()), None, "{quoted}");
        }
    }
}
