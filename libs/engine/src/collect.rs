use crate::classify::has_trusted_role_attribute;
use slimthread_page::{NodeId, PageDom, Query};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// One fallback level: a set of query strategies plus the minimum filtered
/// result count required to accept it.
#[derive(Debug, Clone)]
pub struct Tier {
    pub label: &'static str,
    pub strategies: Vec<Query>,
    pub min_results: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierId {
    A,
    B,
    C,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Candidate elements in document order.
    pub nodes: Vec<NodeId>,
    /// Which tier produced the result; `None` means nothing was found.
    pub tier: Option<TierId>,
}

impl Collection {
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            tier: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub tiers: Vec<Tier>,
    /// Last-resort broader patterns, tried only after every tier failed.
    pub fallback: Tier,
    /// A candidate with more descendants than this is a page-scale container,
    /// not a message.
    pub max_descendants: usize,
    /// Candidates with less text than this are rejected unless role-marked.
    pub min_text_len: usize,
    pub cache_ttl: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                Tier {
                    label: "author-role attributes",
                    strategies: vec![
                        Query::attr_present("data-message-author-role"),
                        Query::attr_present("data-author"),
                    ],
                    min_results: 2,
                },
                Tier {
                    label: "test ids",
                    strategies: vec![
                        Query::attr_prefix("data-testid", "conversation-turn"),
                        Query::attr_prefix("data-testid", "chat-message"),
                    ],
                    min_results: 2,
                },
                Tier {
                    label: "structural",
                    strategies: vec![
                        Query::tag("article"),
                        Query::class_token("chat-message"),
                        Query::class_token("message"),
                    ],
                    min_results: 4,
                },
            ],
            fallback: Tier {
                label: "broad test ids",
                strategies: vec![
                    Query::attr_contains("data-testid", "turn"),
                    Query::attr_contains("data-testid", "message"),
                ],
                min_results: 3,
            },
            max_descendants: 300,
            min_text_len: 2,
            cache_ttl: Duration::from_millis(100),
        }
    }
}

#[derive(Debug)]
struct CachedCollection {
    at: Instant,
    value: Collection,
}

/// Locates message-bearing elements through tiered fallback. The tier system
/// trades a small risk of false negatives (empty result, no-op trim) for a
/// strong guarantee against false positives: a structural container must
/// never be classified as a message and removed.
#[derive(Debug)]
pub struct CandidateCollector {
    config: CollectorConfig,
    cache: Option<CachedCollection>,
}

impl CandidateCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    /// Collect candidates below `root`. Near-simultaneous triggers within the
    /// TTL reuse the previous result instead of re-querying the document.
    pub fn collect(&mut self, dom: &PageDom, root: NodeId, now: Instant) -> Collection {
        if let Some(cached) = &self.cache
            && now.duration_since(cached.at) <= self.config.cache_ttl
        {
            return cached.value.clone();
        }

        let fresh = self.collect_uncached(dom, root);
        self.cache = Some(CachedCollection {
            at: now,
            value: fresh.clone(),
        });
        fresh
    }

    /// Drop the cached result. Must be called on navigation; the cached nodes
    /// belong to a document that no longer exists.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    fn collect_uncached(&self, dom: &PageDom, root: NodeId) -> Collection {
        for (index, tier) in self.config.tiers.iter().enumerate() {
            let nodes = self.run_tier(dom, root, tier);
            if nodes.len() >= tier.min_results {
                let tier_id = match index {
                    0 => TierId::A,
                    1 => TierId::B,
                    _ => TierId::C,
                };
                return Collection {
                    nodes,
                    tier: Some(tier_id),
                };
            }
            tracing::debug!(
                tier = tier.label,
                found = nodes.len(),
                needed = tier.min_results,
                "tier below minimum, falling through"
            );
        }

        let nodes = self.run_tier(dom, root, &self.config.fallback);
        if nodes.len() >= self.config.fallback.min_results {
            return Collection {
                nodes,
                tier: Some(TierId::Fallback),
            };
        }

        Collection::empty()
    }

    fn run_tier(&self, dom: &PageDom, root: NodeId, tier: &Tier) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for strategy in &tier.strategies {
            for node in dom.query(root, strategy) {
                if seen.insert(node) {
                    candidates.push(node);
                }
            }
        }

        candidates.retain(|node| self.plausibly_a_message(dom, *node));

        let mut nodes = outermost_only(dom, candidates);

        // Merging several strategies can interleave document order; restore it.
        let positions: HashMap<NodeId, usize> = dom
            .document_order()
            .into_iter()
            .enumerate()
            .map(|(position, node)| (node, position))
            .collect();
        nodes.sort_by_key(|node| positions.get(node).copied().unwrap_or(usize::MAX));
        nodes
    }

    fn plausibly_a_message(&self, dom: &PageDom, node: NodeId) -> bool {
        let trusted = has_trusted_role_attribute(dom, node);

        // Attribute-only hidden check: the collector also feeds the
        // pre-paint path, which must never perform a layout-dependent read.
        // The accurate thread build layers the full check on top.
        if !trusted && dom.is_attribute_hidden(node) {
            return false;
        }
        if dom.descendant_count(node) > self.config.max_descendants {
            return false;
        }
        if !trusted && dom.text_content(node).len() < self.config.min_text_len {
            return false;
        }
        true
    }
}

/// Keep only candidates with no other candidate above them. When element A
/// contains element B and both matched, A wins; counting both would count
/// one message twice.
fn outermost_only(dom: &PageDom, candidates: Vec<NodeId>) -> Vec<NodeId> {
    let set: HashSet<NodeId> = candidates.iter().copied().collect();
    candidates
        .into_iter()
        .filter(|node| {
            let mut cursor = dom.parent(*node);
            while let Some(current) = cursor {
                if set.contains(&current) {
                    return false;
                }
                cursor = dom.parent(current);
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_root() -> (PageDom, NodeId) {
        let mut dom = PageDom::new();
        let body = dom.body();
        let root = dom.create_element("main");
        let Ok(()) = dom.append_child(body, root) else {
            panic!("append should succeed");
        };
        (dom, root)
    }

    fn add_message(dom: &mut PageDom, parent: NodeId, role: &str, text: &str) -> NodeId {
        let node = dom.create_element("div");
        let Ok(()) = dom.append_child(parent, node) else {
            panic!("append should succeed");
        };
        let Ok(()) = dom.set_attribute(node, "data-message-author-role", role) else {
            panic!("set_attribute should succeed");
        };
        let Ok(()) = dom.set_text(node, text) else {
            panic!("set_text should succeed");
        };
        node
    }

    #[test]
    fn tier_a_accepts_role_marked_messages() {
        let (mut dom, root) = page_with_root();
        let first = add_message(&mut dom, root, "user", "hello");
        let second = add_message(&mut dom, root, "assistant", "hi there");

        let mut collector = CandidateCollector::new(CollectorConfig::default());
        let collection = collector.collect(&dom, root, Instant::now());

        assert_eq!(collection.tier, Some(TierId::A));
        assert_eq!(collection.nodes, vec![first, second]);
    }

    #[test]
    fn falls_through_to_test_id_tier() {
        let (mut dom, root) = page_with_root();
        let mut expected = Vec::new();
        for index in 0..3 {
            let node = dom.create_element("div");
            let Ok(()) = dom.append_child(root, node) else {
                panic!("append should succeed");
            };
            let value = format!("conversation-turn-{index}");
            let Ok(()) = dom.set_attribute(node, "data-testid", &value) else {
                panic!("set_attribute should succeed");
            };
            let Ok(()) = dom.set_text(node, "some message text") else {
                panic!("set_text should succeed");
            };
            expected.push(node);
        }

        let mut collector = CandidateCollector::new(CollectorConfig::default());
        let collection = collector.collect(&dom, root, Instant::now());

        assert_eq!(collection.tier, Some(TierId::B));
        assert_eq!(collection.nodes, expected);
    }

    #[test]
    fn nested_matches_keep_only_the_outermost() {
        let (mut dom, root) = page_with_root();
        let outer = add_message(&mut dom, root, "assistant", "outer");
        let inner = dom.create_element("div");
        let Ok(()) = dom.append_child(outer, inner) else {
            panic!("append should succeed");
        };
        let Ok(()) = dom.set_attribute(inner, "data-author", "assistant") else {
            panic!("set_attribute should succeed");
        };
        let _other = add_message(&mut dom, root, "user", "other");

        let mut collector = CandidateCollector::new(CollectorConfig::default());
        let collection = collector.collect(&dom, root, Instant::now());

        assert!(collection.nodes.contains(&outer));
        assert!(!collection.nodes.contains(&inner));
    }

    #[test]
    fn page_scale_containers_are_rejected() {
        let (mut dom, root) = page_with_root();
        // A role-marked container with far too many descendants.
        let container = add_message(&mut dom, root, "assistant", "wrapper");
        for _ in 0..5 {
            let filler = dom.create_element("div");
            let Ok(()) = dom.append_child(container, filler) else {
                panic!("append should succeed");
            };
        }
        add_message(&mut dom, root, "user", "real");
        add_message(&mut dom, root, "assistant", "real too");

        let config = CollectorConfig {
            max_descendants: 3,
            ..CollectorConfig::default()
        };
        let mut collector = CandidateCollector::new(config);
        let collection = collector.collect(&dom, root, Instant::now());

        assert!(!collection.nodes.contains(&container));
        assert_eq!(collection.nodes.len(), 2);
    }

    #[test]
    fn hidden_unmarked_candidates_are_rejected() {
        let (mut dom, root) = page_with_root();
        for _ in 0..4 {
            let node = dom.create_element("article");
            let Ok(()) = dom.append_child(root, node) else {
                panic!("append should succeed");
            };
            let Ok(()) = dom.set_text(node, "visible structural message") else {
                panic!("set_text should succeed");
            };
        }
        let hidden = dom.create_element("article");
        let Ok(()) = dom.append_child(root, hidden) else {
            panic!("append should succeed");
        };
        let Ok(()) = dom.set_text(hidden, "hidden structural message") else {
            panic!("set_text should succeed");
        };
        let Ok(()) = dom.set_attribute(hidden, "hidden", "") else {
            panic!("set_attribute should succeed");
        };

        let mut collector = CandidateCollector::new(CollectorConfig::default());
        let collection = collector.collect(&dom, root, Instant::now());

        assert_eq!(collection.tier, Some(TierId::C));
        assert!(!collection.nodes.contains(&hidden));
        assert_eq!(collection.nodes.len(), 4);
    }

    #[test]
    fn result_is_cached_within_ttl() {
        let (mut dom, root) = page_with_root();
        add_message(&mut dom, root, "user", "one");
        add_message(&mut dom, root, "assistant", "two");

        let mut collector = CandidateCollector::new(CollectorConfig::default());
        let start = Instant::now();
        let first = collector.collect(&dom, root, start);

        // New message lands, but the cache is still fresh.
        add_message(&mut dom, root, "user", "three");
        let cached = collector.collect(&dom, root, start + Duration::from_millis(50));
        assert_eq!(cached, first);

        // Past the TTL the new state is picked up.
        let fresh = collector.collect(&dom, root, start + Duration::from_millis(200));
        assert_eq!(fresh.nodes.len(), 3);
    }

    #[test]
    fn invalidate_drops_the_cache() {
        let (mut dom, root) = page_with_root();
        add_message(&mut dom, root, "user", "one");
        add_message(&mut dom, root, "assistant", "two");

        let mut collector = CandidateCollector::new(CollectorConfig::default());
        let start = Instant::now();
        let _ = collector.collect(&dom, root, start);

        add_message(&mut dom, root, "user", "three");
        collector.invalidate();
        let fresh = collector.collect(&dom, root, start);
        assert_eq!(fresh.nodes.len(), 3);
    }

    #[test]
    fn unrecognizable_page_returns_empty() {
        let (mut dom, root) = page_with_root();
        let stray = dom.create_element("div");
        let Ok(()) = dom.append_child(root, stray) else {
            panic!("append should succeed");
        };

        let mut collector = CandidateCollector::new(CollectorConfig::default());
        let collection = collector.collect(&dom, root, Instant::now());
        assert!(collection.nodes.is_empty());
        assert_eq!(collection.tier, None);
    }
}
