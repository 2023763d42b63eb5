use slimthread_page::{NodeId, PageDom, Query};

/// Is the host actively producing a response below `root`? Pure read; no
/// mutation, no layout-dependent access. Steady-mode evaluation never trims
/// while this is true. Fast mode skips the check by design: a stream is
/// unlikely to be mid-flight on a fresh page load, and the pre-paint window
/// is too short to spend on it.
pub fn is_streaming(dom: &PageDom, root: NodeId) -> bool {
    let indicators = [
        // An active stop-generation affordance.
        Query::attr_prefix("data-testid", "stop-button"),
        Query::attr_contains("aria-label", "stop generating"),
        // A typing/progress indicator.
        Query::class_token("result-streaming"),
        Query::class_token("typing-indicator"),
        // An incomplete-message marker on the message itself.
        Query::attr_present("data-message-streaming"),
    ];

    indicators
        .iter()
        .any(|query| !dom.query(root, query).is_empty())
}
