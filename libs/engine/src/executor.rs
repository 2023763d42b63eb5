use crate::types::{EnginePolicy, ExecutionReport, MessageDescriptor, SpeedMode};
use slimthread_page::{NodeId, ObserverHandle, PageDom, PageError, SharedDom};
use std::time::Instant;

/// Tag of the inert replacement element left where a message used to be.
pub const MARKER_TAG: &str = "slimthread-trimmed";

/// Remove the given descriptors from the document.
///
/// The observer is always disconnected before the first mutation and
/// reconnected after the last one, whatever happens in between; the engine
/// must never observe its own writes. The speed mode selects the inner
/// strategy (one synchronous pass before paint, or budgeted batches with a
/// yield between steps); the disconnect/reattach bracket is shared.
pub async fn execute(
    dom: &SharedDom,
    observer: ObserverHandle,
    targets: Vec<MessageDescriptor>,
    mode: SpeedMode,
    policy: &EnginePolicy,
) -> ExecutionReport {
    dom.with(|page| {
        if let Err(error) = page.disconnect(observer) {
            tracing::warn!(%error, "could not disconnect observer before trim");
        }
    });

    let report = match mode {
        SpeedMode::Fast => remove_all_now(dom, &targets),
        SpeedMode::Steady => remove_batched(dom, &targets, policy).await,
    };

    dom.with(|page| {
        if let Err(error) = page.reconnect(observer) {
            tracing::warn!(%error, "could not reconnect observer after trim");
        }
    });

    report
}

/// Fast-mode strategy: everything in one pass. Acceptable only because fast
/// mode runs before the first paint; there is no frame budget to protect yet.
fn remove_all_now(dom: &SharedDom, targets: &[MessageDescriptor]) -> ExecutionReport {
    let mut report = ExecutionReport {
        steps: 1,
        ..ExecutionReport::default()
    };
    dom.with(|page| {
        for descriptor in targets {
            remove_one(page, descriptor, &mut report);
        }
    });
    report
}

/// Steady-mode strategy: bounded batches, each re-checking the elapsed-time
/// budget, yielding control between steps until the list is exhausted.
async fn remove_batched(
    dom: &SharedDom,
    targets: &[MessageDescriptor],
    policy: &EnginePolicy,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    let mut queue = targets.iter();
    let mut exhausted = false;

    while !exhausted {
        report.steps += 1;
        let step_started = Instant::now();

        dom.with(|page| {
            let mut done_in_step = 0usize;
            loop {
                let Some(descriptor) = queue.next() else {
                    exhausted = true;
                    break;
                };
                remove_one(page, descriptor, &mut report);
                done_in_step += 1;

                if done_in_step >= policy.batch_size {
                    break;
                }
                if step_started.elapsed() >= policy.step_budget {
                    tracing::debug!(done_in_step, "step budget exhausted, yielding early");
                    break;
                }
            }
        });

        if !exhausted {
            report.yields += 1;
            tokio::task::yield_now().await;
        }
    }

    report
}

fn remove_one(page: &mut PageDom, descriptor: &MessageDescriptor, report: &mut ExecutionReport) {
    if !page.is_attached(descriptor.node) {
        // The host got there first; the goal state is already reached.
        report.removed += 1;
        return;
    }

    match replace_with_marker(page, descriptor) {
        Ok(()) => report.removed += 1,
        Err(error) => {
            report.failed += 1;
            tracing::warn!(
                stable_id = %descriptor.stable_id,
                %error,
                "failed to remove message element"
            );
        }
    }
}

/// Replace, not delete: the marker preserves sibling counts and approximate
/// tree shape for host logic that assumes a non-empty parent, and carries
/// enough identity to debug what was trimmed.
fn replace_with_marker(page: &mut PageDom, descriptor: &MessageDescriptor) -> Result<(), PageError> {
    let marker = build_marker(page, descriptor);
    page.replace_node(descriptor.node, marker)
}

fn build_marker(page: &mut PageDom, descriptor: &MessageDescriptor) -> NodeId {
    let marker = page.create_element(MARKER_TAG);
    let _ = page.set_attribute(marker, "data-trimmed-id", &descriptor.stable_id);
    let _ = page.set_attribute(marker, "data-trimmed-role", descriptor.role.as_str());
    let _ = page.set_attribute(marker, "aria-hidden", "true");
    marker
}
