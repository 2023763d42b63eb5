use crate::dom::PageDom;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared handle to the page model. The engine, the executor, and the test
/// harness standing in for the host all hold one of these; access is always
/// a short closure over the whole document, never a retained guard across an
/// await point.
#[derive(Debug, Clone)]
pub struct SharedDom {
    inner: Arc<Mutex<PageDom>>,
}

impl SharedDom {
    pub fn new(dom: PageDom) -> Self {
        Self {
            inner: Arc::new(Mutex::new(dom)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut PageDom) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl Default for SharedDom {
    fn default() -> Self {
        Self::new(PageDom::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_gives_exclusive_access() {
        let shared = SharedDom::default();
        let node = shared.with(|dom| {
            let body = dom.body();
            let node = dom.create_element("div");
            let Ok(()) = dom.append_child(body, node) else {
                panic!("append should succeed");
            };
            node
        });

        assert!(shared.with(|dom| dom.is_attached(node)));
    }
}
