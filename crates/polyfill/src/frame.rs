//! Rendering synchronization
//!
//! Visible mutations are queued and applied together on the next frame, inside
//! a single host write, so one frame yields one burst of mutation records.

use dom::DomArena;
use parking_lot::Mutex;

use crate::host::HostDocument;

pub type FrameTask = Box<dyn FnOnce(&mut DomArena) + Send>;

#[derive(Default)]
pub struct FrameScheduler {
    queue: Mutex<Vec<FrameTask>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a mutation for the next frame
    pub fn request<F>(&self, task: F)
    where
        F: FnOnce(&mut DomArena) + Send + 'static,
    {
        self.queue.lock().push(Box::new(task));
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Apply everything queued so far, in request order; returns the number applied.
    ///
    /// Tasks requested while flushing wait for the next frame.
    pub fn flush(&self, host: &HostDocument) -> usize {
        let tasks = std::mem::take(&mut *self.queue.lock());
        if tasks.is_empty() {
            return 0;
        }
        let count = tasks.len();
        host.write(|doc| {
            for task in tasks {
                task(doc);
            }
        });
        tracing::trace!("Flushed {} frame task(s)", count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostEvent;
    use url::Url;

    #[test]
    fn test_flush_applies_in_order_in_one_batch() {
        let host = HostDocument::parse(
            "<svg><use/></svg>",
            Url::parse("http://localhost/").unwrap(),
        )
        .unwrap();
        let use_el = host.read(|d| d.find_by_tag("use")[0]);
        let mut rx = host.subscribe();

        let frames = FrameScheduler::new();
        frames.request(move |d| {
            d.set_attribute(use_el, "href", "first").unwrap();
        });
        frames.request(move |d| {
            d.set_attribute(use_el, "href", "second").unwrap();
        });
        assert_eq!(frames.pending(), 2);
        assert!(!host.read(|d| d.get(use_el).unwrap().has_attr("href")));

        assert_eq!(frames.flush(&host), 2);
        assert_eq!(frames.flush(&host), 0);
        assert_eq!(
            host.read(|d| d.get(use_el).unwrap().attr("href").map(str::to_string)),
            Some("second".to_string())
        );

        let mut records = 0;
        while let Ok(HostEvent::Mutation(_)) = rx.try_recv() {
            records += 1;
        }
        assert_eq!(records, 2);
    }
}
