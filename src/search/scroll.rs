use super::sink::{DocumentSink, ScrollPage};
use crate::error::IndexError;
use log::warn;

/// Walks every document id of an index in engine-native scroll pages.
pub struct ScrollBatches<'a, K: DocumentSink> {
    sink: &'a K,
    index: &'a str,
    batch_size: usize,
    scroll_id: Option<String>,
    started: bool,
    finished: bool,
}

impl<'a, K: DocumentSink> ScrollBatches<'a, K> {
    pub fn new(sink: &'a K, index: &'a str, batch_size: usize) -> Self {
        Self {
            sink,
            index,
            batch_size: batch_size.max(1),
            scroll_id: None,
            started: false,
            finished: false,
        }
    }

    /// Next non-empty page of ids, or `None` once the index is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<String>>, IndexError> {
        if self.finished {
            return Ok(None);
        }

        let page = if !self.started {
            self.started = true;
            self.sink.open_scroll(self.index, self.batch_size).await?
        } else {
            match self.scroll_id.clone() {
                Some(scroll_id) => self.sink.continue_scroll(&scroll_id).await?,
                None => ScrollPage::default(),
            }
        };

        if page.scroll_id.is_some() {
            self.scroll_id = page.scroll_id;
        }

        if page.ids.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        Ok(Some(page.ids))
    }

    /// Release the server-side scroll context.
    pub async fn close(mut self) {
        if let Some(scroll_id) = self.scroll_id.take() {
            if let Err(err) = self.sink.clear_scroll(&scroll_id).await {
                warn!("failed to clear scroll on {}: {}", self.index, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemorySink;
    use serde_json::json;

    #[tokio::test]
    async fn walks_all_ids_in_pages() {
        let sink = MemorySink::new();
        for id in 1..=5 {
            sink.insert_document("tags", &id.to_string(), json!({}));
        }

        let mut scroll = ScrollBatches::new(&sink, "tags", 2);
        let mut seen = Vec::new();
        let mut pages = 0;
        while let Some(ids) = scroll.next_batch().await.expect("scroll") {
            assert!(ids.len() <= 2);
            pages += 1;
            seen.extend(ids);
        }
        scroll.close().await;

        assert_eq!(pages, 3);
        assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(sink.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn empty_index_yields_nothing() {
        let sink = MemorySink::new();
        let mut scroll = ScrollBatches::new(&sink, "tags", 10);
        assert!(scroll.next_batch().await.expect("scroll").is_none());
        assert!(scroll.next_batch().await.expect("scroll").is_none());
        scroll.close().await;
    }
}
