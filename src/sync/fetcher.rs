use crate::error::{Result, SyncError};
use crate::models::{Record, StreamKind};
use crate::sync::source::RecordSource;
use tracing::debug;

/// One backward pass over a stream: newest records first, page by page,
/// down to the watermark floor.
///
/// The cursor for every follow-up page is the minimum timestamp of the page
/// just returned, never the wall clock. An empty page ends the walk; a
/// non-empty page whose minimum fails to move strictly below the cursor is
/// a stall (the source is re-serving data) and aborts instead of looping.
pub struct PageWalk<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    kind: StreamKind,
    floor: f64,
    cursor: Option<f64>,
    pages: u32,
    done: bool,
}

impl<'a, S: RecordSource + ?Sized> PageWalk<'a, S> {
    pub fn new(source: &'a S, kind: StreamKind, floor: f64) -> Self {
        Self {
            source,
            kind,
            floor,
            cursor: None,
            pages: 0,
            done: false,
        }
    }

    /// Pages successfully yielded so far.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Record>>> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .source
            .fetch_page(self.kind, self.floor, self.cursor)
            .await?;

        if page.is_empty() {
            self.done = true;
            debug!(
                "🏁 {} walk exhausted after {} pages (cursor {:?})",
                self.kind, self.pages, self.cursor
            );
            return Ok(None);
        }

        let page_min = page.iter().map(Record::time).fold(f64::INFINITY, f64::min);

        if let Some(cursor) = self.cursor {
            if page_min >= cursor {
                self.done = true;
                return Err(SyncError::Stall {
                    cursor,
                    floor: self.floor,
                });
            }
        }

        self.cursor = Some(page_min);
        self.pages += 1;
        Ok(Some(page))
    }
}
