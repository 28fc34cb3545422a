//! Paged byte log: an ordered chain of fixed-size pages storing a flow's
//! buffered bytes, with per-page write-fill and read-cursor tracking.
//!
//! The source driver represents this as a singly linked list with a
//! sentinel head. spec.md §9 explicitly permits an equivalent ring or
//! deque representation since the external contract only depends on the
//! capacity invariant, not the storage shape; this implementation uses a
//! `VecDeque<Page>`, which gives head-consume (`pop_front`) and
//! tail-append (`back_mut`) without pointer plumbing.

use std::collections::VecDeque;

/// A fixed-capacity page of buffered bytes.
#[derive(Debug)]
pub struct Page {
    data: Vec<u8>,
    capacity: usize,
    /// Number of bytes written into `data` so far.
    fill: usize,
    /// Number of bytes already consumed from the front of `data`.
    read_cursor: usize,
}

impl Page {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            fill: 0,
            read_cursor: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.fill == self.capacity
    }

    fn is_drained(&self) -> bool {
        self.read_cursor == self.fill && self.fill == self.capacity
    }

    /// Bytes still readable from this page.
    fn valid(&self) -> usize {
        self.fill - self.read_cursor
    }

    fn room(&self) -> usize {
        self.capacity - self.fill
    }

    fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.room());
        self.data.extend_from_slice(&bytes[..n]);
        self.fill += n;
        n
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.valid());
        dst[..n].copy_from_slice(&self.data[self.read_cursor..self.read_cursor + n]);
        self.read_cursor += n;
        n
    }
}

/// Ordered chain of pages backing one flow's buffered bytes.
///
/// A single empty page is present right after construction so the first
/// `append` has somewhere to write; once every page is fully drained by
/// `consume` the chain can become empty again, and the next `append`
/// lazily allocates a fresh page, mirroring the source driver.
#[derive(Debug)]
pub struct PagedLog {
    page_size: usize,
    max_pages: usize,
    pages: VecDeque<Page>,
}

impl PagedLog {
    /// Creates a log with one empty page, as spec.md §4.1 requires.
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        let mut pages = VecDeque::with_capacity(max_pages);
        pages.push_back(Page::new(page_size));
        Self {
            page_size,
            max_pages,
            pages,
        }
    }

    /// Total bytes currently readable across all pages.
    pub fn valid_bytes(&self) -> usize {
        self.pages.iter().map(Page::valid).sum()
    }

    /// Appends up to `bytes.len()` bytes, allocating additional pages as
    /// needed, stopping early if the page limit is reached. Returns the
    /// number of bytes actually appended; the caller is responsible for
    /// not exceeding the flow's capacity (this call never enforces it).
    ///
    /// Returns `None` if an allocation failure (`Vec::try_reserve`) aborts
    /// the append before any bytes were copied; callers encountering that
    /// should surface `FlowError::OutOfMemory`. A partial append due to
    /// reaching `max_pages` (not an allocation failure) returns `Some(n)`
    /// with `n < bytes.len()`.
    pub fn append(&mut self, bytes: &[u8]) -> Option<usize> {
        if bytes.is_empty() {
            return Some(0);
        }
        let mut written = 0;
        loop {
            if written == bytes.len() {
                break;
            }
            if self.pages.back().map(Page::is_full).unwrap_or(true) {
                if self.pages.len() >= self.max_pages {
                    break;
                }
                let mut page = Page::new(self.page_size);
                if page.data.try_reserve_exact(self.page_size).is_err() {
                    return if written == 0 { None } else { Some(written) };
                }
                self.pages.push_back(page);
            }
            let page = self.pages.back_mut().expect("page just ensured present");
            written += page.write(&bytes[written..]);
        }
        Some(written)
    }

    /// Copies up to `dst.len()` bytes from the head of the log, advancing
    /// read cursors and freeing fully drained pages as it goes. Returns the
    /// number of bytes actually copied (may be less than `dst.len()` when
    /// fewer bytes are buffered).
    pub fn consume(&mut self, dst: &mut [u8]) -> usize {
        let mut read = 0;
        while read < dst.len() {
            let Some(head) = self.pages.front_mut() else {
                break;
            };
            if head.valid() == 0 && head.fill < head.capacity {
                // Head has nothing left and isn't full: no more data anywhere.
                break;
            }
            read += head.read(&mut dst[read..]);
            if self.pages.front().map(Page::is_drained).unwrap_or(false) {
                // The source frees a page as soon as its read cursor hits
                // the page size, even if it is the last page in the chain
                // — the log can become structurally empty between a full
                // drain and the next append, which lazily allocates.
                self.pages.pop_front();
            }
        }
        read
    }

    /// Invariant check used by tests: no page but the head may have a
    /// nonzero read cursor.
    #[cfg(test)]
    pub fn only_head_has_cursor(&self) -> bool {
        self.pages
            .iter()
            .skip(1)
            .all(|p| p.read_cursor == 0)
    }
}
