//! Pagination parameters

use crate::service::db::condition::Condition;

/// A paged query: page number, page size and the condition to page over.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub page_num: u64,
    pub load_size: u64,
    /// when false the whole result is returned
    pub page: bool,
    pub condition: Condition,
}

impl Default for Search {
    fn default() -> Self {
        Self {
            page_num: 1,
            load_size: 10,
            page: true,
            condition: Condition::new(),
        }
    }
}

impl Search {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page_num: u64, load_size: u64) -> Self {
        self.page_num = page_num;
        self.load_size = load_size;
        self.page = true;
        self
    }

    pub fn without_paging(mut self) -> Self {
        self.page = false;
        self
    }

    /// Offset of the first row: `(page_num - 1) * load_size`, never negative.
    pub fn start_index(&self) -> u64 {
        if self.page_num > 1 {
            (self.page_num - 1) * self.load_size
        } else {
            0
        }
    }

    /// Row count of one page.
    pub fn end_index(&self) -> u64 {
        self.load_size
    }

    /// The condition with the page limit applied.
    pub fn paged_condition(&self) -> Condition {
        if self.page {
            self.condition
                .clone()
                .limit_range(self.start_index(), self.end_index())
        } else {
            self.condition.clone()
        }
    }
}
