use crate::FilterExpression;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query parameters for listing jobs with filtering and pagination.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub filter: Vec<FilterExpression>,
    pub limit: usize,
    pub offset: usize,
}

/// Result of a paginated job query.
#[derive(Debug, Clone)]
pub struct JobPage<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl JobQuery {
    pub fn new() -> Self {
        Self {
            filter: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_filter(mut self, filter: Vec<FilterExpression>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
