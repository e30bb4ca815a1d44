// 🔎 Header Locator - find the real header row in a noisy export
//
// Exports start with report titles, blank lines and filters before the real
// column header, and end with "Total" rows. Strategies decide whether a row is
// a header; the locator only owns the scan loop.
//
// Adding a source format = implementing HeaderStrategy and registering it.
// The scan loop never changes.

use crate::grid::RawGrid;

/// Decides whether one raw row is the column header.
pub trait HeaderStrategy: Send + Sync {
    fn is_header(&self, row: &[String]) -> bool;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Default keyword set: date / order / value families, Portuguese and English.
pub const DEFAULT_HEADER_KEYWORDS: &[&str] =
    &["DATA", "DATE", "PEDIDO", "ORDER", "VALOR", "VALUE", "AMOUNT"];

/// Rows containing any of these are summaries, never headers.
pub const DEFAULT_EXCLUDED_WORDS: &[&str] = &["TOTAL"];

/// Row qualifies when its upper-cased cells contain a keyword and no excluded word.
#[derive(Debug, Clone)]
pub struct KeywordStrategy {
    name: String,
    keywords: Vec<String>,
    excluded: Vec<String>,
}

impl KeywordStrategy {
    pub fn new(name: &str, keywords: &[&str], excluded: &[&str]) -> Self {
        KeywordStrategy {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_uppercase()).collect(),
            excluded: excluded.iter().map(|k| k.to_uppercase()).collect(),
        }
    }
}

impl Default for KeywordStrategy {
    fn default() -> Self {
        KeywordStrategy::new("keywords", DEFAULT_HEADER_KEYWORDS, DEFAULT_EXCLUDED_WORDS)
    }
}

impl HeaderStrategy for KeywordStrategy {
    fn is_header(&self, row: &[String]) -> bool {
        let joined = row.join(" ").to_uppercase();
        self.keywords.iter().any(|k| joined.contains(k.as_str()))
            && !self.excluded.iter().any(|x| joined.contains(x.as_str()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Row qualifies when every required label appears as a whole cell.
///
/// For exports whose header is known exactly (e.g. "Pedido", "Data - Hora").
#[derive(Debug, Clone)]
pub struct RequiredColumnsStrategy {
    required: Vec<String>,
}

impl RequiredColumnsStrategy {
    pub fn new(required: &[&str]) -> Self {
        RequiredColumnsStrategy {
            required: required
                .iter()
                .map(|r| r.trim().to_uppercase())
                .collect(),
        }
    }
}

impl HeaderStrategy for RequiredColumnsStrategy {
    fn is_header(&self, row: &[String]) -> bool {
        let cells: Vec<String> = row.iter().map(|c| c.trim().to_uppercase()).collect();
        self.required.iter().all(|r| cells.contains(r))
    }

    fn name(&self) -> &str {
        "required_columns"
    }
}

// ============================================================================
// LOCATOR
// ============================================================================

pub struct HeaderLocator {
    strategies: Vec<Box<dyn HeaderStrategy>>,
    scan_rows: usize,
}

impl HeaderLocator {
    /// Locator with the default keyword strategy
    pub fn new(scan_rows: usize) -> Self {
        HeaderLocator {
            strategies: vec![Box::new(KeywordStrategy::default())],
            scan_rows,
        }
    }

    /// Locator with no strategies; register them with `with_strategy`
    pub fn empty(scan_rows: usize) -> Self {
        HeaderLocator {
            strategies: Vec::new(),
            scan_rows,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn HeaderStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn scan_rows(&self) -> usize {
        self.scan_rows
    }

    /// Index of the first qualifying row within the scan window.
    pub fn locate(&self, grid: &RawGrid) -> Option<usize> {
        for (idx, row) in grid.rows.iter().take(self.scan_rows).enumerate() {
            if let Some(strategy) = self.strategies.iter().find(|s| s.is_header(row)) {
                log::debug!("Header found at row {} by '{}'", idx, strategy.name());
                return Some(idx);
            }
        }
        None
    }
}

/// Header labels plus the data rows beneath them.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedTable {
    /// None when the first row was taken as a fallback
    pub header_row: Option<usize>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl LocatedTable {
    /// Split at a header row: that row becomes labels, rows below become data.
    pub fn split(grid: &RawGrid, header_idx: usize) -> Self {
        let headers = grid.row(header_idx).map(|r| r.to_vec()).unwrap_or_default();
        let rows = grid.rows.iter().skip(header_idx + 1).cloned().collect();
        LocatedTable {
            header_row: Some(header_idx),
            headers,
            rows,
        }
    }

    /// Lenient mode: located header or, failing that, the first row as-is.
    pub fn locate_or_first_row(grid: &RawGrid, locator: &HeaderLocator) -> Self {
        match locator.locate(grid) {
            Some(idx) => LocatedTable::split(grid, idx),
            None => {
                log::warn!(
                    "No header in the first {} rows, using row 0",
                    locator.scan_rows()
                );
                let mut table = LocatedTable::split(grid, 0);
                table.header_row = None;
                table
            }
        }
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == label)
    }
}
