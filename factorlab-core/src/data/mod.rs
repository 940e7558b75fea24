//! Price data: column aliasing, date-indexed series, sources and file I/O.

pub mod columns;
pub mod io;
pub mod panel;
pub mod source;
pub mod synthetic;

pub use columns::{normalize_column_name, resolve_columns, PriceField, ResolvedColumns};
pub use io::{read_price_file, write_factor_table_parquet, write_price_panel_parquet};
pub use panel::{union_calendar, DateSeries, JoinPolicy, JoinedPair, PriceBar, PricePanel};
pub use source::{FilePriceSource, MemoryPriceSource, PriceSource};
