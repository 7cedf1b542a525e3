pub mod facets;
pub mod filter;
pub mod pager;
pub mod reader;
pub mod record;

pub use facets::{scan_facets, Facets};
pub use filter::FilterSet;
pub use pager::{count_matches, read_page};
pub use record::CatalogRecord;
