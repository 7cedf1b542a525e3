use csv_async::StringRecord;
use serde::{de::IgnoredAny, Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError};

/// Columns past this index carry nothing the importer uses.
pub const COLUMN_COUNT: usize = 13;

/// Positional layout of a catalog row. The first four columns that matter
/// (id, title, category) have no default, so a row too short to supply them
/// fails to decode and gets dropped.
#[serde_as]
#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    category: String,
    #[serde(default)]
    _column_4: IgnoredAny,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    price: f64,
    #[serde(default)]
    _column_6: IgnoredAny,
    #[serde(default)]
    _column_7: IgnoredAny,
    #[serde(default)]
    _column_8: IgnoredAny,
    #[serde(default)]
    _column_9: IgnoredAny,
    #[serde(default)]
    product_url: String,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    author: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub author: String,
    pub price: f64,
    pub product_url: String,
    pub image_url: String,
}

impl CatalogRecord {
    /// Decodes one data row. Returns `None` when the row is structurally
    /// too short to be a record.
    pub fn from_row(row: &StringRecord) -> Option<Self> {
        let row: StringRecord = row.iter().take(COLUMN_COUNT).collect();
        let row: CatalogRow = row.deserialize(None).ok()?;

        let price = if row.price.is_finite() && row.price > 0.0 {
            row.price
        } else {
            0.0
        };

        Some(Self {
            id: row.id.trim().to_string(),
            title: row.title.trim().to_string(),
            description: row.description.trim().to_string(),
            category: row.category.trim().to_string(),
            author: row.author.trim().to_string(),
            price,
            product_url: row.product_url.trim().to_string(),
            image_url: row.image_url.trim().to_string(),
        })
    }
}
