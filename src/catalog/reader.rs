use anyhow::Result;
use async_compression::tokio::bufread::GzipDecoder;
use csv_async::{AsyncReader, AsyncReaderBuilder, ErrorKind, StringRecord, Trim};
use futures::{stream, Stream};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, warn};

use super::record::CatalogRecord;

pub const DELIMITER: u8 = b';';
const BOM: &[u8] = b"\xEF\xBB\xBF";

type Source = BufReader<Box<dyn AsyncRead + Unpin + Send>>;

/// Forward-only reader over the data rows of a catalog file.
///
/// The header line is consumed by the csv reader, rows too short to carry
/// an id, title and category are skipped. Reading again means opening the
/// file again.
pub struct CatalogReader {
    path: PathBuf,
    reader: AsyncReader<Source>,
    row: StringRecord,
    skipped: u64,
}

impl CatalogReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let inner: Box<dyn AsyncRead + Unpin + Send> = if is_gzip(path) {
            Box::new(GzipDecoder::new(BufReader::new(file)))
        } else {
            Box::new(file)
        };

        let mut source = BufReader::new(inner);
        skip_bom(&mut source).await?;

        let reader = AsyncReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .create_reader(source);

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            row: StringRecord::new(),
            skipped: 0,
        })
    }

    /// Reads one data row. `Some(None)` is a row that could not be decoded;
    /// `None` means the file is exhausted or can no longer be read.
    pub async fn next_row(&mut self) -> Option<Option<CatalogRecord>> {
        match self.reader.read_record(&mut self.row).await {
            Ok(true) => {
                let record = CatalogRecord::from_row(&self.row);
                if record.is_none() {
                    self.skipped += 1;
                }
                Some(record)
            }
            Ok(false) => {
                if self.skipped > 0 {
                    debug!(path = ?self.path, skipped = self.skipped, "skipped malformed rows");
                }
                None
            }
            Err(err) => {
                if let ErrorKind::Io(_) = err.kind() {
                    warn!(path = ?self.path, "stopped reading catalog: {}", err);
                    return None;
                }
                warn!(path = ?self.path, "ignoring row that failed to parse: {}", err);
                self.skipped += 1;
                Some(None)
            }
        }
    }

    /// Next well-formed record, or `None` once the file is exhausted or
    /// can no longer be read.
    pub async fn next_record(&mut self) -> Option<CatalogRecord> {
        loop {
            if let Some(record) = self.next_row().await? {
                return Some(record);
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = CatalogRecord> + Send {
        stream::unfold(self, |mut reader| async move {
            let record = reader.next_record().await?;
            Some((record, reader))
        })
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Drops a leading UTF-8 byte order mark. Nothing is consumed otherwise.
async fn skip_bom(source: &mut Source) -> Result<()> {
    let head = source.fill_buf().await?;
    if head.starts_with(BOM) {
        source.consume(BOM.len());
    }
    Ok(())
}
