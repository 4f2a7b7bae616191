use quarry_api::Schema;
use quarry_api::wire::{Compression, DataFormat};

/// Files in object storage, used as a load source or an extract
/// destination.
///
/// Options that only make sense for one direction are ignored by the
/// other; e.g. `skip_leading_rows` has no meaning for extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcsReference {
    pub uris: Vec<String>,
    pub source_format: Option<DataFormat>,
    pub compression: Option<Compression>,
    pub allow_jagged_rows: bool,
    pub allow_quoted_newlines: bool,
    pub skip_leading_rows: Option<i64>,
    pub field_delimiter: Option<String>,
    pub max_bad_records: Option<i64>,
    pub autodetect: bool,
    /// Explicit schema of the loaded data.
    pub schema: Option<Schema>,
    pub ignore_unknown_values: bool,
}

impl GcsReference {
    /// `uris` are `gs://bucket/object` paths, possibly with one `*` wildcard.
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uris: uris.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn format(mut self, format: DataFormat) -> Self {
        self.source_format = Some(format);
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn skip_leading_rows(mut self, rows: i64) -> Self {
        self.skip_leading_rows = Some(rows);
        self
    }

    pub fn field_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.field_delimiter = Some(delimiter.into());
        self
    }

    pub fn max_bad_records(mut self, records: i64) -> Self {
        self.max_bad_records = Some(records);
        self
    }

    pub fn allow_jagged_rows(mut self, allow: bool) -> Self {
        self.allow_jagged_rows = allow;
        self
    }

    pub fn allow_quoted_newlines(mut self, allow: bool) -> Self {
        self.allow_quoted_newlines = allow;
        self
    }

    pub fn autodetect(mut self, autodetect: bool) -> Self {
        self.autodetect = autodetect;
        self
    }

    pub fn ignore_unknown_values(mut self, ignore: bool) -> Self {
        self.ignore_unknown_values = ignore;
        self
    }
}
