use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::mods::RecordExtractor;
use crate::remote::MetadataSource;

/// Models whose `parents` column points at a collection.
pub const WORK_MODELS: [&str; 3] = ["Image", "Video", "Audio"];

const OUTPUT_SUFFIX: &str = "_with_collections.csv";

/// One sheet row, column name to value. Keys keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
  fields: Vec<(String, String)>,
}

impl Row {
  pub fn new() -> Self {
    Row::default()
  }

  pub fn get(&self, column: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(key, _)| key == column)
      .map(|(_, value)| value.as_str())
  }

  /// Set `column`, overwriting an earlier value in place.
  pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
    let column = column.into();
    let value = value.into();
    match self.fields.iter_mut().find(|(key, _)| *key == column) {
      Some((_, existing)) => *existing = value,
      None => self.fields.push((column, value)),
    }
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.fields.iter().map(|(key, _)| key.as_str())
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut row = Row::new();
    for (column, value) in iter {
      row.insert(column, value);
    }
    row
  }
}

/// What [`Sheet::add_collections`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
  pub original_rows: usize,
  pub collections: usize,
  pub new_columns: Vec<String>,
}

/// A Bulkrax import sheet: a header of unique column names and the rows under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
  headers: Vec<String>,
  rows: Vec<Row>,
}

impl Sheet {
  pub fn new<I, S>(headers: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut sheet = Sheet::default();
    for column in headers {
      sheet.add_column(column.into());
    }
    sheet
  }

  pub fn read(path: &Path) -> Result<Self> {
    Sheet::from_reader(File::open(path)?)
  }

  /// Ragged rows are accepted: missing cells stay absent, surplus cells are dropped.
  pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
    let mut csv_reader = csv::ReaderBuilder::new()
      .flexible(true)
      .from_reader(reader);
    let columns: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();
    let mut sheet = Sheet::new(columns.iter().cloned());
    for record in csv_reader.records() {
      let record = record?;
      sheet
        .rows
        .push(columns.iter().cloned().zip(record.iter()).collect());
    }
    Ok(sheet)
  }

  pub fn headers(&self) -> &[String] {
    &self.headers
  }

  pub fn rows(&self) -> &[Row] {
    &self.rows
  }

  pub fn has_column(&self, column: &str) -> bool {
    self.headers.iter().any(|header| header == column)
  }

  /// Append a row, extending the header with any column it introduces.
  /// Returns the newly added columns.
  pub fn push(&mut self, row: Row) -> Vec<String> {
    let added = row
      .keys()
      .filter(|key| self.add_column(key.to_string()))
      .map(String::from)
      .collect();
    self.rows.push(row);
    added
  }

  /// Distinct `parents` of the work rows, in order of first appearance.
  /// Values are compared as exact strings.
  pub fn collection_references(&self) -> Result<Vec<String>> {
    let mut references: Vec<String> = Vec::new();
    for (index, row) in self.rows.iter().enumerate() {
      let model = self.cell(row, index, "model")?;
      if !WORK_MODELS.contains(&model) {
        continue;
      }
      let parents = self.cell(row, index, "parents")?;
      if !references.iter().any(|seen| seen == parents) {
        references.push(parents.to_string());
      }
    }
    Ok(references)
  }

  /// Fetch a collection record for every distinct reference and append them.
  /// The sheet is left untouched if any fetch fails.
  pub fn add_collections<S: MetadataSource>(
    &mut self,
    extractor: &RecordExtractor<S>,
  ) -> Result<MergeSummary> {
    let original_rows = self.rows.len();
    let references = self.collection_references()?;
    if references.is_empty() {
      tracing::warn!(rows = original_rows, "No Image, Video or Audio rows reference a collection");
    } else {
      tracing::debug!(?references, "Discovered collection references");
    }

    let records = references
      .iter()
      .map(|pid| extractor.extract(pid))
      .collect::<Result<Vec<_>>>()?;

    let mut new_columns = Vec::new();
    for record in records {
      new_columns.extend(self.push(record));
    }
    if !new_columns.is_empty() {
      tracing::debug!(?new_columns, "Extended sheet header");
    }
    Ok(MergeSummary {
      original_rows,
      collections: references.len(),
      new_columns,
    })
  }

  /// Write the whole sheet to `path` through a temporary file in the same directory,
  /// so a failed run never leaves a half-written sheet behind.
  pub fn write(&self, path: &Path) -> Result<()> {
    let directory = match path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };
    let mut staged = staging_file(directory)?;
    self.write_to(&mut staged)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|source| Error::Persist {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(())
  }

  pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&self.headers)?;
    for row in &self.rows {
      csv_writer.write_record(
        self
          .headers
          .iter()
          .map(|column| row.get(column).unwrap_or("")),
      )?;
    }
    csv_writer.flush()?;
    Ok(())
  }

  fn add_column(&mut self, column: String) -> bool {
    if self.has_column(&column) {
      false
    } else {
      self.headers.push(column);
      true
    }
  }

  // A short row under a known column reads as blank; an unknown column is an error.
  fn cell<'a>(&self, row: &'a Row, index: usize, column: &'static str) -> Result<&'a str> {
    match row.get(column) {
      Some(value) => Ok(value),
      None if self.has_column(column) => Ok(""),
      None => Err(Error::MissingColumn {
        row: index + 1,
        column,
      }),
    }
  }
}

// Same mode a plain `File::create` would get, still subject to the umask.
fn staging_file(directory: &Path) -> Result<NamedTempFile> {
  let mut builder = tempfile::Builder::new();
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    builder.permissions(std::fs::Permissions::from_mode(0o644));
  }
  Ok(builder.tempfile_in(directory)?)
}

/// Read `input`, append a row per referenced collection and write the result to `output`.
pub fn add_collections<S: MetadataSource>(
  input: &Path,
  output: &Path,
  extractor: &RecordExtractor<S>,
) -> Result<MergeSummary> {
  let mut sheet = Sheet::read(input)?;
  let summary = sheet.add_collections(extractor)?;
  sheet.write(output)?;
  Ok(summary)
}

/// `sheet.csv` becomes `sheet_with_collections.csv`, next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
  let base = match input.extension() {
    Some(extension) if extension == "csv" => input.file_stem(),
    _ => input.file_name(),
  };
  let mut name = base.unwrap_or_default().to_os_string();
  name.push(OUTPUT_SUFFIX);
  input.with_file_name(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sheet(csv: &str) -> Sheet {
    Sheet::from_reader(csv.as_bytes()).unwrap()
  }

  fn written(sheet: &Sheet) -> String {
    let mut buffer = Vec::new();
    sheet.write_to(&mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
  }

  #[test]
  fn reads_header_order_and_rows() {
    let sheet = sheet("source_identifier,model,parents,title\nimg1,Image,col1,Bridge\n");
    assert_eq!(sheet.headers(), ["source_identifier", "model", "parents", "title"]);
    assert_eq!(sheet.rows().len(), 1);
    assert_eq!(sheet.rows()[0].get("title"), Some("Bridge"));
  }

  #[test]
  fn duplicate_header_keeps_first_position_and_last_value() {
    let sheet = sheet("model,note,parents,note\nImage,first,col1,second\n");
    assert_eq!(sheet.headers(), ["model", "note", "parents"]);
    assert_eq!(sheet.rows()[0].get("note"), Some("second"));
  }

  #[test]
  fn ragged_rows_are_tolerated() {
    let sheet = sheet("model,parents,title\nImage,col1\nVideo,col2,Clip,extra\n");
    assert_eq!(sheet.rows()[0].get("title"), None);
    assert_eq!(sheet.rows()[1].keys().count(), 3);
    assert_eq!(sheet.collection_references().unwrap(), ["col1", "col2"]);
  }

  #[test]
  fn references_are_distinct_in_first_seen_order() {
    let sheet = sheet(
      "model,parents\nAudio,col2\nImage,col1\nVideo,col2\nCollection,\nAttachment,col3\nImage,col1\n",
    );
    assert_eq!(sheet.collection_references().unwrap(), ["col2", "col1"]);
  }

  #[test]
  fn references_compare_exact_strings() {
    let sheet = sheet("model,parents\nImage,col1\nImage,\"col1 \"\nImage,COL1\n");
    assert_eq!(sheet.collection_references().unwrap(), ["col1", "col1 ", "COL1"]);
  }

  #[test]
  fn model_match_is_case_sensitive() {
    let sheet = sheet("model,parents\nimage,col1\nIMAGE,col2\n");
    assert!(sheet.collection_references().unwrap().is_empty());
  }

  #[test]
  fn missing_model_column_is_reported() {
    let err = sheet("parents,title\ncol1,Bridge\n")
      .collection_references()
      .unwrap_err();
    assert!(matches!(err, Error::MissingColumn { row: 1, column: "model" }));
  }

  #[test]
  fn missing_parents_column_only_matters_for_work_rows() {
    let sheet_without_works = sheet("model,title\nCollection,Stuff\n");
    assert!(sheet_without_works.collection_references().unwrap().is_empty());

    let err = sheet("model,title\nCollection,Stuff\nImage,Bridge\n")
      .collection_references()
      .unwrap_err();
    assert!(matches!(err, Error::MissingColumn { row: 2, column: "parents" }));
  }

  #[test]
  fn empty_sheet_needs_no_columns() {
    let sheet = sheet("title\n");
    assert!(sheet.collection_references().unwrap().is_empty());
  }

  #[test]
  fn push_appends_unknown_columns_at_the_end() {
    let mut sheet = sheet("model,title,parents\nImage,Bridge,col1\n");
    let record: Row = [("source_identifier", "col1"), ("model", "Collection"), ("abstract", "")]
      .into_iter()
      .collect();
    let added = sheet.push(record);
    assert_eq!(added, ["source_identifier", "abstract"]);
    assert_eq!(
      sheet.headers(),
      ["model", "title", "parents", "source_identifier", "abstract"]
    );
    assert_eq!(sheet.rows().len(), 2);
  }

  #[test]
  fn absent_columns_are_written_blank() {
    let mut sheet = sheet("model,parents\nImage,col1\n");
    sheet.push([("model", "Collection"), ("title", "Galston, \"Views\"")].into_iter().collect());
    assert_eq!(
      written(&sheet),
      "model,parents,title\nImage,col1,\nCollection,,\"Galston, \"\"Views\"\"\"\n"
    );
  }

  #[cfg(unix)]
  #[test]
  fn written_sheet_is_readable_by_others() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    sheet("model,parents\nImage,col1\n").write(&path).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o700, 0o600);
    assert_eq!(mode & 0o044, 0o044);
  }

  #[test]
  fn row_insert_overwrites_in_place() {
    let mut row = Row::new();
    row.insert("a", "1");
    row.insert("b", "2");
    row.insert("a", "3");
    assert_eq!(row.keys().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(row.get("a"), Some("3"));
  }

  #[test]
  fn default_output_replaces_csv_extension() {
    assert_eq!(
      default_output_path(Path::new("sheets/galston.csv")),
      PathBuf::from("sheets/galston_with_collections.csv")
    );
  }

  #[test]
  fn default_output_appends_to_other_names() {
    assert_eq!(
      default_output_path(Path::new("galston.tsv")),
      PathBuf::from("galston.tsv_with_collections.csv")
    );
    assert_eq!(
      default_output_path(Path::new("galston")),
      PathBuf::from("galston_with_collections.csv")
    );
  }
}
