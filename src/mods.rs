//! Projection of a MODS record onto the flat Bulkrax collection row.

use libxml::parser::{Parser, ParserOptions};
use libxml::tree::{Document, Node};
use libxml::xpath::Context;

use crate::error::{Error, Result};
use crate::remote::MetadataSource;
use crate::sheet::Row;

const MODS_NS: &str = "http://www.loc.gov/mods/v3";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const SEPARATOR: &str = " | ";

pub const COLLECTION_MODEL: &str = "Collection";
pub const SOURCE_IDENTIFIER: &str = "source_identifier";

/// How a single column of the collection row is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
  /// Fixed value, nothing is queried.
  Constant(&'static str),
  /// Text content of every matching element.
  Text(&'static str),
  /// Un-namespaced `valueURI` attribute of every matching element.
  ValueUri(&'static str),
}

/// Column order of a synthesized collection row, after `source_identifier`.
/// Queries are relative to the `mods:mods` root element.
pub const COLLECTION_FIELDS: &[(&str, Rule)] = &[
  ("model", Rule::Constant(COLLECTION_MODEL)),
  ("parents", Rule::Constant("")),
  ("title", Rule::Text("mods:titleInfo/mods:title")),
  ("abstract", Rule::Text("mods:abstract")),
  ("contributor", Rule::Constant("")),
  ("utk_contributor", Rule::Constant("")),
  ("creator", Rule::ValueUri("mods:name")),
  ("utk_creator", Rule::Text("mods:name[not(@valueURI)]/mods:namePart")),
  ("date_created", Rule::Text("mods:originInfo/mods:dateCreated[not(@encoding)]")),
  ("date_issued", Rule::Text("mods:originInfo/mods:dateIssued[not(@encoding)]")),
  ("date_created_d", Rule::Text("mods:originInfo/mods:dateCreated[@encoding]")),
  // `@eencoding` never matches, so this column is always blank.
  ("date_issued_d", Rule::Text("mods:originInfo/mods:dateIssued[@eencoding]")),
  ("utk_publisher", Rule::Text("mods:originInfo/mods:publisher[not(@valueURI)]")),
  ("publisher", Rule::ValueUri("mods:originInfo/mods:publisher")),
  ("publication_place", Rule::Text("mods:originInfo/mods:place/mods:placeTerm[@valueURI]")),
  ("extent", Rule::Text("mods:physicalDescription/mods:extent")),
  ("form", Rule::ValueUri("mods:physicalDescription/mods:form")),
  ("subject", Rule::ValueUri("mods:subject[mods:topic]")),
  ("keyword", Rule::Text("mods:subject[not(@valueURI)]/mods:topic")),
  ("spatial", Rule::ValueUri("mods:subject/mods:geographic")),
  ("resource_type", Rule::Constant("")),
  ("repository", Rule::ValueUri("mods:location/mods:physicalLocation")),
  ("note", Rule::Text("mods:note")),
];

/// A parsed MODS record for one collection identifier.
pub struct MetadataDocument {
  pid: String,
  document: Document,
}

impl MetadataDocument {
  /// Parse `body` strictly: malformed markup is an error rather than a recovered tree.
  pub fn parse(pid: &str, body: &[u8]) -> Result<Self> {
    let options = ParserOptions {
      recover: false,
      no_error: true,
      no_warning: true,
      no_net: true,
      ..ParserOptions::default()
    };
    let document = Parser::default()
      .parse_string_with_options(body, options)
      .map_err(|_| Error::Parse {
        pid: pid.to_string(),
      })?;
    Ok(MetadataDocument {
      pid: pid.to_string(),
      document,
    })
  }

  /// Evaluate a single rule, joining all matches with `" | "`.
  pub fn select(&self, rule: Rule) -> Result<String> {
    let (mut context, root) = self.context()?;
    self.evaluate(&mut context, &root, rule)
  }

  /// Build the collection row: `source_identifier` followed by every entry of
  /// [`COLLECTION_FIELDS`] in order.
  pub fn to_record(&self) -> Result<Row> {
    let (mut context, root) = self.context()?;
    let mut record = Row::new();
    record.insert(SOURCE_IDENTIFIER, self.pid.as_str());
    for (field, rule) in COLLECTION_FIELDS {
      let value = self.evaluate(&mut context, &root, *rule)?;
      record.insert(*field, value);
    }
    Ok(record)
  }

  fn context(&self) -> Result<(Context, Node)> {
    let root = self.document.get_root_element().ok_or_else(|| Error::Parse {
      pid: self.pid.clone(),
    })?;
    let context = Context::new(&self.document).map_err(|_| self.xpath_error("<context>"))?;
    for (prefix, href) in [("mods", MODS_NS), ("xlink", XLINK_NS)] {
      context
        .register_namespace(prefix, href)
        .map_err(|_| self.xpath_error(prefix))?;
    }
    Ok((context, root))
  }

  fn evaluate(&self, context: &mut Context, root: &Node, rule: Rule) -> Result<String> {
    let (xpath, attribute) = match rule {
      Rule::Constant(value) => return Ok(value.to_string()),
      Rule::Text(xpath) => (xpath, None),
      Rule::ValueUri(xpath) => (xpath, Some("valueURI")),
    };
    let nodes = context
      .findnodes(xpath, Some(root))
      .map_err(|_| self.xpath_error(xpath))?;
    let values: Vec<String> = nodes
      .iter()
      .filter_map(|node| match attribute {
        Some(name) => node.get_property_no_ns(name),
        None => Some(node.get_content()),
      })
      .collect();
    Ok(values.join(SEPARATOR))
  }

  fn xpath_error(&self, xpath: &str) -> Error {
    Error::XPath {
      pid: self.pid.clone(),
      xpath: xpath.to_string(),
    }
  }
}

/// Fetches, projects and drops one MODS record per call.
pub struct RecordExtractor<S> {
  source: S,
}

impl<S: MetadataSource> RecordExtractor<S> {
  pub fn new(source: S) -> Self {
    RecordExtractor { source }
  }

  pub fn extract(&self, pid: &str) -> Result<Row> {
    let body = self.source.fetch(pid)?;
    MetadataDocument::parse(pid, &body)?.to_record()
  }
}
