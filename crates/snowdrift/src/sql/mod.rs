//! SQL text generation.
//!
//! Every identifier and string literal that reaches the warehouse goes
//! through [`quote_ident`] or [`quote_literal`], and every inferred column
//! type through [`DataType::parse`]. File names, header names and config
//! values are never spliced into statements any other way.

mod statements;

pub use statements::{
    copy_into, create_database, create_file_format, create_schema, create_stage,
    create_storage_integration, create_table, file_pattern, infer_schema, list_tables, select_all,
};

use regex::Regex;
use snafu::prelude::*;
use std::fmt;
use std::sync::LazyLock;

/// Quote an identifier: wrap in double quotes, doubling embedded quotes.
///
/// Quoted identifiers are case-sensitive, so `quote_ident("raw_orders")`
/// names a different table than the unquoted `raw_orders`.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal.
///
/// Backslash is an escape character inside Snowflake string literals, so it
/// is doubled along with single quotes; control characters are written as
/// escape sequences.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Join and quote the parts of a qualified object name.
pub fn qualify(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| quote_ident(part))
        .collect::<Vec<_>>()
        .join(".")
}

/// Database and schema that every pipeline object lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub database: String,
    pub schema: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
        }
    }

    /// Fully qualified, quoted name of an object in this namespace.
    pub fn object(&self, name: &str) -> String {
        qualify(&[&self.database, &self.schema, name])
    }

    /// Quoted `database.schema`.
    pub fn schema_name(&self) -> String {
        qualify(&[&self.database, &self.schema])
    }
}

const MAX_TYPE_LEN: usize = 64;

static DATA_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^
        [A-Za-z][A-Za-z0-9_]*              # base type
        (?:\ [A-Za-z][A-Za-z0-9_]*)*       # multi-word types (DOUBLE PRECISION)
        (?:
            \s*\(\s*\d+\s*(?:,\s*\d+\s*)?\)  # precision / scale
        )?
        $",
    )
    .expect("valid data type pattern")
});

/// Error for a type string that is not a plain column type.
#[derive(Debug, Snafu)]
#[snafu(display("'{value}' is not a valid column type"))]
pub struct InvalidDataType {
    pub value: String,
}

/// A column type proposed by schema inference, validated so it can be
/// written into DDL verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType(String);

impl DataType {
    pub fn parse(value: &str) -> Result<Self, InvalidDataType> {
        let trimmed = value.trim();
        ensure!(
            trimmed.len() <= MAX_TYPE_LEN && DATA_TYPE_PATTERN.is_match(trimmed),
            InvalidDataTypeSnafu { value }
        );
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One column of a CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}
