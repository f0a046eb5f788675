//! Statement builders for provisioning, inference and loading.

use super::{ColumnDef, quote_ident, quote_literal};

pub fn create_storage_integration(
    name: &str,
    role_arn: &str,
    external_id: &str,
    allowed_locations: &[String],
) -> String {
    let locations = allowed_locations
        .iter()
        .map(|loc| quote_literal(loc))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE OR REPLACE STORAGE INTEGRATION {name}
  TYPE = EXTERNAL_STAGE
  STORAGE_PROVIDER = 'S3'
  ENABLED = TRUE
  STORAGE_AWS_ROLE_ARN = {role_arn}
  STORAGE_AWS_EXTERNAL_ID = {external_id}
  STORAGE_ALLOWED_LOCATIONS = ({locations})",
        name = quote_ident(name),
        role_arn = quote_literal(role_arn),
        external_id = quote_literal(external_id),
    )
}

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database))
}

/// `schema` must already be qualified (see `Namespace::schema_name`).
pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {schema}")
}

pub fn create_stage(stage: &str, url: &str, integration: &str) -> String {
    format!(
        "CREATE STAGE IF NOT EXISTS {stage}
  URL = {url}
  STORAGE_INTEGRATION = {integration}",
        url = quote_literal(url),
        integration = quote_ident(integration),
    )
}

pub fn create_file_format(format: &str, delimiter: char, quote: char, skip_header: u32) -> String {
    format!(
        "CREATE OR REPLACE FILE FORMAT {format}
  TYPE = 'CSV'
  FIELD_DELIMITER = {delimiter}
  FIELD_OPTIONALLY_ENCLOSED_BY = {quote}
  SKIP_HEADER = {skip_header}",
        delimiter = quote_literal(&delimiter.to_string()),
        quote = quote_literal(&quote.to_string()),
    )
}

/// Inference over one staged file, ordered so rows line up with the header.
pub fn infer_schema(stage: &str, relative_path: &str, format: &str) -> String {
    let location = format!("@{stage}/{relative_path}");
    format!(
        "SELECT COLUMN_NAME, TYPE, NULLABLE, ORDER_ID
FROM TABLE(
  INFER_SCHEMA(
    LOCATION => {location},
    FILE_FORMAT => {format}
  )
)
ORDER BY ORDER_ID",
        location = quote_literal(&location),
        format = quote_literal(format),
    )
}

pub fn create_table(table: &str, columns: &[ColumnDef]) -> String {
    let columns = columns
        .iter()
        .map(|col| {
            format!(
                "{} {} {}",
                quote_ident(&col.name),
                col.data_type,
                if col.nullable { "NULL" } else { "NOT NULL" }
            )
        })
        .collect::<Vec<_>>()
        .join(",\n  ");

    format!("CREATE TABLE IF NOT EXISTS {table} (\n  {columns}\n)")
}

/// Regex matching exactly one staged file, whether the warehouse compares it
/// against the stage-relative path, the bucket key or the full location.
///
/// Every optional group is anchored to the stage's own bucket and prefix so
/// `a.csv` never also matches `2024/a.csv`.
pub fn file_pattern(bucket: &str, prefix: &str, relative_path: &str) -> String {
    let location = format!("s3://{}/", regex::escape(bucket));
    let file = regex::escape(relative_path);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("({location})?{file}")
    } else {
        format!("(({location})?{}/)?{file}", regex::escape(prefix))
    }
}

pub fn copy_into(table: &str, stage: &str, pattern: &str, format: &str) -> String {
    format!(
        "COPY INTO {table}
  FROM @{stage}
  PATTERN = {pattern}
  FILE_FORMAT = (FORMAT_NAME = {format})
  ON_ERROR = 'CONTINUE'",
        pattern = quote_literal(pattern),
        format = quote_literal(format),
    )
}

/// Base tables in one schema, by name.
pub fn list_tables(database: &str, schema: &str) -> String {
    format!(
        "SELECT TABLE_NAME
FROM {database}.INFORMATION_SCHEMA.TABLES
WHERE TABLE_SCHEMA = {schema} AND TABLE_TYPE = 'BASE TABLE'
ORDER BY TABLE_NAME",
        database = quote_ident(database),
        schema = quote_literal(schema),
    )
}

/// `table` must already be qualified (see `Namespace::object`).
pub fn select_all(table: &str) -> String {
    format!("SELECT * FROM {table}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{DataType, Namespace};
    use regex::Regex;

    #[test]
    fn test_storage_integration() {
        let sql = create_storage_integration(
            "s3_ingest",
            "arn:aws:iam::123456789012:role/loader",
            "ext-1",
            &["s3://landing/raw_data/".to_string(), "s3://landing/other/".to_string()],
        );
        assert!(sql.starts_with(r#"CREATE OR REPLACE STORAGE INTEGRATION "s3_ingest""#));
        assert!(sql.contains("STORAGE_AWS_ROLE_ARN = 'arn:aws:iam::123456789012:role/loader'"));
        assert!(sql.contains("STORAGE_AWS_EXTERNAL_ID = 'ext-1'"));
        assert!(
            sql.contains("STORAGE_ALLOWED_LOCATIONS = ('s3://landing/raw_data/', 's3://landing/other/')")
        );
    }

    #[test]
    fn test_stage_and_format() {
        let ns = Namespace::new("DB", "RAW");
        let stage = create_stage(&ns.object("landing"), "s3://landing/raw_data/", "s3_ingest");
        assert!(stage.starts_with(r#"CREATE STAGE IF NOT EXISTS "DB"."RAW"."landing""#));
        assert!(stage.contains("URL = 's3://landing/raw_data/'"));
        assert!(stage.contains(r#"STORAGE_INTEGRATION = "s3_ingest""#));

        let format = create_file_format(&ns.object("csv"), '\t', '"', 1);
        assert!(format.contains(r"FIELD_DELIMITER = '\t'"));
        assert!(format.contains(r#"FIELD_OPTIONALLY_ENCLOSED_BY = '"'"#));
        assert!(format.contains("SKIP_HEADER = 1"));
    }

    #[test]
    fn test_infer_schema_location() {
        let ns = Namespace::new("DB", "RAW");
        let sql = infer_schema(&ns.object("landing"), "2024/o'brien.csv", &ns.object("csv"));
        assert!(sql.contains(r#"LOCATION => '@"DB"."RAW"."landing"/2024/o''brien.csv'"#));
        assert!(sql.contains(r#"FILE_FORMAT => '"DB"."RAW"."csv"'"#));
        assert!(sql.ends_with("ORDER BY ORDER_ID"));
    }

    #[test]
    fn test_create_table() {
        let columns = vec![
            ColumnDef {
                name: "id".to_string(),
                data_type: DataType::parse("NUMBER(38, 0)").unwrap(),
                nullable: false,
            },
            ColumnDef {
                name: "full name".to_string(),
                data_type: DataType::parse("TEXT").unwrap(),
                nullable: true,
            },
        ];
        let sql = create_table(r#""DB"."RAW"."raw_a""#, &columns);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"DB\".\"RAW\".\"raw_a\" (\n  \"id\" NUMBER(38, 0) NOT NULL,\n  \"full name\" TEXT NULL\n)"
        );
    }

    #[test]
    fn test_file_pattern_matches_only_its_file() {
        let pattern = Regex::new(&format!("^{}$", file_pattern("landing", "raw_data", "a.csv"))).unwrap();
        assert!(pattern.is_match("a.csv"));
        assert!(pattern.is_match("raw_data/a.csv"));
        assert!(pattern.is_match("s3://landing/raw_data/a.csv"));
        assert!(!pattern.is_match("data.csv"));
        assert!(!pattern.is_match("raw_data/abcsv"));
        assert!(!pattern.is_match("a.csv.bak"));
    }

    #[test]
    fn test_file_pattern_ignores_same_name_in_subdirectory() {
        let pattern = Regex::new(&format!("^{}$", file_pattern("landing", "raw_data", "a.csv"))).unwrap();
        assert!(!pattern.is_match("2024/a.csv"));
        assert!(!pattern.is_match("raw_data/2024/a.csv"));
        assert!(!pattern.is_match("s3://landing/raw_data/2024/a.csv"));
        assert!(!pattern.is_match("s3://other/raw_data/a.csv"));

        let nested = Regex::new(&format!("^{}$", file_pattern("landing", "raw_data", "2024/a.csv"))).unwrap();
        assert!(nested.is_match("2024/a.csv"));
        assert!(nested.is_match("raw_data/2024/a.csv"));
        assert!(!nested.is_match("a.csv"));
    }

    #[test]
    fn test_file_pattern_without_prefix() {
        let pattern = Regex::new(&format!("^{}$", file_pattern("landing", "", "a.csv"))).unwrap();
        assert!(pattern.is_match("a.csv"));
        assert!(pattern.is_match("s3://landing/a.csv"));
        assert!(!pattern.is_match("raw_data/a.csv"));
    }

    #[test]
    fn test_copy_into() {
        let ns = Namespace::new("DB", "RAW");
        let sql = copy_into(
            &ns.object("raw_a"),
            &ns.object("landing"),
            &file_pattern("landing", "raw_data", "a.csv"),
            &ns.object("csv"),
        );
        assert!(sql.starts_with(r#"COPY INTO "DB"."RAW"."raw_a""#));
        assert!(sql.contains(r#"FROM @"DB"."RAW"."landing""#));
        assert!(sql.contains(r"PATTERN = '((s3://landing/)?raw_data/)?a\\.csv'"));
        assert!(sql.contains("ON_ERROR = 'CONTINUE'"));
    }

    #[test]
    fn test_list_tables() {
        let sql = list_tables("DB", "RA'W");
        assert!(sql.contains(r#"FROM "DB".INFORMATION_SCHEMA.TABLES"#));
        assert!(sql.contains("WHERE TABLE_SCHEMA = 'RA''W'"));
        assert!(sql.ends_with("ORDER BY TABLE_NAME"));
    }
}
