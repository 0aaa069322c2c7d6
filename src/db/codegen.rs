//! Declaration generator.
//!
//! Renders catalog-derived record shapes as `define_table!` source, for
//! pasting into a crate that declares its tables.

use crate::models::{FieldType, Presence, RecordShape};
use std::collections::BTreeSet;
use std::fmt::Write as _;

const HEADER: &str = "\
// Generated from the database catalog. Review primary keys and JSON fields
// before use.

use chrono::{DateTime, NaiveDate, Utc};
use schema_crud::define_table;
";

/// Render a full source file with one declaration per shape.
pub fn render_module(shapes: &[RecordShape]) -> String {
    let mut out = String::from(HEADER);
    for shape in shapes {
        out.push('\n');
        out.push_str(&render_table(shape));
    }
    out
}

/// Render one `define_table!` invocation.
///
/// Besides the shape's own JSON-field set, every `jsonb`/`json` column is
/// listed as a JSON field.
pub fn render_table(shape: &RecordShape) -> String {
    let json: BTreeSet<&str> = shape
        .json_fields()
        .iter()
        .map(String::as_str)
        .chain(
            shape
                .fields()
                .iter()
                .filter(|f| f.field_type == FieldType::Json)
                .map(|f| f.name.as_str()),
        )
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "define_table! {{");
    let _ = writeln!(out, "    pub struct {} {{", struct_name(shape.table()));
    let _ = writeln!(out, "        table: {:?},", shape.table());
    let _ = writeln!(out, "        primary_key: {},", shape.primary_key());
    let _ = writeln!(
        out,
        "        json: [{}],",
        json.into_iter().collect::<Vec<_>>().join(", ")
    );
    let _ = writeln!(out, "        fields: {{");
    for field in shape.fields() {
        let rust_type = match field.presence {
            Presence::Required => field.field_type.rust_type().to_string(),
            Presence::Generated | Presence::Optional => {
                format!("Option<{}>", field.field_type.rust_type())
            }
        };
        let _ = writeln!(
            out,
            "            {}: {} => {:?}, {:?};",
            field.name, rust_type, field.field_type, field.presence
        );
    }
    let _ = writeln!(out, "        }}");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out
}

/// `event_log` -> `EventLog`.
pub fn struct_name(table: &str) -> String {
    table
        .split(|c: char| c == '_' || c == '-' || c == '.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
