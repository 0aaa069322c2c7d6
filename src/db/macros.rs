//! Table declaration macro.
//!
//! `define_table!` generates a serde struct for one table together with its
//! [`Table`](crate::models::Table) impl, so the typed row and the
//! [`RecordShape`](crate::models::RecordShape) the executor works from are
//! written once and cannot drift apart.

/// Declare a table's row struct and record shape.
///
/// Each field names its Rust type, its [`FieldType`](crate::models::FieldType)
/// variant and its [`Presence`](crate::models::Presence) variant. Fields the
/// engine may fill or that are nullable should use `Option<_>`.
///
/// # Example
///
/// ```ignore
/// define_table! {
///     pub struct Algo {
///         table: "algos",
///         primary_key: algo_id,
///         json: [],
///         fields: {
///             algo_id: String => Text, Required;
///             version: String => Text, Required;
///             created_at: Option<DateTime<Utc>> => Timestamp, Generated;
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_table {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            table: $table:literal,
            primary_key: $pk:ident,
            json: [$($json:ident),* $(,)?],
            fields: {
                $(
                    $(#[$fmeta:meta])*
                    $field:ident : $ty:ty => $kind:ident, $presence:ident
                );+ $(;)?
            } $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )+
        }

        impl $crate::models::Table for $name {
            const TABLE_NAME: &'static str = $table;
            const PRIMARY_KEY: &'static str = stringify!($pk);

            fn shape() -> $crate::models::RecordShape {
                let json: &[&str] = &[$(stringify!($json)),*];
                $crate::models::RecordShape::new($table, stringify!($pk))
                    .with_fields([
                        $(
                            $crate::models::FieldSpec::new(
                                stringify!($field),
                                $crate::models::FieldType::$kind,
                                $crate::models::Presence::$presence,
                            ),
                        )+
                    ])
                    .with_json_fields(json.iter().copied())
            }
        }
    };
}

pub use define_table;
