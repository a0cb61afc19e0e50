//! Semantic field type to native column type mapping.

use crate::schema::FieldType;

use super::Dialect;

impl Dialect {
    /// Returns the native column type for a semantic field type.
    ///
    /// [`FieldType::Other`] falls back to the text mapping on every dialect.
    #[must_use]
    pub fn type_name(self, field_type: &FieldType) -> &'static str {
        match (field_type, self) {
            (FieldType::Text | FieldType::Other(_), _) => "TEXT",

            (FieldType::Number, Self::Postgres) => "NUMERIC",
            (FieldType::Number, Self::Sqlite | Self::Libsql) => "REAL",

            (FieldType::Boolean, Self::Postgres) => "BOOLEAN",
            (FieldType::Boolean, Self::Sqlite | Self::Libsql) => "INTEGER",

            (FieldType::Object, Self::Postgres) => "JSONB",
            (FieldType::Object, Self::Libsql) => "JSON",
            (FieldType::Object, Self::Sqlite) => "TEXT",

            (FieldType::Date, Self::Postgres) => "DATE",
            (FieldType::DateTime, Self::Postgres) => "TIMESTAMPTZ",
            (FieldType::Uuid, Self::Postgres) => "UUID",
            (
                FieldType::Date | FieldType::DateTime | FieldType::Uuid,
                Self::Sqlite | Self::Libsql,
            ) => "TEXT",
        }
    }

    /// Returns the type values are cast to when copied into a rebuilt
    /// column of `field_type`.
    ///
    /// SQLite gives the `JSON` type name NUMERIC affinity, so a cast to it
    /// turns every document into `0`. Structured values are copied as text.
    #[must_use]
    pub fn copy_type_name(self, field_type: &FieldType) -> &'static str {
        match (field_type, self) {
            (FieldType::Object, Self::Libsql) => "TEXT",
            _ => self.type_name(field_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_type_names() {
        let d = Dialect::Postgres;
        assert_eq!(d.type_name(&FieldType::Text), "TEXT");
        assert_eq!(d.type_name(&FieldType::Number), "NUMERIC");
        assert_eq!(d.type_name(&FieldType::Boolean), "BOOLEAN");
        assert_eq!(d.type_name(&FieldType::Object), "JSONB");
        assert_eq!(d.type_name(&FieldType::Date), "DATE");
        assert_eq!(d.type_name(&FieldType::DateTime), "TIMESTAMPTZ");
        assert_eq!(d.type_name(&FieldType::Uuid), "UUID");
    }

    #[test]
    fn test_embedded_type_names() {
        for d in [Dialect::Sqlite, Dialect::Libsql] {
            assert_eq!(d.type_name(&FieldType::Number), "REAL");
            assert_eq!(d.type_name(&FieldType::Boolean), "INTEGER");
            assert_eq!(d.type_name(&FieldType::DateTime), "TEXT");
            assert_eq!(d.type_name(&FieldType::Uuid), "TEXT");
        }
        assert_eq!(Dialect::Sqlite.type_name(&FieldType::Object), "TEXT");
        assert_eq!(Dialect::Libsql.type_name(&FieldType::Object), "JSON");
    }

    #[test]
    fn test_copy_type_avoids_json_affinity() {
        assert_eq!(Dialect::Libsql.copy_type_name(&FieldType::Object), "TEXT");
        assert_eq!(Dialect::Libsql.copy_type_name(&FieldType::Number), "REAL");
        assert_eq!(Dialect::Sqlite.copy_type_name(&FieldType::Boolean), "INTEGER");
        assert_eq!(Dialect::Postgres.copy_type_name(&FieldType::Object), "JSONB");
    }

    #[test]
    fn test_unknown_type_falls_back_to_text() {
        let unknown = FieldType::Other("geometry".to_string());
        for d in Dialect::ALL {
            assert_eq!(d.type_name(&unknown), d.type_name(&FieldType::Text));
        }
    }
}
