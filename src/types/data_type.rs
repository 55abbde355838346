use std::fmt;

/// Column type recorded in a table schema.
///
/// The discriminant values are part of the row codec contract: a decoded
/// column is interpreted according to the schema's `DataType`, so schemas
/// must not change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Bool,
}

impl DataType {
    /// Parses a SQL type name. `VARCHAR(n)` carries its size hint
    /// separately; only the base name is resolved here.
    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" => Some(DataType::Int32),
            "BIGINT" => Some(DataType::Int64),
            "FLOAT" => Some(DataType::Float32),
            "DOUBLE" => Some(DataType::Float64),
            "VARCHAR" | "TEXT" => Some(DataType::Text),
            "BOOL" | "BOOLEAN" => Some(DataType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32 => "INT",
            DataType::Int64 => "BIGINT",
            DataType::Float32 => "FLOAT",
            DataType::Float64 => "DOUBLE",
            DataType::Text => "TEXT",
            DataType::Bool => "BOOL",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_names_resolve_case_insensitively() {
        assert_eq!(DataType::from_sql_name("int"), Some(DataType::Int32));
        assert_eq!(DataType::from_sql_name("Integer"), Some(DataType::Int32));
        assert_eq!(DataType::from_sql_name("VARCHAR"), Some(DataType::Text));
        assert_eq!(DataType::from_sql_name("boolean"), Some(DataType::Bool));
        assert_eq!(DataType::from_sql_name("DOUBLE"), Some(DataType::Float64));
        assert_eq!(DataType::from_sql_name("uuid"), None);
    }
}
