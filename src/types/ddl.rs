use super::ColumnMeta;

fn translate_default_for_export(default: &str) -> String {
    match default {
        "gen_uuid()" => "gen_random_uuid()".to_string(),
        "now()" => "now()".to_string(),
        "true" => "true".to_string(),
        "false" => "false".to_string(),
        other => other.to_string(),
    }
}

/// Emit a PostgreSQL `CREATE TABLE` statement for the given column set, in
/// the order the columns were registered.
pub fn export_table_ddl(table_name: &str, columns: &[ColumnMeta]) -> String {
    let mut lines = Vec::new();
    let mut primary_keys = Vec::new();

    for col in columns {
        let mut line = format!("  \"{}\" {}", col.column_name, col.pg_type);
        if !col.is_nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default_value {
            line.push_str(&format!(" DEFAULT {}", translate_default_for_export(default)));
        }
        lines.push(line);
        if col.is_primary {
            primary_keys.push(format!("\"{}\"", col.column_name));
        }
    }

    if !primary_keys.is_empty() {
        lines.push(format!("  PRIMARY KEY ({})", primary_keys.join(", ")));
    }

    format!("CREATE TABLE \"{}\" (\n{}\n);", table_name, lines.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PgType;

    #[test]
    fn exports_primary_key_and_default() {
        let columns = vec![
            ColumnMeta {
                table_name: "t".into(),
                column_name: "id".into(),
                pg_type: PgType::Uuid,
                is_nullable: false,
                default_value: None,
                is_primary: true,
            },
            ColumnMeta {
                table_name: "t".into(),
                column_name: "created_at".into(),
                pg_type: PgType::Timestamptz,
                is_nullable: false,
                default_value: Some("now()".into()),
                is_primary: false,
            },
            ColumnMeta {
                table_name: "t".into(),
                column_name: "payload".into(),
                pg_type: PgType::Jsonb,
                is_nullable: true,
                default_value: None,
                is_primary: false,
            },
        ];

        let ddl = export_table_ddl("t", &columns);
        assert!(ddl.contains("\"id\" uuid"));
        assert!(ddl.contains("DEFAULT now()"));
        assert!(ddl.contains("\"payload\" jsonb"));
        assert!(ddl.contains("PRIMARY KEY (\"id\")"));
    }
}
