use std::collections::BTreeMap;
use std::sync::OnceLock;

use batchlink_schema::{Schema, SchemaBuildError, SchemaBuilder};

use crate::message::MessageKind;
use crate::types::LogLevel;

type SchemaTable = BTreeMap<MessageKind, Schema>;

static CLIENT_SCHEMAS: OnceLock<SchemaTable> = OnceLock::new();
static SERVICE_SCHEMAS: OnceLock<SchemaTable> = OnceLock::new();

pub(crate) fn client_schema(kind: MessageKind) -> Option<&'static Schema> {
    CLIENT_SCHEMAS
        .get_or_init(|| client_schemas().expect("client message schemas must build"))
        .get(&kind)
}

pub(crate) fn service_schema(kind: MessageKind) -> Option<&'static Schema> {
    SERVICE_SCHEMAS
        .get_or_init(|| service_schemas().expect("service message schemas must build"))
        .get(&kind)
}

pub(crate) fn client_schemas() -> Result<SchemaTable, SchemaBuildError> {
    let mut table = SchemaTable::new();
    table.insert(
        MessageKind::Batch,
        envelope(MessageKind::Batch, true)?
            .entry("lambda_id", id(false)?)
            .entry("batch_id", id(false)?)
            .entry("data", Schema::blob().build()?)
            .build()?,
    );
    table.insert(
        MessageKind::Error,
        envelope(MessageKind::Error, true)?
            .entry("lambda_id", id(false)?)
            .entry("batch_id", id(true)?)
            .entry("message", Schema::text().build()?)
            .build()?,
    );
    table.insert(
        MessageKind::LogEntry,
        envelope(MessageKind::LogEntry, true)?
            .entry("lambda_id", id(false)?)
            .entry("batch_id", id(true)?)
            .entry("level", Schema::text().one_of(LogLevel::ALL.map(LogLevel::as_str)).build()?)
            .entry("message", Schema::text().build()?)
            .build()?,
    );
    table.insert(MessageKind::ImAlive, envelope(MessageKind::ImAlive, true)?.build()?);
    table.insert(MessageKind::Exit, envelope(MessageKind::Exit, true)?.build()?);
    Ok(table)
}

pub(crate) fn service_schemas() -> Result<SchemaTable, SchemaBuildError> {
    let mut table = SchemaTable::new();
    table.insert(
        MessageKind::Batch,
        envelope(MessageKind::Batch, false)?
            .entry("lambda_id", id(false)?)
            .entry("batch_id", id(false)?)
            .entry("data", Schema::blob().build()?)
            .build()?,
    );
    table.insert(
        MessageKind::Lambda,
        envelope(MessageKind::Lambda, false)?
            .entry("lambda_id", id(false)?)
            .entry("program", Schema::blob().build()?)
            .build()?,
    );
    table.insert(MessageKind::ImAlive, envelope(MessageKind::ImAlive, false)?.build()?);
    table.insert(MessageKind::Exit, envelope(MessageKind::Exit, false)?.build()?);
    Ok(table)
}

fn envelope(kind: MessageKind, with_seq: bool) -> Result<SchemaBuilder, SchemaBuildError> {
    let builder = Schema::map().entry("kind", Schema::text().one_of([kind.as_str()]).build()?);
    if !with_seq {
        return Ok(builder);
    }
    Ok(builder.entry("seq", Schema::number().integer().minimum(1).maximum(u64::MAX).build()?))
}

fn id(optional: bool) -> Result<Schema, SchemaBuildError> {
    Schema::number()
        .integer()
        .minimum(i64::MIN)
        .maximum(i64::MAX)
        .set_optional(optional)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchlink_schema::Value;

    #[test]
    fn schema_tables_build() {
        let client = client_schemas().expect("client");
        let service = service_schemas().expect("service");
        assert_eq!(client.len(), 5);
        assert_eq!(service.len(), 4);
        assert!(!client.contains_key(&MessageKind::Lambda));
        assert!(!service.contains_key(&MessageKind::Error));
    }

    #[test]
    fn heartbeat_requires_seq() {
        let schema = client_schema(MessageKind::ImAlive).expect("im_alive");
        let violations = schema.violations(&Value::map([("kind", Value::from("im_alive"))]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "seq");
        assert_eq!(violations[0].requirement, "optional");
    }

    #[test]
    fn kind_must_match_table_entry() {
        let schema = service_schema(MessageKind::Exit).expect("exit");
        let violations = schema.violations(&Value::map([("kind", Value::from("lambda"))]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].requirement, "one_of");
    }
}
