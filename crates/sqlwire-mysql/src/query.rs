//! Text-protocol query results.
//!
//! A `COM_QUERY` response is either a single OK packet or a result set:
//! column count, one definition per column, an EOF unless `DEPRECATE_EOF`
//! was negotiated, then rows until the terminator.

use std::sync::Arc;

use sqlwire_core::{ColumnInfo, Result, Row};

use crate::dispatcher::ResponseStream;
use crate::protocol::{OkPacket, PacketBuffer, protocol_error};
use crate::types::{ColumnDef, decode_text_value};

/// Protocol options that change the result-set layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultOptions {
    /// Column definitions carry a MariaDB extended type info block
    pub extended_type_info: bool,
    /// No EOF after column definitions; rows end with an OK-style packet
    pub deprecate_eof: bool,
}

/// Decoded response to one query.
#[derive(Debug)]
pub enum QueryResponse {
    /// The statement produced no result set
    Ok(OkPacket),
    /// Rows of a result set, in server order
    Rows(Vec<Row>),
}

/// Read a query response from its stream.
///
/// Any error aborts the read; rows decoded so far are discarded.
pub async fn read_response(
    mut stream: ResponseStream,
    options: ResultOptions,
) -> Result<QueryResponse> {
    let mut first = stream.expect_packet().await?;

    if first.is_ok() {
        let ok = first.parse_ok()?;
        stream.drain().await?;
        return Ok(QueryResponse::Ok(ok));
    }

    let column_count = first.read_lenenc_int()?;
    if column_count == 0 {
        return Ok(QueryResponse::Rows(Vec::new()));
    }
    let mut columns = Vec::with_capacity(usize::try_from(column_count).unwrap_or(0).min(4096));
    for _ in 0..column_count {
        let mut packet = stream.expect_packet().await?;
        columns.push(parse_column_definition(
            &mut packet,
            options.extended_type_info,
        )?);
    }

    if !options.deprecate_eof {
        let eof = stream.expect_packet().await?;
        if !eof.is_eof() {
            return Err(protocol_error("expected EOF after column definitions"));
        }
    }

    let info = Arc::new(ColumnInfo::new(
        columns.iter().map(|c| c.name.clone()).collect(),
    ));

    let mut rows = Vec::new();
    loop {
        let mut packet = stream.expect_packet().await?;
        if packet.is_result_terminator(options.deprecate_eof) {
            break;
        }
        rows.push(decode_row(&mut packet, &columns, &info)?);
    }

    tracing::trace!(
        columns = columns.len(),
        rows = rows.len(),
        "decoded result set"
    );
    Ok(QueryResponse::Rows(rows))
}

/// Parse one column definition packet.
pub fn parse_column_definition(
    packet: &mut PacketBuffer,
    extended_type_info: bool,
) -> Result<ColumnDef> {
    packet.skip_lenenc_string()?; // catalog
    packet.skip_lenenc_string()?; // schema
    packet.skip_lenenc_string()?; // table alias
    packet.skip_lenenc_string()?; // table
    let name = packet.read_lenenc_string()?;
    packet.skip_lenenc_string()?; // original column name

    if extended_type_info {
        let count = packet.read_lenenc_int()?;
        for _ in 0..count {
            let _kind = packet.read_u8()?;
            packet.skip_lenenc_string()?;
        }
    }

    let fixed_length = packet.read_lenenc_int()?;
    let charset = packet.read_u16_le()?;
    let column_length = packet.read_u32_le()?;
    let type_code = packet.read_u8()?;
    let flags = packet.read_u16_le()?;
    let decimals = packet.read_u8()?;
    packet.skip(2)?;

    Ok(ColumnDef {
        name,
        fixed_length,
        charset,
        column_length,
        type_code,
        flags,
        decimals,
    })
}

/// Decode one text-protocol row.
pub fn decode_row(
    packet: &mut PacketBuffer,
    columns: &[ColumnDef],
    info: &Arc<ColumnInfo>,
) -> Result<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let cell = packet.read_nullable_lenenc_bytes()?;
        values.push(decode_text_value(column, cell)?);
    }
    Ok(Row::with_columns(Arc::clone(info), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;
    use sqlwire_core::{Error, Value};

    fn incoming(payload: &[u8]) -> PacketBuffer {
        let mut p = PacketBuffer::outgoing();
        p.write_empty_header();
        p.write_bytes(payload);
        p.update_header().unwrap();
        PacketBuffer::incoming(p.into_bytes())
    }

    fn column_packet(name: &str, type_code: u8, extended: Option<&[(u8, &str)]>) -> PacketBuffer {
        let mut p = PacketBuffer::outgoing();
        p.write_empty_header();
        p.write_lenenc_string("def");
        p.write_lenenc_string("lab01");
        p.write_lenenc_string("n");
        p.write_lenenc_string("numbers");
        p.write_lenenc_string(name);
        p.write_lenenc_string("digit");
        if let Some(pairs) = extended {
            p.write_lenenc_int(pairs.len() as u64);
            for (kind, value) in pairs {
                p.write_u8(*kind);
                p.write_lenenc_string(value);
            }
        }
        p.write_lenenc_int(0x0c);
        p.write_u16_le(63);
        p.write_u32_le(11);
        p.write_u8(type_code);
        p.write_u16_le(0);
        p.write_u8(0);
        p.write_u16_le(0);
        p.update_header().unwrap();
        PacketBuffer::incoming(p.into_bytes())
    }

    #[test]
    fn test_parse_column_definition() {
        let mut packet = column_packet("d", FieldType::Long as u8, None);
        let column = parse_column_definition(&mut packet, false).unwrap();
        assert_eq!(column.name, "d");
        assert_eq!(column.fixed_length, 0x0c);
        assert_eq!(column.charset, 63);
        assert_eq!(column.column_length, 11);
        assert_eq!(column.field_type(), Some(FieldType::Long));
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_parse_column_definition_extended_type_info() {
        let pairs: &[(u8, &str)] = &[(0, "json"), (1, "uuid")];
        let mut packet = column_packet("doc", FieldType::Blob as u8, Some(pairs));
        let column = parse_column_definition(&mut packet, true).unwrap();
        assert_eq!(column.name, "doc");
        assert_eq!(column.type_code, 0xFC);
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_parse_column_definition_truncated() {
        let full = column_packet("d", FieldType::Long as u8, None);
        let cut = full.as_bytes()[..full.len() - 3].to_vec();
        let mut packet = PacketBuffer::incoming(cut);
        assert!(matches!(
            parse_column_definition(&mut packet, false),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_row() {
        let columns = vec![
            parse_column_definition(&mut column_packet("id", FieldType::LongLong as u8, None), false)
                .unwrap(),
            parse_column_definition(&mut column_packet("digit", FieldType::Tiny as u8, None), false)
                .unwrap(),
            parse_column_definition(
                &mut column_packet("label", FieldType::VarString as u8, None),
                false,
            )
            .unwrap(),
        ];
        let info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));

        let mut packet = incoming(b"\x0212\xFB\x05hello");
        let row = decode_row(&mut packet, &columns, &info).unwrap();
        assert_eq!(row.get_by_name("id"), Some(&Value::Integer(12)));
        assert_eq!(row.get_by_name("digit"), Some(&Value::Null));
        assert_eq!(row.get_by_name("label"), Some(&Value::Unsupported(0xFD)));
        assert_eq!(packet.remaining(), 0);
    }

    #[test]
    fn test_decode_row_short_packet() {
        let columns = vec![
            parse_column_definition(&mut column_packet("a", FieldType::Long as u8, None), false)
                .unwrap(),
            parse_column_definition(&mut column_packet("b", FieldType::Long as u8, None), false)
                .unwrap(),
        ];
        let info = Arc::new(ColumnInfo::new(vec!["a".into(), "b".into()]));
        let mut packet = incoming(b"\x011");
        assert!(decode_row(&mut packet, &columns, &info).is_err());
    }
}
